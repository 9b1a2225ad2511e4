//! Raw ADTS (AAC) streams
//!
//! [`AdtsStreamReader`] works over any byte source, so the MPEG-TS demuxer
//! reuses it on top of its reassembled PES payloads.

use super::bytes::is_eof;
use super::detection::{DetectionResult, STREAM_SCAN_DISTANCE};
use super::{
    AudioTrackFormat, CodecConfig, ContainerProbe, ContainerTrack, Demuxer, MediaContainerHints,
    MediaPacket, TrackKind,
};
use crate::error::{Error, Result};
use crate::io::SeekableInput;
use lavastream_common::TrackInfo;
use std::io::Read;
use tracing::{debug, warn};

pub const PROBE_NAME: &str = "adts";

/// Distance scanned to regain sync while demuxing
const RESYNC_DISTANCE: usize = 64 * 1024;

const SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

/// Fixed and variable parts of one ADTS frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-4 audio object type (profile + 1)
    pub object_type: u8,
    pub sample_rate_index: u8,
    pub sample_rate: u32,
    pub channels: u16,
    /// Whole frame including the header
    pub frame_length: usize,
    /// 7, or 9 with a CRC
    pub header_length: usize,
    pub raw_blocks: u8,
}

impl AdtsHeader {
    pub const SIZE: usize = 7;

    pub fn parse(b: &[u8; Self::SIZE]) -> Option<Self> {
        if b[0] != 0xFF || b[1] & 0xF6 != 0xF0 {
            return None;
        }

        let sample_rate_index = (b[2] >> 2) & 0x0F;
        let sample_rate = *SAMPLE_RATES.get(sample_rate_index as usize)?;
        let channels = (((b[2] & 0x01) << 2) | (b[3] >> 6)) as u16;
        if channels == 0 {
            return None;
        }

        let header_length = if b[1] & 0x01 == 0 { 9 } else { 7 };
        let frame_length = (((b[3] & 0x03) as usize) << 11) | ((b[4] as usize) << 3) | (b[5] as usize >> 5);
        if frame_length <= header_length {
            return None;
        }

        Some(Self {
            object_type: (b[2] >> 6) + 1,
            sample_rate_index,
            sample_rate,
            channels,
            frame_length,
            header_length,
            raw_blocks: (b[6] & 0x03) + 1,
        })
    }

    pub fn payload_length(&self) -> usize {
        self.frame_length - self.header_length
    }

    pub fn samples(&self) -> u64 {
        1024 * self.raw_blocks as u64
    }

    /// AudioSpecificConfig describing this stream
    pub fn audio_specific_config(&self) -> Vec<u8> {
        vec![
            (self.object_type << 3) | (self.sample_rate_index >> 1),
            ((self.sample_rate_index & 0x01) << 7) | ((self.channels as u8) << 3),
        ]
    }

    /// Whether two headers describe the same stream
    pub fn same_stream(&self, other: &AdtsHeader) -> bool {
        self.object_type == other.object_type
            && self.sample_rate_index == other.sample_rate_index
            && self.channels == other.channels
    }
}

/// Finds ADTS frames in a byte stream
pub struct AdtsStreamReader<R> {
    input: R,
    window: [u8; AdtsHeader::SIZE],
}

impl<R: Read> AdtsStreamReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            window: [0; AdtsHeader::SIZE],
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.input
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        match self.input.read_exact(&mut b) {
            Ok(()) => Ok(Some(b[0])),
            Err(e) if is_eof(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads until a header has been consumed, scanning at most `distance`
    /// bytes past the first candidate position. `None` at end of input or
    /// when nothing is found.
    pub fn find_header(&mut self, distance: usize) -> Result<Option<AdtsHeader>> {
        let mut filled = 0;
        for _ in 0..distance + AdtsHeader::SIZE {
            let Some(byte) = self.read_byte()? else {
                return Ok(None);
            };
            self.window.copy_within(1.., 0);
            self.window[AdtsHeader::SIZE - 1] = byte;
            filled = (filled + 1).min(AdtsHeader::SIZE);

            if filled == AdtsHeader::SIZE {
                if let Some(header) = AdtsHeader::parse(&self.window) {
                    return Ok(Some(header));
                }
            }
        }
        Ok(None)
    }

    /// Reads the payload of a frame whose header was just found. `None`
    /// when the input ends inside the frame.
    pub fn read_payload(&mut self, header: &AdtsHeader) -> Result<Option<Vec<u8>>> {
        let mut crc = [0u8; 2];
        let mut payload = vec![0u8; header.payload_length()];
        let result = if header.header_length > AdtsHeader::SIZE {
            self.input.read_exact(&mut crc).and_then(|()| self.input.read_exact(&mut payload))
        } else {
            self.input.read_exact(&mut payload)
        };
        match result {
            Ok(()) => Ok(Some(payload)),
            Err(e) if is_eof(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct AdtsProbe;

impl ContainerProbe for AdtsProbe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn matches_hints(&self, hints: &MediaContainerHints) -> bool {
        hints.agree_with("audio/aac", "aac")
    }

    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>> {
        let mut reader = AdtsStreamReader::new(&mut *input);
        if reader.find_header(STREAM_SCAN_DISTANCE)?.is_none() {
            return Ok(None);
        }

        debug!(track = %identifier, "Track is an ADTS stream");
        let info = TrackInfo::builder(identifier).is_stream(true).build();
        Ok(Some(DetectionResult::supported(PROBE_NAME, None, info)))
    }

    fn create_demuxer(&self, _parameters: Option<&str>, input: Box<dyn SeekableInput>) -> Result<Box<dyn Demuxer>> {
        let mut demuxer = AdtsDemuxer::new(input);
        demuxer.parse_headers()?;
        Ok(Box::new(demuxer))
    }
}

/// Demuxer over a plain ADTS frame sequence; never seekable
pub struct AdtsDemuxer<R> {
    reader: AdtsStreamReader<R>,
    first: Option<AdtsHeader>,
    format: Option<AudioTrackFormat>,
    pending: Option<(AdtsHeader, Vec<u8>)>,
    sample_position: u64,
}

impl<R: Read + Send> AdtsDemuxer<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: AdtsStreamReader::new(input),
            first: None,
            format: None,
            pending: None,
            sample_position: 0,
        }
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    fn next_frame(&mut self, distance: usize) -> Result<Option<(AdtsHeader, Vec<u8>)>> {
        loop {
            let Some(header) = self.reader.find_header(distance)? else {
                return Ok(None);
            };
            if let Some(first) = &self.first {
                if !first.same_stream(&header) {
                    warn!("Skipping ADTS frame with a different stream configuration");
                    continue;
                }
            }
            return match self.reader.read_payload(&header)? {
                Some(payload) => Ok(Some((header, payload))),
                None => Ok(None),
            };
        }
    }
}

impl<R: Read + Send> Demuxer for AdtsDemuxer<R> {
    fn parse_headers(&mut self) -> Result<()> {
        if self.first.is_some() {
            return Ok(());
        }
        let Some((header, payload)) = self.next_frame(STREAM_SCAN_DISTANCE)? else {
            return Err(Error::container("No ADTS frame found in the stream"));
        };

        self.format = Some(AudioTrackFormat {
            codec: CodecConfig::Aac {
                audio_specific_config: header.audio_specific_config(),
            },
            sample_rate: header.sample_rate,
            channels: header.channels,
        });
        self.first = Some(header);
        self.pending = Some((header, payload));
        Ok(())
    }

    fn tracks(&self) -> Vec<ContainerTrack> {
        match self.first {
            Some(_) => vec![ContainerTrack {
                id: 0,
                kind: TrackKind::Audio,
                codec: "aac".to_string(),
                supported: true,
            }],
            None => Vec::new(),
        }
    }

    fn audio_format(&self) -> Option<&AudioTrackFormat> {
        self.format.as_ref()
    }

    fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        let frame = match self.pending.take() {
            Some(frame) => Some(frame),
            None => self.next_frame(RESYNC_DISTANCE)?,
        };
        let Some((header, data)) = frame else {
            return Ok(None);
        };

        let timecode_ms = (self.sample_position * 1000 / header.sample_rate as u64) as i64;
        self.sample_position += header.samples();
        Ok(Some(MediaPacket { timecode_ms, data }))
    }

    fn seek(&mut self, _timecode_ms: i64) -> Result<i64> {
        Err(Error::NotSeekable)
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn duration_ms(&self) -> Option<i64> {
        None
    }
}
