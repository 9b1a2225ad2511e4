//! RIFF/WAVE probe and PCM demuxer
//!
//! Packets carry interleaved 16-bit little-endian samples regardless of the
//! file's sample width, so playback can skip the codec stage entirely.

use super::bytes::{is_eof, ReadBytes};
use super::detection::DetectionResult;
use super::{
    AudioTrackFormat, CodecConfig, ContainerProbe, ContainerTrack, Demuxer, MediaContainerHints,
    MediaPacket, TrackKind,
};
use crate::error::{Error, Result};
use crate::io::{read_up_to, SeekableInput};
use lavastream_common::TrackInfo;
use tracing::debug;

pub const PROBE_NAME: &str = "wav";

const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Sample blocks (one sample per channel) in each packet
const BLOCKS_PER_PACKET: u64 = 1024;

const RIFF_HEADER: [Option<u8>; 12] = [
    Some(b'R'),
    Some(b'I'),
    Some(b'F'),
    Some(b'F'),
    None,
    None,
    None,
    None,
    Some(b'W'),
    Some(b'A'),
    Some(b'V'),
    Some(b'E'),
];

/// Layout of the sample area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFileInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub block_align: u16,
    pub block_count: u64,
    pub start_offset: u64,
}

impl WavFileInfo {
    pub fn duration_ms(&self) -> i64 {
        (self.block_count * 1000 / self.sample_rate.max(1) as u64) as i64
    }

    fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }
}

#[derive(Default)]
struct InfoBuilder {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    block_align: u16,
}

impl InfoBuilder {
    fn build(&self, sample_area_size: u64, start_offset: u64) -> Result<WavFileInfo> {
        if self.audio_format != 1 {
            return Err(Error::Unsupported(format!(
                "Invalid audio format {}, must be 1 (PCM)",
                self.audio_format
            )));
        }
        if !(1..=16).contains(&self.channels) {
            return Err(Error::Unsupported(format!("Invalid channel count: {}", self.channels)));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(Error::Unsupported(format!(
                "Unsupported sample width: {} bits",
                self.bits_per_sample
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::container("WAV sample rate is zero"));
        }

        let sample_bytes = self.bits_per_sample / 8;
        let minimum_align = self.channels * sample_bytes;
        if self.block_align < minimum_align || self.block_align > minimum_align + 32 {
            return Err(Error::container(format!("Block align is not valid: {}", self.block_align)));
        }
        if self.block_align % sample_bytes != 0 {
            return Err(Error::container(format!(
                "Block align is not a multiple of bits per sample: {}",
                self.block_align
            )));
        }

        Ok(WavFileInfo {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            block_align: self.block_align,
            block_count: sample_area_size / self.block_align as u64,
            start_offset,
        })
    }
}

fn read_le16<I: SeekableInput + ?Sized>(input: &mut I) -> Result<u16> {
    Ok(input.read_be16()?.swap_bytes())
}

fn read_le32<I: SeekableInput + ?Sized>(input: &mut I) -> Result<u32> {
    Ok(input.read_be32()?.swap_bytes())
}

/// Reads chunks up to the start of the sample data
pub fn parse_wav_headers<I: SeekableInput + ?Sized>(input: &mut I) -> Result<WavFileInfo> {
    let mut riff = [0u8; 12];
    input.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(Error::container("Not a WAV header."));
    }

    let mut builder = InfoBuilder::default();
    let mut has_format = false;
    loop {
        let mut name = [0u8; 4];
        match input.read_exact(&mut name) {
            Ok(()) => {}
            Err(e) if is_eof(&e) => return Err(Error::container("WAV file has no data chunk")),
            Err(e) => return Err(e.into()),
        }
        let size = read_le32(input)? as u64;

        match &name {
            b"fmt " => {
                if size < 16 {
                    return Err(Error::container("WAV format chunk is too short"));
                }
                builder.audio_format = read_le16(input)?;
                builder.channels = read_le16(input)?;
                builder.sample_rate = read_le32(input)?;
                read_le32(input)?;
                builder.block_align = read_le16(input)?;
                builder.bits_per_sample = read_le16(input)?;
                let mut consumed = 16;
                if builder.audio_format == FORMAT_EXTENSIBLE && size >= 40 {
                    // extension size, valid bits and channel mask precede the sub-format GUID
                    input.skip_fully(8)?;
                    builder.audio_format = read_le16(input)?;
                    input.skip_fully(14)?;
                    consumed = 40;
                }
                input.skip_fully(size - consumed + (size & 1))?;
                has_format = true;
            }
            b"data" => {
                if !has_format {
                    return Err(Error::container("WAV data chunk before format chunk"));
                }
                let start = input.position();
                let available = input.remaining().unwrap_or(u64::MAX);
                return builder.build(size.min(available), start);
            }
            _ => input.skip_fully(size + (size & 1))?,
        }
    }
}

/// Converts little-endian samples of any supported width to 16-bit
fn convert_block(info: &WavFileInfo, block: &[u8], out: &mut Vec<u8>) {
    let width = info.bytes_per_sample();
    for channel in 0..info.channels as usize {
        let sample = &block[channel * width..(channel + 1) * width];
        let value: i16 = match width {
            1 => ((sample[0] as i16) - 128) << 8,
            2 => i16::from_le_bytes([sample[0], sample[1]]),
            // the two most significant bytes
            _ => i16::from_le_bytes([sample[width - 2], sample[width - 1]]),
        };
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub struct WavProbe;

impl ContainerProbe for WavProbe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn matches_hints(&self, _hints: &MediaContainerHints) -> bool {
        false
    }

    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>> {
        if !super::check_next_bytes(input, &RIFF_HEADER)? {
            return Ok(None);
        }

        debug!(track = %identifier, "Track is a WAV file");
        let info = match parse_wav_headers(input) {
            Ok(info) => info,
            Err(Error::Unsupported(reason)) => {
                return Ok(Some(DetectionResult::unsupported(PROBE_NAME, reason)));
            }
            Err(e) => return Err(e),
        };

        let track_info = TrackInfo::builder(identifier)
            .length_ms(Some(info.duration_ms()))
            .build();
        Ok(Some(DetectionResult::supported(PROBE_NAME, None, track_info)))
    }

    fn create_demuxer(&self, _parameters: Option<&str>, input: Box<dyn SeekableInput>) -> Result<Box<dyn Demuxer>> {
        let mut demuxer = WavDemuxer::new(input);
        demuxer.parse_headers()?;
        Ok(Box::new(demuxer))
    }
}

pub struct WavDemuxer<I> {
    input: I,
    info: Option<WavFileInfo>,
    format: Option<AudioTrackFormat>,
    next_block: u64,
}

impl<I: SeekableInput> WavDemuxer<I> {
    pub fn new(input: I) -> Self {
        Self {
            input,
            info: None,
            format: None,
            next_block: 0,
        }
    }

    pub fn info(&self) -> Option<&WavFileInfo> {
        self.info.as_ref()
    }
}

impl<I: SeekableInput> Demuxer for WavDemuxer<I> {
    fn parse_headers(&mut self) -> Result<()> {
        if self.info.is_some() {
            return Ok(());
        }
        if self.input.position() != 0 {
            self.input.seek(0)?;
        }

        let info = parse_wav_headers(&mut self.input)?;
        debug!(
            "WAV with {} channels at {} Hz, {} bits, {} blocks",
            info.channels, info.sample_rate, info.bits_per_sample, info.block_count
        );
        self.format = Some(AudioTrackFormat {
            codec: CodecConfig::Pcm16,
            sample_rate: info.sample_rate,
            channels: info.channels,
        });
        self.info = Some(info);
        Ok(())
    }

    fn tracks(&self) -> Vec<ContainerTrack> {
        match self.info {
            Some(_) => vec![ContainerTrack {
                id: 0,
                kind: TrackKind::Audio,
                codec: "pcm".to_string(),
                supported: true,
            }],
            None => Vec::new(),
        }
    }

    fn audio_format(&self) -> Option<&AudioTrackFormat> {
        self.format.as_ref()
    }

    fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        let Some(info) = self.info else {
            return Ok(None);
        };
        let blocks = BLOCKS_PER_PACKET.min(info.block_count.saturating_sub(self.next_block));
        if blocks == 0 {
            return Ok(None);
        }

        let expected = info.start_offset + self.next_block * info.block_align as u64;
        if self.input.position() != expected {
            self.input.seek(expected)?;
        }

        let align = info.block_align as usize;
        let mut raw = vec![0u8; blocks as usize * align];
        let read = read_up_to(&mut self.input, &mut raw)?;
        let whole = read / align;
        if whole == 0 {
            return Ok(None);
        }

        let mut data = Vec::with_capacity(whole * info.channels as usize * 2);
        for block in raw[..whole * align].chunks_exact(align) {
            convert_block(&info, block, &mut data);
        }

        let timecode_ms = (self.next_block * 1000 / info.sample_rate as u64) as i64;
        self.next_block += whole as u64;
        Ok(Some(MediaPacket { timecode_ms, data }))
    }

    fn seek(&mut self, timecode_ms: i64) -> Result<i64> {
        let Some(info) = self.info else {
            return Err(Error::NotSeekable);
        };
        if !self.input.can_seek_hard() {
            return Err(Error::NotSeekable);
        }

        let block = (timecode_ms.max(0) as u64 * info.sample_rate as u64 / 1000).min(info.block_count);
        self.input.seek(info.start_offset + block * info.block_align as u64)?;
        self.next_block = block;
        Ok((block * 1000 / info.sample_rate as u64) as i64)
    }

    fn is_seekable(&self) -> bool {
        self.input.can_seek_hard()
    }

    fn duration_ms(&self) -> Option<i64> {
        self.info.map(|info| info.duration_ms())
    }
}
