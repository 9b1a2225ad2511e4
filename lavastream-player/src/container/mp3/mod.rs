//! MP3 (MPEG-1/2/2.5 layer III) probe and demuxer

mod header;
mod id3;
mod seeker;

pub use header::{FrameHeader, MpegVersion};
pub use id3::{read_id3v2, Id3Tags};
pub use seeker::Mp3Seeker;

use super::detection::{DetectionResult, STREAM_SCAN_DISTANCE};
use super::{
    AudioTrackFormat, CodecConfig, ContainerProbe, ContainerTrack, Demuxer, MediaContainerHints,
    MediaPacket, TrackKind,
};
use crate::container::bytes::{is_eof, ReadBytes};
use crate::error::{Error, Result};
use crate::io::SeekableInput;
use lavastream_common::TrackInfo;
use seeker::read_frame_body;
use tracing::{debug, warn};

pub const PROBE_NAME: &str = "mp3";

/// Distance scanned to regain frame sync while demuxing
const RESYNC_DISTANCE: usize = 128 * 1024;

pub struct Mp3Probe;

impl ContainerProbe for Mp3Probe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn matches_hints(&self, hints: &MediaContainerHints) -> bool {
        hints.agree_with("audio/mpeg", "mp3")
    }

    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>> {
        let start = input.position();
        if !super::check_next_bytes(input, &[Some(b'I'), Some(b'D'), Some(b'3')])? {
            let mut scanner = FrameScanner::default();
            if scanner.scan(input, STREAM_SCAN_DISTANCE)?.is_none() {
                return Ok(None);
            }
            input.seek(start)?;
        }

        debug!(track = %identifier, "Track is an MP3 file");
        let mut demuxer = Mp3Demuxer::new(input);
        demuxer.parse_headers()?;

        let info = TrackInfo::builder(identifier)
            .title(demuxer.tags.title.clone())
            .author(demuxer.tags.artist.clone())
            .length_ms(demuxer.duration_ms())
            .is_stream(!demuxer.is_seekable())
            .build();

        Ok(Some(DetectionResult::supported(PROBE_NAME, None, info)))
    }

    fn create_demuxer(&self, _parameters: Option<&str>, input: Box<dyn SeekableInput>) -> Result<Box<dyn Demuxer>> {
        let mut demuxer = Mp3Demuxer::new(input);
        demuxer.parse_headers()?;
        Ok(Box::new(demuxer))
    }
}

/// Sliding four-byte window looking for a valid frame header
#[derive(Default)]
struct FrameScanner {
    window: [u8; 4],
    filled: usize,
}

impl FrameScanner {
    /// Reads until a frame header has been consumed, returning it with its
    /// raw bytes, or `None` after `distance` bytes or at end of input.
    fn scan<I: SeekableInput + ?Sized>(
        &mut self,
        input: &mut I,
        distance: usize,
    ) -> Result<Option<(FrameHeader, [u8; 4])>> {
        self.filled = 0;
        for _ in 0..distance + FrameHeader::SIZE {
            let byte = match input.read_byte() {
                Ok(b) => b,
                Err(e) if is_eof(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            self.window.copy_within(1.., 0);
            self.window[3] = byte;
            self.filled = (self.filled + 1).min(4);

            if self.filled == 4 {
                if let Some(header) = FrameHeader::parse(self.window) {
                    return Ok(Some((header, self.window)));
                }
            }
        }
        Ok(None)
    }
}

pub struct Mp3Demuxer<I> {
    input: I,
    parsed: bool,
    tags: Id3Tags,
    format: Option<AudioTrackFormat>,
    seeker: Mp3Seeker,
    /// Header and bytes of a frame read during header parsing, not yet returned
    pending: Option<(FrameHeader, Vec<u8>)>,
    sample_rate: u32,
    sample_position: u64,
    scanner: FrameScanner,
}

impl<I: SeekableInput> Mp3Demuxer<I> {
    pub fn new(input: I) -> Self {
        Self {
            input,
            parsed: false,
            tags: Id3Tags::default(),
            format: None,
            seeker: Mp3Seeker::Stream,
            pending: None,
            sample_rate: 0,
            sample_position: 0,
            scanner: FrameScanner::default(),
        }
    }

    pub fn tags(&self) -> &Id3Tags {
        &self.tags
    }

    fn next_frame(&mut self, distance: usize) -> Result<Option<(FrameHeader, Vec<u8>)>> {
        let Some((header, raw)) = self.scanner.scan(&mut self.input, distance)? else {
            return Ok(None);
        };
        match read_frame_body(&mut self.input, &header, raw) {
            Ok(frame) => Ok(Some((header, frame))),
            Err(e) if is_eof(&e) => {
                debug!("Truncated final MP3 frame dropped");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<I: SeekableInput> Demuxer for Mp3Demuxer<I> {
    fn parse_headers(&mut self) -> Result<()> {
        if self.parsed {
            return Ok(());
        }

        if self.input.position() != 0 {
            self.input.seek(0)?;
        }
        if let Some(tags) = read_id3v2(&mut self.input)? {
            self.tags = tags;
        }

        let Some((header, frame)) = self.next_frame(STREAM_SCAN_DISTANCE)? else {
            return Err(Error::container("No MP3 frame found after the tag"));
        };
        let frame_start = self.input.position() - frame.len() as u64;
        let content_length = self.input.content_length();

        self.sample_rate = header.sample_rate;
        self.format = Some(AudioTrackFormat {
            codec: CodecConfig::Mp3,
            sample_rate: header.sample_rate,
            channels: header.channels,
        });

        let xing = Mp3Seeker::from_xing_frame(&header, &frame, frame_start, content_length);
        self.seeker = match (xing, content_length) {
            (Some(xing), _) if self.input.can_seek_hard() => xing,
            (_, Some(length)) if self.input.can_seek_hard() => {
                self.pending = Some((header, frame));
                Mp3Seeker::constant_bitrate(&header, frame_start, length)
            }
            (xing, _) => {
                // the Xing frame carries no audio and is never returned
                if xing.is_none() {
                    self.pending = Some((header, frame));
                }
                Mp3Seeker::Stream
            }
        };

        self.parsed = true;
        Ok(())
    }

    fn tracks(&self) -> Vec<ContainerTrack> {
        vec![ContainerTrack {
            id: 0,
            kind: TrackKind::Audio,
            codec: "mp3".to_string(),
            supported: true,
        }]
    }

    fn audio_format(&self) -> Option<&AudioTrackFormat> {
        self.format.as_ref()
    }

    fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        loop {
            let frame = match self.pending.take() {
                Some(frame) => Some(frame),
                None => self.next_frame(RESYNC_DISTANCE)?,
            };

            let Some((header, data)) = frame else {
                return Ok(None);
            };

            if header.sample_rate != self.sample_rate {
                warn!(
                    "MP3 frame with sample rate {} in a {} Hz stream, skipping",
                    header.sample_rate, self.sample_rate
                );
                continue;
            }

            let timecode_ms = (self.sample_position * 1000 / self.sample_rate.max(1) as u64) as i64;
            self.sample_position += header.samples_per_frame() as u64;
            return Ok(Some(MediaPacket { timecode_ms, data }));
        }
    }

    fn seek(&mut self, timecode_ms: i64) -> Result<i64> {
        let target = self.seeker.seek_target(timecode_ms)?;
        self.pending = None;
        self.input.seek(target.position)?;
        self.sample_position = target.timecode_ms as u64 * self.sample_rate as u64 / 1000;
        Ok(target.timecode_ms)
    }

    fn is_seekable(&self) -> bool {
        self.seeker.is_seekable()
    }

    fn duration_ms(&self) -> Option<i64> {
        self.seeker.duration_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ForwardOnlyInput, MemoryInput, SavedHeadInput};
    use std::io::Cursor;

    fn cbr_stream(frames: usize) -> Vec<u8> {
        let header = [0xFF, 0xFB, 0x90, 0x00];
        let mut bytes = Vec::new();
        for _ in 0..frames {
            bytes.extend_from_slice(&header);
            bytes.extend_from_slice(&[0u8; 413]);
        }
        bytes
    }

    #[test]
    fn test_cbr_file_is_seekable() {
        let mut demuxer = Mp3Demuxer::new(MemoryInput::new(cbr_stream(100)));
        demuxer.parse_headers().unwrap();
        assert!(demuxer.is_seekable());
        let duration = demuxer.duration_ms().unwrap();
        assert!((2550..=2620).contains(&duration), "duration {}", duration);

        let first = demuxer.next_packet().unwrap().unwrap();
        assert_eq!(first.timecode_ms, 0);
        assert_eq!(first.data.len(), 417);

        let reached = demuxer.seek(1000).unwrap();
        let next = demuxer.next_packet().unwrap().unwrap();
        assert_eq!(next.timecode_ms, reached);
        assert!(reached <= 1000);
    }

    #[test]
    fn test_packets_until_end() {
        let mut demuxer = Mp3Demuxer::new(MemoryInput::new(cbr_stream(10)));
        demuxer.parse_headers().unwrap();
        let mut count = 0;
        let mut last = -1;
        while let Some(packet) = demuxer.next_packet().unwrap() {
            assert!(packet.timecode_ms > last);
            last = packet.timecode_ms;
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[test]
    fn test_stream_is_not_seekable() {
        let input = SavedHeadInput::new(ForwardOnlyInput::new(Cursor::new(cbr_stream(20))));
        let mut demuxer = Mp3Demuxer::new(input);
        demuxer.parse_headers().unwrap();
        assert!(!demuxer.is_seekable());
        assert_eq!(demuxer.duration_ms(), None);
        assert!(matches!(demuxer.seek(500), Err(Error::NotSeekable)));
        assert!(demuxer.next_packet().unwrap().is_some());
    }
}
