//! Container detection and demuxing
//!
//! A [`ContainerProbe`] recognises one container family and builds its
//! [`Demuxer`]. Detection walks the probes of a [`ProbeRegistry`]; the
//! winning probe's name and parameters form the track's container
//! descriptor, from which the demuxer is recreated at playback time.

pub mod adts;
mod bytes;
pub mod detection;
mod hints;
pub mod matroska;
pub mod mp3;
pub mod mp4;
pub mod mpegts;
pub mod registry;
pub mod wav;

pub use detection::{check_next_bytes, ContainerDetection, DetectionResult, STREAM_SCAN_DISTANCE};
pub use hints::MediaContainerHints;
pub use registry::ProbeRegistry;

use crate::error::Result;
use crate::io::SeekableInput;
use serde::Serialize;

/// Decoder configuration of the selected audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecConfig {
    Mp3,
    /// AAC with its AudioSpecificConfig
    Aac { audio_specific_config: Vec<u8> },
    /// Vorbis identification and setup headers
    Vorbis { identification: Vec<u8>, setup: Vec<u8> },
    /// Opus with its OpusHead, when the container carries one
    Opus { head: Option<Vec<u8>> },
    /// Interleaved signed 16-bit little-endian samples
    Pcm16,
}

impl CodecConfig {
    pub fn name(&self) -> &'static str {
        match self {
            CodecConfig::Mp3 => "mp3",
            CodecConfig::Aac { .. } => "aac",
            CodecConfig::Vorbis { .. } => "vorbis",
            CodecConfig::Opus { .. } => "opus",
            CodecConfig::Pcm16 => "pcm_s16le",
        }
    }
}

/// Shape of the audio a demuxer yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackFormat {
    pub codec: CodecConfig,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
    Other,
}

/// One elementary track as listed by the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerTrack {
    pub id: u64,
    pub kind: TrackKind,
    pub codec: String,
    pub supported: bool,
}

/// A decode-ready unit of the selected track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub timecode_ms: i64,
    pub data: Vec<u8>,
}

/// Cursor over one container's selected audio track
///
/// Packets come in increasing timecode order. `Ok(None)` from
/// [`next_packet`](Demuxer::next_packet) is the end of the stream.
pub trait Demuxer: Send {
    /// Reads container structure up to the first media data. Calling it
    /// again after success is a no-op.
    fn parse_headers(&mut self) -> Result<()>;

    /// All tracks the container declares
    fn tracks(&self) -> Vec<ContainerTrack>;

    /// Format of the selected audio track; available after `parse_headers`
    fn audio_format(&self) -> Option<&AudioTrackFormat>;

    fn next_packet(&mut self) -> Result<Option<MediaPacket>>;

    /// Seeks to `timecode_ms` and returns the timecode actually reached,
    /// which is at or before the request. Requests past the end land at the
    /// end of the stream.
    fn seek(&mut self, timecode_ms: i64) -> Result<i64>;

    fn is_seekable(&self) -> bool;

    /// Total duration, `None` when unknown
    fn duration_ms(&self) -> Option<i64>;
}

/// Recognises one container family
pub trait ContainerProbe: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches_hints(&self, hints: &MediaContainerHints) -> bool;

    /// Returns `Ok(None)` when the input is not this container.
    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>>;

    /// Builds the demuxer for a previously detected track
    fn create_demuxer(
        &self,
        parameters: Option<&str>,
        input: Box<dyn SeekableInput>,
    ) -> Result<Box<dyn Demuxer>>;
}

/// Parses the `track=<id>` descriptor parameter used by multi-track probes
pub(crate) fn track_parameter(parameters: Option<&str>) -> Option<u64> {
    parameters?
        .split('|')
        .find_map(|part| part.strip_prefix("track="))
        .and_then(|id| id.parse().ok())
}
