//! Output chunk formats
//!
//! An [`AudioDataFormat`] fixes the shape of every chunk a track produces:
//! channel count, sample rate, samples per chunk and the chunk codec.

mod frame;

pub use frame::AudioFrame;

use lavastream_common::settings::OutputFormat;
use serde::Serialize;
use std::fmt;

/// Opus silence packet (one 20 ms CELT frame of digital silence)
pub const OPUS_SILENCE: [u8; 3] = [0xFC, 0xFF, 0xFE];

/// Codec of the produced chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkCodec {
    Opus,
    Pcm16Le,
    Pcm16Be,
}

impl ChunkCodec {
    pub fn name(self) -> &'static str {
        match self {
            ChunkCodec::Opus => "OPUS",
            ChunkCodec::Pcm16Le => "PCM_S16_LE",
            ChunkCodec::Pcm16Be => "PCM_S16_BE",
        }
    }
}

/// Describes the layout of output chunks
///
/// Equality is structural over channels, rate, chunk size and codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AudioDataFormat {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub chunk_sample_count: u32,
    pub codec: ChunkCodec,
}

impl AudioDataFormat {
    pub const fn new(channel_count: u16, sample_rate: u32, chunk_sample_count: u32, codec: ChunkCodec) -> Self {
        Self {
            channel_count,
            sample_rate,
            chunk_sample_count,
            codec,
        }
    }

    pub fn from_output_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Opus => Self::new(2, 48_000, 960, ChunkCodec::Opus),
            OutputFormat::PcmS16le => Self::new(2, 48_000, 960, ChunkCodec::Pcm16Le),
            OutputFormat::PcmS16be => Self::new(2, 48_000, 960, ChunkCodec::Pcm16Be),
            OutputFormat::PcmS16le44k => Self::new(2, 44_100, 960, ChunkCodec::Pcm16Le),
            OutputFormat::PcmS16be44k => Self::new(2, 44_100, 960, ChunkCodec::Pcm16Be),
        }
    }

    /// Duration of one chunk in milliseconds
    pub fn frame_duration_ms(&self) -> i64 {
        self.chunk_sample_count as i64 * 1000 / self.sample_rate as i64
    }

    /// Interleaved i16 samples in one chunk
    pub fn samples_per_chunk(&self) -> usize {
        self.chunk_sample_count as usize * self.channel_count as usize
    }

    pub fn maximum_chunk_size(&self) -> usize {
        match self.codec {
            ChunkCodec::Opus => 32 + 1536 * self.chunk_sample_count as usize / 960,
            ChunkCodec::Pcm16Le | ChunkCodec::Pcm16Be => self.samples_per_chunk() * 2,
        }
    }

    pub fn expected_chunk_size(&self) -> usize {
        match self.codec {
            ChunkCodec::Opus => 32 + 512 * self.chunk_sample_count as usize / 960,
            ChunkCodec::Pcm16Le | ChunkCodec::Pcm16Be => self.samples_per_chunk() * 2,
        }
    }

    /// Chunk payload representing silence, produced without an encoder
    pub fn silence_bytes(&self) -> Vec<u8> {
        match self.codec {
            ChunkCodec::Opus => OPUS_SILENCE.to_vec(),
            ChunkCodec::Pcm16Le | ChunkCodec::Pcm16Be => vec![0; self.samples_per_chunk() * 2],
        }
    }
}

impl fmt::Display for AudioDataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}ch {}Hz x{}",
            self.codec.name(),
            self.channel_count,
            self.sample_rate,
            self.chunk_sample_count
        )
    }
}
