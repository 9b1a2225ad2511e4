//! Chunk encoders
//!
//! Turn one full chunk of interleaved PCM into the payload of an
//! [`AudioFrame`](crate::format::AudioFrame) for the configured
//! [`AudioDataFormat`].

mod opus;
mod pcm;

pub use opus::OpusChunkEncoder;
pub use pcm::PcmChunkEncoder;

use crate::error::Result;
use crate::format::{AudioDataFormat, ChunkCodec};

pub trait ChunkEncoder: Send {
    /// Encodes exactly one chunk of samples, replacing the contents of `out`
    fn encode(&mut self, samples: &[i16], out: &mut Vec<u8>) -> Result<()>;

    /// Releases the encoder. Further calls are no-ops.
    fn close(&mut self);
}

pub fn create_encoder(format: &AudioDataFormat) -> Result<Box<dyn ChunkEncoder>> {
    match format.codec {
        ChunkCodec::Opus => Ok(Box::new(OpusChunkEncoder::new(format)?)),
        ChunkCodec::Pcm16Le => Ok(Box::new(PcmChunkEncoder::new(false))),
        ChunkCodec::Pcm16Be => Ok(Box::new(PcmChunkEncoder::new(true))),
    }
}
