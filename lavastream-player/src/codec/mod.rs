//! Compressed packet decoders
//!
//! Every codec sits behind [`PacketDecoder`]: compressed packets go in with
//! [`push`](PacketDecoder::push) and interleaved 16-bit PCM comes out of
//! repeated [`pull`](PacketDecoder::pull) calls. The [`DecodeRouter`] picks
//! the decoder for a track once its first packet arrives and feeds the
//! filter chain.

mod embedded;
mod opus;
mod pcm;
mod router;

pub use embedded::EmbeddedDecoder;
pub use opus::{OpusPacketDecoder, OPUS_SAMPLE_RATE};
pub use pcm::PcmPassthrough;
pub use router::DecodeRouter;

use crate::container::{AudioTrackFormat, CodecConfig};
use crate::error::Result;

/// Sample rate and channel count of decoded PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmShape {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmShape {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

/// One codec instance for one track
pub trait PacketDecoder: Send {
    fn codec_name(&self) -> &'static str;

    /// Accepts one compressed packet. A packet may yield any number of PCM
    /// blocks, including none.
    fn push(&mut self, packet: &[u8]) -> Result<()>;

    /// PCM shape, once enough of the stream has been seen to know it
    fn shape(&self) -> Option<PcmShape>;

    /// Moves the next decoded block into `out`, replacing its contents.
    /// Returns false when nothing is pending.
    fn pull(&mut self, out: &mut Vec<i16>) -> Result<bool>;

    /// Makes any output held back by the codec available to `pull`
    fn flush(&mut self) -> Result<()>;

    /// Drops continuity state after the input jumped to a new position
    fn reset(&mut self) -> Result<()>;

    /// Releases the codec. Further calls are no-ops.
    fn close(&mut self);
}

/// Creates the decoder for a demuxed track
pub fn create_decoder(format: &AudioTrackFormat) -> Result<Box<dyn PacketDecoder>> {
    match &format.codec {
        CodecConfig::Opus { head } => Ok(Box::new(OpusPacketDecoder::new(
            head.as_deref(),
            format.channels,
        )?)),
        CodecConfig::Pcm16 => Ok(Box::new(PcmPassthrough::new(PcmShape::new(
            format.sample_rate,
            format.channels,
        )))),
        codec => Ok(Box::new(EmbeddedDecoder::new(
            codec,
            format.sample_rate,
            format.channels,
        )?)),
    }
}
