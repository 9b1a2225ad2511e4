use super::{PacketDecoder, PcmShape};
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Packets that already are interleaved 16-bit little-endian PCM
pub struct PcmPassthrough {
    shape: PcmShape,
    pending: VecDeque<Vec<i16>>,
    closed: bool,
}

impl PcmPassthrough {
    pub fn new(shape: PcmShape) -> Self {
        Self {
            shape,
            pending: VecDeque::new(),
            closed: false,
        }
    }
}

impl PacketDecoder for PcmPassthrough {
    fn codec_name(&self) -> &'static str {
        "pcm_s16le"
    }

    fn push(&mut self, packet: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::codec("PCM decoder used after close"));
        }
        let samples = packet
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        if !samples.is_empty() {
            self.pending.push_back(samples);
        }
        Ok(())
    }

    fn shape(&self) -> Option<PcmShape> {
        Some(self.shape)
    }

    fn pull(&mut self, out: &mut Vec<i16>) -> Result<bool> {
        match self.pending.pop_front() {
            Some(block) => {
                *out = block;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}
