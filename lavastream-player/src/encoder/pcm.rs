use super::ChunkEncoder;
use crate::error::Result;

/// Signed 16-bit PCM in either byte order
pub struct PcmChunkEncoder {
    big_endian: bool,
}

impl PcmChunkEncoder {
    pub fn new(big_endian: bool) -> Self {
        Self { big_endian }
    }
}

impl ChunkEncoder for PcmChunkEncoder {
    fn encode(&mut self, samples: &[i16], out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.reserve(samples.len() * 2);
        for sample in samples {
            let bytes = if self.big_endian {
                sample.to_be_bytes()
            } else {
                sample.to_le_bytes()
            };
            out.extend_from_slice(&bytes);
        }
        Ok(())
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order() {
        let mut out = Vec::new();
        PcmChunkEncoder::new(false).encode(&[0x0102, -2], &mut out).unwrap();
        assert_eq!(out, vec![0x02, 0x01, 0xFE, 0xFF]);

        PcmChunkEncoder::new(true).encode(&[0x0102, -2], &mut out).unwrap();
        assert_eq!(out, vec![0x01, 0x02, 0xFF, 0xFE]);
    }
}
