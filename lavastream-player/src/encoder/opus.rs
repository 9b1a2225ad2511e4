use super::ChunkEncoder;
use crate::error::{Error, Result};
use crate::format::AudioDataFormat;
use crate::natives::{opus_loader, HandleSlot, NativeHandle, NativeLibraryLoader};
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Channels, SampleRate};
use tracing::debug;

pub(crate) const ENCODER_HANDLE_KIND: &str = "opus-encoder";

/// libopus encoder producing one packet per chunk
pub struct OpusChunkEncoder {
    handle: HandleSlot<OpusEncoder>,
    scratch: Vec<u8>,
}

impl OpusChunkEncoder {
    pub fn new(format: &AudioDataFormat) -> Result<Self> {
        Self::with_loader(opus_loader(), format)
    }

    pub fn with_loader(loader: &NativeLibraryLoader, format: &AudioDataFormat) -> Result<Self> {
        loader.ensure_available()?;

        let sample_rate = match format.sample_rate {
            8_000 => SampleRate::Hz8000,
            12_000 => SampleRate::Hz12000,
            16_000 => SampleRate::Hz16000,
            24_000 => SampleRate::Hz24000,
            48_000 => SampleRate::Hz48000,
            other => return Err(Error::codec(format!("Opus cannot encode at {} Hz", other))),
        };
        let channels = match format.channel_count {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(Error::codec(format!("Opus cannot encode {} channels", other)))
            }
        };

        let encoder = OpusEncoder::new(sample_rate, channels, Application::Audio)
            .map_err(|e| Error::codec(format!("Failed to create Opus encoder: {:?}", e)))?;
        debug!(%format, "Opus encoder created");

        Ok(Self {
            handle: HandleSlot::new(NativeHandle::new(ENCODER_HANDLE_KIND, encoder)),
            scratch: vec![0; format.maximum_chunk_size()],
        })
    }
}

impl ChunkEncoder for OpusChunkEncoder {
    fn encode(&mut self, samples: &[i16], out: &mut Vec<u8>) -> Result<()> {
        let encoder = self.handle.get_mut()?;
        let length = encoder
            .encode(samples, &mut self.scratch)
            .map_err(|e| Error::codec(format!("Opus encoding failed: {:?}", e)))?;

        out.clear();
        out.extend_from_slice(&self.scratch[..length]);
        Ok(())
    }

    fn close(&mut self) {
        if self.handle.release() {
            debug!("Opus encoder closed");
        }
    }
}
