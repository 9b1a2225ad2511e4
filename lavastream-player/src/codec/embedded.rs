//! In-process software decoders for MP3, AAC and Vorbis

use super::{PacketDecoder, PcmShape};
use crate::container::CodecConfig;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use symphonia::core::audio::{Channels, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_MP3,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, warn};

/// Wraps a symphonia codec fed with packets from our own demuxers
pub struct EmbeddedDecoder {
    codec_name: &'static str,
    decoder: Option<Box<dyn Decoder>>,
    shape: Option<PcmShape>,
    pending: VecDeque<Vec<i16>>,
    sample_buffer: Option<(SignalSpec, usize, SampleBuffer<i16>)>,
    packet_index: u64,
}

fn channel_layout(count: u16) -> Option<Channels> {
    if count == 0 || count > 18 {
        return None;
    }
    Channels::from_bits((1u32 << count) - 1)
}

fn codec_parameters(codec: &CodecConfig, sample_rate: u32, channels: u16) -> Result<CodecParameters> {
    let (codec_type, extra_data): (CodecType, Option<Vec<u8>>) = match codec {
        CodecConfig::Mp3 => (CODEC_TYPE_MP3, None),
        CodecConfig::Aac {
            audio_specific_config,
        } => (CODEC_TYPE_AAC, Some(audio_specific_config.clone())),
        CodecConfig::Vorbis {
            identification,
            setup,
        } => {
            let mut headers = Vec::with_capacity(identification.len() + setup.len());
            headers.extend_from_slice(identification);
            headers.extend_from_slice(setup);
            (CODEC_TYPE_VORBIS, Some(headers))
        }
        other => {
            return Err(Error::codec(format!(
                "{} is not handled by the embedded decoders",
                other.name()
            )))
        }
    };

    let mut params = CodecParameters::new();
    params.for_codec(codec_type);
    if sample_rate > 0 {
        params.with_sample_rate(sample_rate);
    }
    if let Some(layout) = channel_layout(channels) {
        params.with_channels(layout);
    }
    if let Some(extra_data) = extra_data.filter(|data| !data.is_empty()) {
        params.with_extra_data(extra_data.into_boxed_slice());
    }
    Ok(params)
}

impl EmbeddedDecoder {
    pub fn new(codec: &CodecConfig, sample_rate: u32, channels: u16) -> Result<Self> {
        let params = codec_parameters(codec, sample_rate, channels)?;
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::codec(format!("Failed to create {} decoder: {}", codec.name(), e)))?;

        debug!(codec = codec.name(), sample_rate, channels, "Embedded decoder created");

        Ok(Self {
            codec_name: codec.name(),
            decoder: Some(decoder),
            shape: None,
            pending: VecDeque::new(),
            sample_buffer: None,
            packet_index: 0,
        })
    }

    fn decoder_mut(&mut self) -> Result<&mut Box<dyn Decoder>> {
        self.decoder
            .as_mut()
            .ok_or_else(|| Error::codec(format!("{} decoder used after close", self.codec_name)))
    }
}

impl PacketDecoder for EmbeddedDecoder {
    fn codec_name(&self) -> &'static str {
        self.codec_name
    }

    fn push(&mut self, packet: &[u8]) -> Result<()> {
        let index = self.packet_index;
        self.packet_index += 1;

        let packet = Packet::new_from_slice(0, index, 0, packet);
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(Error::codec(format!("{} decoder used after close", self.codec_name)));
        };

        let outcome = match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let capacity = decoded.capacity();
                if decoded.frames() > 0 {
                    let reuse = matches!(
                        &self.sample_buffer,
                        Some((buffer_spec, buffer_capacity, _))
                            if *buffer_spec == spec && *buffer_capacity >= capacity
                    );
                    if !reuse {
                        self.sample_buffer =
                            Some((spec, capacity, SampleBuffer::new(capacity as u64, spec)));
                    }
                    if let Some((_, _, buffer)) = self.sample_buffer.as_mut() {
                        buffer.copy_interleaved_ref(decoded);
                        self.pending.push_back(buffer.samples().to_vec());
                    }
                }
                self.shape = Some(PcmShape::new(spec.rate, spec.channels.count() as u16));
                Ok(())
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(SymphoniaError::DecodeError(reason)) => {
                warn!(codec = self.codec_name, "Skipping undecodable packet: {}", reason);
                Ok(())
            }
            Err(SymphoniaError::ResetRequired) => {
                debug!(codec = self.codec_name, "Decoder requested a reset");
                self.decoder_mut()?.reset();
                Ok(())
            }
            Err(e) => Err(Error::codec(format!("{} decoding failed: {}", self.codec_name, e))),
        }
    }

    fn shape(&self) -> Option<PcmShape> {
        self.shape
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
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.finalize();
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.decoder_mut()?.reset();
        Ok(())
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            self.pending.clear();
            self.sample_buffer = None;
            debug!(codec = self.codec_name, "Embedded decoder closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout_counts() {
        assert_eq!(channel_layout(1).map(|c| c.count()), Some(1));
        assert_eq!(channel_layout(2).map(|c| c.count()), Some(2));
        assert_eq!(channel_layout(6).map(|c| c.count()), Some(6));
        assert!(channel_layout(0).is_none());
    }

    #[test]
    fn test_creates_aac_decoder_from_config() {
        let codec = CodecConfig::Aac {
            audio_specific_config: vec![0x12, 0x10],
        };
        let mut decoder = EmbeddedDecoder::new(&codec, 44_100, 2).unwrap();
        assert_eq!(decoder.codec_name(), "aac");
        assert!(decoder.shape().is_none());

        let mut out = Vec::new();
        assert!(!decoder.pull(&mut out).unwrap());

        decoder.close();
        decoder.close();
        assert!(decoder.push(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_rejects_codecs_with_their_own_adapter() {
        assert!(EmbeddedDecoder::new(&CodecConfig::Pcm16, 48_000, 2).is_err());
        assert!(EmbeddedDecoder::new(&CodecConfig::Opus { head: None }, 48_000, 2).is_err());
    }
}
