//! Opus decoding through libopus

use super::{PacketDecoder, PcmShape};
use crate::error::{Error, Result};
use crate::natives::{opus_loader, HandleSlot, NativeHandle, NativeLibraryLoader};
use audiopus::coder::Decoder as OpusDecoder;
use audiopus::{Channels, SampleRate};
use std::collections::VecDeque;
use tracing::debug;

/// Opus always decodes at 48 kHz
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Longest Opus packet is 120 ms
const MAX_FRAME_SAMPLES: usize = 5760;

pub(crate) const DECODER_HANDLE_KIND: &str = "opus-decoder";

fn head_channel_count(head: &[u8]) -> Option<u16> {
    if head.len() >= 10 && &head[..8] == b"OpusHead" {
        Some(head[9] as u16)
    } else {
        None
    }
}

fn create_native(channels: u16) -> Result<HandleSlot<OpusDecoder>> {
    let layout = match channels {
        1 => Channels::Mono,
        2 => Channels::Stereo,
        other => {
            return Err(Error::Unsupported(format!(
                "Opus streams with {} channels are not supported",
                other
            )))
        }
    };

    let decoder = OpusDecoder::new(SampleRate::Hz48000, layout)
        .map_err(|e| Error::codec(format!("Failed to create Opus decoder: {:?}", e)))?;
    Ok(HandleSlot::new(NativeHandle::new(DECODER_HANDLE_KIND, decoder)))
}

pub struct OpusPacketDecoder {
    handle: HandleSlot<OpusDecoder>,
    channels: u16,
    scratch: Vec<i16>,
    pending: VecDeque<Vec<i16>>,
}

impl OpusPacketDecoder {
    /// Channel count comes from the OpusHead when present, else from the
    /// container's track entry.
    pub fn new(head: Option<&[u8]>, container_channels: u16) -> Result<Self> {
        Self::with_loader(opus_loader(), head, container_channels)
    }

    /// No native handle is created unless `loader` reports libopus available
    pub fn with_loader(
        loader: &NativeLibraryLoader,
        head: Option<&[u8]>,
        container_channels: u16,
    ) -> Result<Self> {
        loader.ensure_available()?;

        let channels = head
            .and_then(head_channel_count)
            .unwrap_or(container_channels);
        let handle = create_native(channels)?;

        debug!(channels, "Opus decoder created");
        Ok(Self {
            handle,
            channels,
            scratch: vec![0; MAX_FRAME_SAMPLES * channels as usize],
            pending: VecDeque::new(),
        })
    }
}

impl PacketDecoder for OpusPacketDecoder {
    fn codec_name(&self) -> &'static str {
        "opus"
    }

    fn push(&mut self, packet: &[u8]) -> Result<()> {
        if packet.is_empty() {
            return Ok(());
        }

        let decoder = self.handle.get_mut()?;
        let frames = decoder
            .decode(Some(packet), &mut self.scratch, false)
            .map_err(|e| Error::codec(format!("Opus decoding failed: {:?}", e)))?;

        if frames > 0 {
            let samples = frames * self.channels as usize;
            self.pending.push_back(self.scratch[..samples].to_vec());
        }
        Ok(())
    }

    fn shape(&self) -> Option<PcmShape> {
        Some(PcmShape::new(OPUS_SAMPLE_RATE, self.channels))
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
        self.handle.get()?;
        self.pending.clear();
        let fresh = create_native(self.channels)?;
        self.handle.release();
        self.handle = fresh;
        Ok(())
    }

    fn close(&mut self) {
        if self.handle.release() {
            self.pending.clear();
            debug!("Opus decoder closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natives::live_handle_count;
    use serial_test::serial;

    #[test]
    fn test_head_channel_count() {
        let mut head = b"OpusHead".to_vec();
        head.extend_from_slice(&[1, 1, 0x38, 0x01, 0x80, 0xBB, 0, 0, 0, 0, 0]);
        assert_eq!(head_channel_count(&head), Some(1));
        assert_eq!(head_channel_count(b"OpusTags.."), None);
    }

    #[test]
    #[serial]
    fn test_close_twice_releases_once() {
        let before = live_handle_count(DECODER_HANDLE_KIND);
        let mut decoder = OpusPacketDecoder::new(None, 2).unwrap();
        assert_eq!(live_handle_count(DECODER_HANDLE_KIND), before + 1);
        assert_eq!(decoder.shape(), Some(PcmShape::new(48_000, 2)));

        decoder.close();
        decoder.close();
        assert_eq!(live_handle_count(DECODER_HANDLE_KIND), before);
        assert!(matches!(
            decoder.push(&[0xFC, 0xFF, 0xFE]),
            Err(Error::ReleasedHandle(DECODER_HANDLE_KIND))
        ));
    }

    #[test]
    #[serial]
    fn test_decodes_silence_packet() {
        let mut decoder = OpusPacketDecoder::new(None, 2).unwrap();
        decoder.push(&[0xFC, 0xFF, 0xFE]).unwrap();

        let mut out = Vec::new();
        assert!(decoder.pull(&mut out).unwrap());
        assert_eq!(out.len(), 960 * 2);
        assert!(!decoder.pull(&mut out).unwrap());

        decoder.reset().unwrap();
        assert!(!decoder.pull(&mut out).unwrap());
    }

    #[test]
    #[serial]
    fn test_unavailable_library_blocks_handle_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libopus.so");
        std::fs::write(&path, b"truncated").unwrap();
        let loader = NativeLibraryLoader::new("opus").with_library_path(Some(path));

        let before = live_handle_count(DECODER_HANDLE_KIND);
        assert!(matches!(
            OpusPacketDecoder::with_loader(&loader, None, 2),
            Err(Error::NativeLibrary(_))
        ));
        assert_eq!(live_handle_count(DECODER_HANDLE_KIND), before);
    }

    #[test]
    fn test_rejects_surround() {
        assert!(matches!(
            OpusPacketDecoder::new(None, 6),
            Err(Error::Unsupported(_))
        ));
    }
}
