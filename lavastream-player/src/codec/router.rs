//! Packet routing from the demuxer into the decoder and filter chain
//!
//! The decoder is created when the first packet arrives, and the filter
//! chain once the decoder knows the PCM shape. A seek reported before the
//! chain exists is held and replayed into it. After a seek the decoder is
//! closed and a fresh one is created for the next packet.

use super::{create_decoder, PacketDecoder, PcmShape};
use crate::container::{AudioTrackFormat, MediaPacket};
use crate::error::{Error, Result};
use crate::filter::{build_chain, FrameSink, PcmFilter};
use crate::format::AudioDataFormat;
use crate::playback::PlayerOptions;
use std::sync::Arc;
use tracing::debug;

pub struct DecodeRouter {
    track_format: AudioTrackFormat,
    output_format: AudioDataFormat,
    options: Arc<PlayerOptions>,
    sink: Option<Box<dyn FrameSink>>,
    decoder: Option<Box<dyn PacketDecoder>>,
    chain: Option<Box<dyn PcmFilter>>,
    pending_seek: Option<(i64, i64)>,
    block: Vec<i16>,
    closed: bool,
}

impl DecodeRouter {
    pub fn new(
        track_format: AudioTrackFormat,
        output_format: AudioDataFormat,
        options: Arc<PlayerOptions>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        Self {
            track_format,
            output_format,
            options,
            sink: Some(sink),
            decoder: None,
            chain: None,
            pending_seek: None,
            block: Vec::new(),
            closed: false,
        }
    }

    /// Shape of the decoded PCM, once known
    pub fn decoded_shape(&self) -> Option<PcmShape> {
        self.decoder.as_ref().and_then(|decoder| decoder.shape())
    }

    pub fn process_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        if self.closed {
            return Err(Error::Stopped);
        }

        if self.decoder.is_none() {
            let decoder = create_decoder(&self.track_format)?;
            debug!(codec = decoder.codec_name(), "Decoder selected");
            self.decoder = Some(decoder);
        }

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.push(&packet.data)?;
        }
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        if self.chain.is_none() {
            match self.decoded_shape() {
                Some(shape) => {
                    let chain = self.create_chain(shape)?;
                    self.chain = Some(chain);
                }
                None => return Ok(()),
            }
        }

        let (Some(decoder), Some(chain)) = (self.decoder.as_mut(), self.chain.as_mut()) else {
            return Ok(());
        };
        while decoder.pull(&mut self.block)? {
            chain.process(&self.block)?;
        }
        Ok(())
    }

    fn create_chain(&mut self, shape: PcmShape) -> Result<Box<dyn PcmFilter>> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::codec("filter chain was already built"))?;
        let mut chain = build_chain(shape, self.output_format, self.options.clone(), sink)?;

        if let Some((requested, provided)) = self.pending_seek.take() {
            chain.seek_performed(requested, provided);
        }
        Ok(chain)
    }

    /// Reports a completed demuxer seek
    pub fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }

        match self.chain.as_mut() {
            Some(chain) => chain.seek_performed(requested_ms, provided_ms),
            None => self.pending_seek = Some((requested_ms, provided_ms)),
        }
    }

    /// Drains the decoder and the chain at the end of the stream
    pub fn flush(&mut self) -> Result<()> {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush()?;
        }
        self.drain()?;
        match self.chain.as_mut() {
            Some(chain) => chain.flush(),
            None => Ok(()),
        }
    }

    /// Closes the filter chain, then the decoder. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut chain) = self.chain.take() {
            chain.close();
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
        self.sink = None;
    }
}

impl Drop for DecodeRouter {
    fn drop(&mut self) {
        self.close();
    }
}
