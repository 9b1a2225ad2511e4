//! Last stage of the chain: cuts PCM into chunks and encodes them

use super::PcmFilter;
use crate::encoder::ChunkEncoder;
use crate::error::Result;
use crate::format::{AudioDataFormat, AudioFrame};
use crate::playback::PlayerOptions;
use std::sync::Arc;
use tracing::trace;

/// Receiver of finished frames
pub trait FrameSink: Send {
    /// Hands one frame on. Fails with [`Error::Stopped`](crate::Error::Stopped)
    /// when the receiving side has been terminated.
    fn deliver(&mut self, frame: AudioFrame) -> Result<()>;
}

pub struct ChunkOutput {
    format: AudioDataFormat,
    encoder: Box<dyn ChunkEncoder>,
    options: Arc<PlayerOptions>,
    sink: Box<dyn FrameSink>,
    pending: Vec<i16>,
    encoded: Vec<u8>,
    base_timecode_ms: i64,
    emitted_frames: u64,
    skip_samples: usize,
    closed: bool,
}

impl ChunkOutput {
    pub fn new(
        format: AudioDataFormat,
        encoder: Box<dyn ChunkEncoder>,
        options: Arc<PlayerOptions>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        Self {
            format,
            encoder,
            options,
            sink,
            pending: Vec::with_capacity(format.samples_per_chunk()),
            encoded: Vec::with_capacity(format.maximum_chunk_size()),
            base_timecode_ms: 0,
            emitted_frames: 0,
            skip_samples: 0,
            closed: false,
        }
    }

    fn next_timecode(&self) -> i64 {
        self.base_timecode_ms + (self.emitted_frames * 1000 / self.format.sample_rate as u64) as i64
    }

    fn emit_chunk(&mut self) -> Result<()> {
        let volume = self.options.volume();
        // the tail of a ramp down to zero is still audible
        let data = if volume == 0 && self.pending.iter().all(|s| *s == 0) {
            self.format.silence_bytes()
        } else {
            self.encoder.encode(&self.pending, &mut self.encoded)?;
            self.encoded.clone()
        };

        let frame = AudioFrame {
            timecode_ms: self.next_timecode(),
            volume,
            format: self.format,
            data,
        };
        trace!(timecode = frame.timecode_ms, "Chunk produced");

        self.pending.clear();
        self.emitted_frames += self.format.chunk_sample_count as u64;
        self.sink.deliver(frame)
    }
}

impl PcmFilter for ChunkOutput {
    fn process(&mut self, samples: &[i16]) -> Result<()> {
        let mut input = samples;
        if self.skip_samples > 0 {
            let skipped = self.skip_samples.min(input.len());
            self.skip_samples -= skipped;
            input = &input[skipped..];
        }

        let chunk_samples = self.format.samples_per_chunk();
        while !input.is_empty() {
            let take = (chunk_samples - self.pending.len()).min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.pending.len() == chunk_samples {
                self.emit_chunk()?;
            }
        }
        Ok(())
    }

    fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64) {
        self.pending.clear();
        self.emitted_frames = 0;

        if requested_ms > provided_ms {
            let skip_frames = (requested_ms - provided_ms) as u64 * self.format.sample_rate as u64 / 1000;
            self.skip_samples = skip_frames as usize * self.format.channel_count as usize;
            self.base_timecode_ms = requested_ms;
        } else {
            self.skip_samples = 0;
            self.base_timecode_ms = provided_ms;
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending.resize(self.format.samples_per_chunk(), 0);
        self.emit_chunk()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            self.encoder.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PcmChunkEncoder;
    use crate::filter::test_support::CollectingSink;
    use crate::format::ChunkCodec;
    use lavastream_common::params::GlobalParams;

    fn output(options: Arc<PlayerOptions>) -> (CollectingSink, ChunkOutput) {
        let sink = CollectingSink::default();
        let format = AudioDataFormat::new(1, 1000, 10, ChunkCodec::Pcm16Le);
        let chunk = ChunkOutput::new(
            format,
            Box::new(PcmChunkEncoder::new(false)),
            options,
            Box::new(sink.clone()),
        );
        (sink, chunk)
    }

    fn options() -> Arc<PlayerOptions> {
        Arc::new(PlayerOptions::from_params(&GlobalParams::default()))
    }

    #[test]
    fn test_chunks_and_timecodes() {
        let (sink, mut chunk) = output(options());
        chunk.process(&[1; 7]).unwrap();
        chunk.process(&[2; 18]).unwrap();
        chunk.flush().unwrap();

        let frames = sink.frames.lock().unwrap();
        let timecodes: Vec<i64> = frames.iter().map(|f| f.timecode_ms).collect();
        assert_eq!(timecodes, vec![0, 10, 20]);
        assert_eq!(frames[0].data[..14], [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]);
        // tail is padded with silence
        assert_eq!(frames[2].data.len(), 20);
        assert_eq!(frames[2].data[10..], [0; 10]);
    }

    #[test]
    fn test_seek_skips_to_requested_position() {
        let (sink, mut chunk) = output(options());
        chunk.process(&[9; 4]).unwrap();
        chunk.seek_performed(1_250, 1_200);
        chunk.process(&(0..60).collect::<Vec<i16>>()).unwrap();

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames[0].timecode_ms, 1_250);
        assert_eq!(frames[0].data[..2], 50i16.to_le_bytes());
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_zero_volume_emits_silence() {
        let options = options();
        options.set_volume(0);
        let (sink, mut chunk) = output(options);
        chunk.process(&[3; 10]).unwrap();
        chunk.process(&[0; 10]).unwrap();

        let frames = sink.frames.lock().unwrap();
        assert!(!frames[0].is_silence());
        assert_eq!(frames[0].data[..2], 3i16.to_le_bytes());
        assert!(frames[1].is_silence());
        assert_eq!(frames[1].volume, 0);
    }
}
