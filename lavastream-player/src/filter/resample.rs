//! Sample-rate conversion using rubato
//!
//! Input is gathered into fixed-size blocks per channel; rubato keeps the
//! fractional phase between blocks, so arbitrary packet sizes resample
//! without seams. A seek drops the gathered input and resets the phase.
//!
//! The converter's own latency is trimmed from the start of its output and
//! made up with silence on flush, so output frame `n` lines up with input
//! time `n / output_rate`.

use super::PcmFilter;
use crate::error::{Error, Result};
use lavastream_common::settings::ResamplingQuality;
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Input frames per conversion block
const BLOCK_FRAMES: usize = 1024;

enum Converter {
    Sinc(SincFixedIn<f32>),
    Fast(FastFixedIn<f32>),
}

impl Converter {
    fn new(ratio: f64, channels: usize, quality: ResamplingQuality) -> Result<Self> {
        let sinc = |sinc_len, f_cutoff, oversampling_factor, interpolation, window| {
            let params = SincInterpolationParameters {
                sinc_len,
                f_cutoff,
                interpolation,
                oversampling_factor,
                window,
            };
            SincFixedIn::<f32>::new(ratio, 1.0, params, BLOCK_FRAMES, channels)
                .map(Converter::Sinc)
                .map_err(|e| Error::codec(format!("Failed to create sinc resampler: {}", e)))
        };

        match quality {
            ResamplingQuality::High => sinc(
                256,
                0.95,
                256,
                SincInterpolationType::Cubic,
                WindowFunction::BlackmanHarris2,
            ),
            ResamplingQuality::Medium => sinc(
                64,
                0.91,
                128,
                SincInterpolationType::Linear,
                WindowFunction::Hann2,
            ),
            ResamplingQuality::Low => FastFixedIn::<f32>::new(
                ratio,
                1.0,
                PolynomialDegree::Linear,
                BLOCK_FRAMES,
                channels,
            )
            .map(Converter::Fast)
            .map_err(|e| Error::codec(format!("Failed to create resampler: {}", e))),
        }
    }

    fn input_frames_next(&self) -> usize {
        match self {
            Converter::Sinc(r) => r.input_frames_next(),
            Converter::Fast(r) => r.input_frames_next(),
        }
    }

    fn process(&mut self, input: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let result = match self {
            Converter::Sinc(r) => r.process(input, None),
            Converter::Fast(r) => r.process(input, None),
        };
        result.map_err(|e| Error::codec(format!("Resampling failed: {}", e)))
    }

    /// `None` runs one block of silence through the converter
    fn process_partial(&mut self, input: Option<&[Vec<f32>]>) -> Result<Vec<Vec<f32>>> {
        let result = match self {
            Converter::Sinc(r) => r.process_partial(input, None),
            Converter::Fast(r) => r.process_partial(input, None),
        };
        result.map_err(|e| Error::codec(format!("Resampling failed: {}", e)))
    }

    fn output_delay(&self) -> usize {
        match self {
            Converter::Sinc(r) => r.output_delay(),
            Converter::Fast(r) => r.output_delay(),
        }
    }

    fn reset(&mut self) {
        match self {
            Converter::Sinc(r) => r.reset(),
            Converter::Fast(r) => r.reset(),
        }
    }
}

/// Silent blocks run through the converter on flush at most
const MAX_TAIL_BLOCKS: usize = 4;

pub struct ResampleFilter {
    converter: Converter,
    ratio: f64,
    channels: usize,
    /// Leading output frames still to drop
    delay_frames: usize,
    input_frames: u64,
    output_frames: u64,
    planar: Vec<Vec<f32>>,
    interleaved: Vec<i16>,
    downstream: Box<dyn PcmFilter>,
}

impl ResampleFilter {
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        quality: ResamplingQuality,
        downstream: Box<dyn PcmFilter>,
    ) -> Result<Self> {
        if input_rate == 0 || channels == 0 {
            return Err(Error::codec(format!(
                "Cannot resample {} channels at {} Hz",
                channels, input_rate
            )));
        }

        let channels = channels as usize;
        let ratio = output_rate as f64 / input_rate as f64;
        debug!(input_rate, output_rate, channels, %quality, "Resampler created");

        let converter = Converter::new(ratio, channels, quality)?;
        Ok(Self {
            delay_frames: converter.output_delay(),
            converter,
            ratio,
            channels,
            input_frames: 0,
            output_frames: 0,
            planar: vec![Vec::with_capacity(BLOCK_FRAMES); channels],
            interleaved: Vec::new(),
            downstream,
        })
    }

    /// Output frames the input so far should have produced
    fn expected_output_frames(&self) -> u64 {
        (self.input_frames as f64 * self.ratio).round() as u64
    }

    /// Passes converted frames on, minus any latency still to trim and
    /// anything beyond `limit` frames in total
    fn emit(&mut self, planar: Vec<Vec<f32>>, limit: Option<u64>) -> Result<()> {
        let available = planar.first().map_or(0, Vec::len);
        let skip = self.delay_frames.min(available);
        self.delay_frames -= skip;

        let mut end = available;
        if let Some(limit) = limit {
            let room = limit.saturating_sub(self.output_frames) as usize;
            end = end.min(skip + room);
        }
        if end <= skip {
            return Ok(());
        }
        self.output_frames += (end - skip) as u64;

        self.interleaved.clear();
        self.interleaved.reserve((end - skip) * self.channels);
        for frame in skip..end {
            for channel in &planar {
                self.interleaved.push(to_i16(channel[frame]));
            }
        }
        self.downstream.process(&self.interleaved)
    }

    fn clear_pending(&mut self) {
        for channel in &mut self.planar {
            channel.clear();
        }
    }

    fn restart(&mut self) {
        self.clear_pending();
        self.converter.reset();
        self.delay_frames = self.converter.output_delay();
        self.input_frames = 0;
        self.output_frames = 0;
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl PcmFilter for ResampleFilter {
    fn process(&mut self, samples: &[i16]) -> Result<()> {
        for frame in samples.chunks_exact(self.channels) {
            for (channel, sample) in self.planar.iter_mut().zip(frame) {
                channel.push(*sample as f32 / 32768.0);
            }
            self.input_frames += 1;

            if self.planar[0].len() >= self.converter.input_frames_next() {
                let output = self.converter.process(&self.planar)?;
                self.clear_pending();
                self.emit(output, None)?;
            }
        }
        Ok(())
    }

    fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64) {
        self.restart();
        self.downstream.seek_performed(requested_ms, provided_ms);
    }

    fn flush(&mut self) -> Result<()> {
        let expected = self.expected_output_frames();
        if !self.planar[0].is_empty() {
            let output = self.converter.process_partial(Some(self.planar.as_slice()))?;
            self.clear_pending();
            self.emit(output, Some(expected))?;
        }

        // the delayed tail is still inside the converter
        let mut blocks = 0;
        while self.output_frames < expected && blocks < MAX_TAIL_BLOCKS {
            let output = self.converter.process_partial(None)?;
            self.emit(output, Some(expected))?;
            blocks += 1;
        }
        self.downstream.flush()
    }

    fn close(&mut self) {
        self.clear_pending();
        self.downstream.close();
    }
}
