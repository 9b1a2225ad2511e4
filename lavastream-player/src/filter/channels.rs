use super::PcmFilter;
use crate::error::Result;

/// Maps decoded channels onto the output channel count
///
/// Extra output channels repeat the last input channel; a mono output
/// averages all inputs; otherwise surplus input channels are dropped.
pub struct ChannelAdapter {
    input_channels: usize,
    output_channels: usize,
    scratch: Vec<i16>,
    downstream: Box<dyn PcmFilter>,
}

impl ChannelAdapter {
    pub fn new(input_channels: u16, output_channels: u16, downstream: Box<dyn PcmFilter>) -> Self {
        Self {
            input_channels: input_channels.max(1) as usize,
            output_channels: output_channels.max(1) as usize,
            scratch: Vec::new(),
            downstream,
        }
    }
}

impl PcmFilter for ChannelAdapter {
    fn process(&mut self, samples: &[i16]) -> Result<()> {
        let frames = samples.len() / self.input_channels;
        self.scratch.clear();
        self.scratch.reserve(frames * self.output_channels);

        for frame in samples.chunks_exact(self.input_channels) {
            if self.output_channels == 1 {
                let sum: i32 = frame.iter().map(|s| *s as i32).sum();
                self.scratch.push((sum / frame.len() as i32) as i16);
            } else {
                for channel in 0..self.output_channels {
                    self.scratch
                        .push(frame[channel.min(self.input_channels - 1)]);
                }
            }
        }

        self.downstream.process(&self.scratch)
    }

    fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64) {
        self.downstream.seek_performed(requested_ms, provided_ms);
    }

    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }

    fn close(&mut self) {
        self.downstream.close();
    }
}
