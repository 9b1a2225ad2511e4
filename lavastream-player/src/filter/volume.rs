//! Fixed-point volume with click-free ramping
//!
//! Gain is kept in Q16 (65536 = 100%). When the target volume changes, the
//! applied gain moves towards it by at most the configured ramp step per
//! sample frame, so a jump in volume never becomes a jump in the signal.

use super::PcmFilter;
use crate::error::Result;
use crate::playback::PlayerOptions;
use std::sync::Arc;

const UNITY_GAIN: u32 = 1 << 16;

pub(crate) fn target_gain(volume: u16) -> u32 {
    volume as u32 * UNITY_GAIN / 100
}

fn apply_gain(sample: i16, gain: u32) -> i16 {
    let scaled = (sample as i64 * gain as i64) >> 16;
    scaled.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

pub struct VolumeFilter {
    channels: usize,
    options: Arc<PlayerOptions>,
    gain: u32,
    scratch: Vec<i16>,
    downstream: Box<dyn PcmFilter>,
}

impl VolumeFilter {
    pub fn new(channels: u16, options: Arc<PlayerOptions>, downstream: Box<dyn PcmFilter>) -> Self {
        let gain = target_gain(options.volume());
        Self {
            channels: channels.max(1) as usize,
            options,
            gain,
            scratch: Vec::new(),
            downstream,
        }
    }

    /// Gain currently applied, in Q16
    pub fn current_gain(&self) -> u32 {
        self.gain
    }
}

impl PcmFilter for VolumeFilter {
    fn process(&mut self, samples: &[i16]) -> Result<()> {
        let target = target_gain(self.options.volume());

        if target == self.gain && target == UNITY_GAIN {
            return self.downstream.process(samples);
        }

        self.scratch.clear();
        self.scratch.reserve(samples.len());

        if target == self.gain {
            let gain = self.gain;
            self.scratch
                .extend(samples.iter().map(|sample| apply_gain(*sample, gain)));
        } else {
            let step = self.options.volume_ramp_step().max(1);
            for frame in samples.chunks(self.channels) {
                self.gain = if self.gain < target {
                    self.gain.saturating_add(step).min(target)
                } else {
                    self.gain.saturating_sub(step).max(target)
                };
                let gain = self.gain;
                self.scratch
                    .extend(frame.iter().map(|sample| apply_gain(*sample, gain)));
            }
        }

        self.downstream.process(&self.scratch)
    }

    fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64) {
        // no continuity to preserve across a jump
        self.gain = target_gain(self.options.volume());
        self.downstream.seek_performed(requested_ms, provided_ms);
    }

    fn flush(&mut self) -> Result<()> {
        self.downstream.flush()
    }

    fn close(&mut self) {
        self.downstream.close();
    }
}
