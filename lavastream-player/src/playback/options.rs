//! Per-player settings shared with the execution loop
//!
//! Written by the owning player, read by the loop and filters. Every read
//! is a snapshot; nothing holds a lock across samples.

use lavastream_common::params::{GlobalParams, PARAMS};
use lavastream_common::settings::{OutputFormat, ResamplingQuality};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;

/// Upper bound for the volume percentage
pub const MAX_VOLUME: u16 = 1000;

pub struct PlayerOptions {
    volume: AtomicU32,
    volume_ramp_step: AtomicU32,
    frame_buffer_duration_ms: AtomicU64,
    stall_threshold_ms: AtomicU64,
    output_format: RwLock<OutputFormat>,
    resampling_quality: RwLock<ResamplingQuality>,
}

impl PlayerOptions {
    /// Seeds the options from the global defaults
    pub fn from_params(params: &GlobalParams) -> Self {
        Self {
            volume: AtomicU32::new(params.volume().min(MAX_VOLUME) as u32),
            volume_ramp_step: AtomicU32::new(params.volume_ramp_step().max(1)),
            frame_buffer_duration_ms: AtomicU64::new(params.frame_buffer_duration_ms()),
            stall_threshold_ms: AtomicU64::new(params.stall_threshold_ms()),
            output_format: RwLock::new(params.output_format()),
            resampling_quality: RwLock::new(params.resampling_quality()),
        }
    }

    pub fn volume(&self) -> u16 {
        self.volume.load(Ordering::Relaxed) as u16
    }

    /// Sets the volume percentage, clamped to [0, 1000]
    pub fn set_volume(&self, volume: u16) {
        self.volume
            .store(volume.min(MAX_VOLUME) as u32, Ordering::Relaxed);
    }

    pub fn volume_ramp_step(&self) -> u32 {
        self.volume_ramp_step.load(Ordering::Relaxed)
    }

    pub fn set_volume_ramp_step(&self, step: u32) {
        self.volume_ramp_step.store(step.max(1), Ordering::Relaxed);
    }

    pub fn frame_buffer_duration_ms(&self) -> u64 {
        self.frame_buffer_duration_ms.load(Ordering::Relaxed)
    }

    pub fn set_frame_buffer_duration_ms(&self, duration_ms: u64) {
        self.frame_buffer_duration_ms
            .store(duration_ms, Ordering::Relaxed);
    }

    pub fn stall_threshold_ms(&self) -> u64 {
        self.stall_threshold_ms.load(Ordering::Relaxed)
    }

    pub fn set_stall_threshold_ms(&self, threshold_ms: u64) {
        self.stall_threshold_ms
            .store(threshold_ms, Ordering::Relaxed);
    }

    pub fn output_format(&self) -> OutputFormat {
        match self.output_format.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Takes effect for tracks started afterwards
    pub fn set_output_format(&self, format: OutputFormat) {
        match self.output_format.write() {
            Ok(mut guard) => *guard = format,
            Err(poisoned) => *poisoned.into_inner() = format,
        }
    }

    pub fn resampling_quality(&self) -> ResamplingQuality {
        match self.resampling_quality.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Takes effect when the next filter chain is built
    pub fn set_resampling_quality(&self, quality: ResamplingQuality) {
        match self.resampling_quality.write() {
            Ok(mut guard) => *guard = quality,
            Err(poisoned) => *poisoned.into_inner() = quality,
        }
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self::from_params(&PARAMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_from_params() {
        let params = GlobalParams::default();
        *params.volume.write().unwrap() = 40;
        let options = PlayerOptions::from_params(&params);
        assert_eq!(options.volume(), 40);
        assert_eq!(options.volume_ramp_step(), 64);
        assert_eq!(options.output_format(), OutputFormat::Opus);
    }

    #[test]
    fn test_volume_is_clamped() {
        let options = PlayerOptions::from_params(&GlobalParams::default());
        options.set_volume(5000);
        assert_eq!(options.volume(), MAX_VOLUME);
        options.set_volume_ramp_step(0);
        assert_eq!(options.volume_ramp_step(), 1);
    }
}
