//! Global parameter management
//!
//! Process-wide defaults for every player setting. Players copy these into
//! their own options at creation, so changing a global parameter only
//! affects players created afterwards.
//!
//! # Usage
//!
//! ```rust
//! use lavastream_common::params::PARAMS;
//!
//! let threshold = PARAMS.stall_threshold_ms();
//! PARAMS.set_volume(80).unwrap();
//! # PARAMS.set_volume(100).unwrap();
//! # let _ = threshold;
//! ```

use crate::settings::{OutputFormat, ResamplingQuality};
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::RwLock;

mod init;
mod metadata;
mod setters;

/// Global parameters singleton
pub static PARAMS: Lazy<GlobalParams> = Lazy::new(GlobalParams::default);

/// Global parameter storage
///
/// Read-mostly; every getter returns a copy so no lock is held by callers.
pub struct GlobalParams {
    /// Chunk format produced by the encoder stage
    ///
    /// Default: opus
    pub output_format: RwLock<OutputFormat>,

    /// Sample-rate conversion quality
    ///
    /// Default: low
    pub resampling_quality: RwLock<ResamplingQuality>,

    /// Playback volume in percent
    ///
    /// Valid range: [0, 1000]
    /// Default: 100
    pub volume: RwLock<u16>,

    /// Largest gain change per sample frame while ramping, in 1/65536 units
    ///
    /// Valid range: [1, 65536]
    /// Default: 64 (a full 0 to 100 ramp takes 1024 frames, ~21 ms at 48 kHz)
    pub volume_ramp_step: RwLock<u32>,

    /// Audio held in each track's frame buffer
    ///
    /// Valid range: [200, 60000] ms
    /// Default: 5000 ms
    pub frame_buffer_duration_ms: RwLock<u64>,

    /// Time without a produced frame before a track is reported stuck
    ///
    /// Valid range: [100, 600000] ms
    /// Default: 10000 ms
    pub stall_threshold_ms: RwLock<u64>,

    /// Exact path of the native codec library, bypassing lookup
    pub native_library_path: RwLock<Option<PathBuf>>,

    /// Directory searched for the native codec library
    pub native_library_dir: RwLock<Option<PathBuf>>,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            output_format: RwLock::new(OutputFormat::Opus),
            resampling_quality: RwLock::new(ResamplingQuality::Low),
            volume: RwLock::new(100),
            volume_ramp_step: RwLock::new(64),
            frame_buffer_duration_ms: RwLock::new(5000),
            stall_threshold_ms: RwLock::new(10_000),
            native_library_path: RwLock::new(None),
            native_library_dir: RwLock::new(None),
        }
    }
}

/// Copies a value out of a lock, recovering from poisoning.
///
/// A poisoned lock here only means a writer panicked between validation and
/// assignment of a plain value, which cannot leave it half-written.
pub(crate) fn snapshot<T: Clone>(lock: &RwLock<T>) -> T {
    match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub(crate) fn store<T>(lock: &RwLock<T>, value: T) {
    match lock.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

impl GlobalParams {
    pub fn output_format(&self) -> OutputFormat {
        snapshot(&self.output_format)
    }

    pub fn resampling_quality(&self) -> ResamplingQuality {
        snapshot(&self.resampling_quality)
    }

    pub fn volume(&self) -> u16 {
        snapshot(&self.volume)
    }

    pub fn volume_ramp_step(&self) -> u32 {
        snapshot(&self.volume_ramp_step)
    }

    pub fn frame_buffer_duration_ms(&self) -> u64 {
        snapshot(&self.frame_buffer_duration_ms)
    }

    pub fn stall_threshold_ms(&self) -> u64 {
        snapshot(&self.stall_threshold_ms)
    }

    pub fn native_library_path(&self) -> Option<PathBuf> {
        snapshot(&self.native_library_path)
    }

    pub fn native_library_dir(&self) -> Option<PathBuf> {
        snapshot(&self.native_library_dir)
    }
}

/// Metadata for a single global parameter
///
/// Encapsulates everything needed to load, validate and document a
/// parameter, so the TOML loader and the setters share one validation path.
///
/// Validators have signature `fn(&str) -> Result<(), String>` and report
/// errors as `"{param_name}: {specific_reason}"`.
pub struct ParamMetadata {
    pub key: &'static str,
    pub data_type: &'static str,
    pub default_value: &'static str,
    pub description: &'static str,
    pub validation_range: &'static str,
    pub validator: fn(&str) -> Result<(), String>,
}
