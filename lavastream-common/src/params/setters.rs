//! Parameter setter methods with metadata-based validation
//!
//! Every setter runs the same validator the TOML loader uses, so a value
//! accepted here is always one the loader would also accept.

use super::{store, GlobalParams};
use crate::settings::{OutputFormat, ResamplingQuality};
use std::path::PathBuf;

impl GlobalParams {
    fn validate(key: &str, value: &str) -> Result<(), String> {
        match Self::metadata().iter().find(|m| m.key == key) {
            Some(meta) => (meta.validator)(value),
            None => Err(format!("{}: unknown parameter", key)),
        }
    }

    pub fn set_output_format(&self, value: OutputFormat) {
        store(&self.output_format, value);
    }

    pub fn set_resampling_quality(&self, value: ResamplingQuality) {
        store(&self.resampling_quality, value);
    }

    /// Validate and update volume
    ///
    /// Must be in range [0, 1000]
    pub fn set_volume(&self, value: u16) -> Result<(), String> {
        Self::validate("volume", &value.to_string())?;
        store(&self.volume, value);
        Ok(())
    }

    /// Must be in range [1, 65536]
    pub fn set_volume_ramp_step(&self, value: u32) -> Result<(), String> {
        Self::validate("volume_ramp_step", &value.to_string())?;
        store(&self.volume_ramp_step, value);
        Ok(())
    }

    /// Must be in range [200, 60000] ms
    pub fn set_frame_buffer_duration_ms(&self, value: u64) -> Result<(), String> {
        Self::validate("frame_buffer_duration_ms", &value.to_string())?;
        store(&self.frame_buffer_duration_ms, value);
        Ok(())
    }

    /// Must be in range [100, 600000] ms
    pub fn set_stall_threshold_ms(&self, value: u64) -> Result<(), String> {
        Self::validate("stall_threshold_ms", &value.to_string())?;
        store(&self.stall_threshold_ms, value);
        Ok(())
    }

    pub fn set_native_library_path(&self, value: Option<PathBuf>) {
        store(&self.native_library_path, value);
    }

    pub fn set_native_library_dir(&self, value: Option<PathBuf>) {
        store(&self.native_library_dir, value);
    }

    /// Validate a string value for `key` and apply it
    ///
    /// Used by the config loader and the CLI, which both see raw strings.
    pub fn apply(&self, key: &str, value: &str) -> Result<(), String> {
        Self::validate(key, value)?;
        let value = value.trim();
        let number = |key: &str| -> Result<u64, String> {
            value
                .parse::<u64>()
                .map_err(|_| format!("{}: invalid number format", key))
        };

        match key {
            "output_format" => self.set_output_format(value.parse()?),
            "resampling_quality" => self.set_resampling_quality(value.parse()?),
            "volume" => self.set_volume(number(key)? as u16)?,
            "volume_ramp_step" => self.set_volume_ramp_step(number(key)? as u32)?,
            "frame_buffer_duration_ms" => self.set_frame_buffer_duration_ms(number(key)?)?,
            "stall_threshold_ms" => self.set_stall_threshold_ms(number(key)?)?,
            "native_library_path" => self.set_native_library_path(Some(PathBuf::from(value))),
            "native_library_dir" => self.set_native_library_dir(Some(PathBuf::from(value))),
            other => return Err(format!("{}: unknown parameter", other)),
        }
        Ok(())
    }
}
