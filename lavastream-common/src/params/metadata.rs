//! Parameter metadata definitions
//!
//! Single source of truth for parameter validation

use super::{GlobalParams, ParamMetadata};
use crate::settings::{OutputFormat, ResamplingQuality};

fn validate_range<T>(key: &str, s: &str, min: T, max: T) -> Result<(), String>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    let v: T = s
        .trim()
        .parse()
        .map_err(|_| format!("{}: invalid number format", key))?;
    if v < min || v > max {
        return Err(format!("{}: value {} out of range [{}, {}]", key, v, min, max));
    }
    Ok(())
}

impl GlobalParams {
    /// Get metadata for all configurable parameters
    ///
    /// # Example: Validating a Parameter
    ///
    /// ```rust
    /// # use lavastream_common::params::GlobalParams;
    /// let metadata = GlobalParams::metadata();
    /// let volume_meta = metadata.iter()
    ///     .find(|m| m.key == "volume")
    ///     .unwrap();
    ///
    /// assert!((volume_meta.validator)("150").is_ok());
    /// assert!((volume_meta.validator)("1001").is_err());
    /// ```
    pub fn metadata() -> &'static [ParamMetadata] {
        &[
            ParamMetadata {
                key: "output_format",
                data_type: "OutputFormat",
                default_value: "opus",
                description: "Chunk format produced for the playback sink",
                validation_range: "opus|pcm_s16le|pcm_s16be|pcm_s16le_44k|pcm_s16be_44k",
                validator: |s| {
                    s.parse::<OutputFormat>()
                        .map(|_| ())
                        .map_err(|e| format!("output_format: {}", e))
                },
            },
            ParamMetadata {
                key: "resampling_quality",
                data_type: "ResamplingQuality",
                default_value: "low",
                description: "Sample-rate conversion quality",
                validation_range: "high|medium|low",
                validator: |s| {
                    s.parse::<ResamplingQuality>()
                        .map(|_| ())
                        .map_err(|e| format!("resampling_quality: {}", e))
                },
            },
            ParamMetadata {
                key: "volume",
                data_type: "u16",
                default_value: "100",
                description: "Playback volume in percent",
                validation_range: "0-1000",
                validator: |s| validate_range::<u16>("volume", s, 0, 1000),
            },
            ParamMetadata {
                key: "volume_ramp_step",
                data_type: "u32",
                default_value: "64",
                description: "Largest per-frame gain change while ramping (1/65536 units)",
                validation_range: "1-65536",
                validator: |s| validate_range::<u32>("volume_ramp_step", s, 1, 65536),
            },
            ParamMetadata {
                key: "frame_buffer_duration_ms",
                data_type: "u64",
                default_value: "5000",
                description: "Audio held in each track's frame buffer (ms)",
                validation_range: "200-60000",
                validator: |s| validate_range::<u64>("frame_buffer_duration_ms", s, 200, 60_000),
            },
            ParamMetadata {
                key: "stall_threshold_ms",
                data_type: "u64",
                default_value: "10000",
                description: "Time without produced frames before a track is reported stuck (ms)",
                validation_range: "100-600000",
                validator: |s| validate_range::<u64>("stall_threshold_ms", s, 100, 600_000),
            },
            ParamMetadata {
                key: "native_library_path",
                data_type: "path",
                default_value: "",
                description: "Exact path of the native codec library",
                validation_range: "any path",
                validator: |s| {
                    if s.trim().is_empty() {
                        return Err("native_library_path: empty path".to_string());
                    }
                    Ok(())
                },
            },
            ParamMetadata {
                key: "native_library_dir",
                data_type: "path",
                default_value: "",
                description: "Directory searched for the native codec library",
                validation_range: "any path",
                validator: |s| {
                    if s.trim().is_empty() {
                        return Err("native_library_dir: empty path".to_string());
                    }
                    Ok(())
                },
            },
        ]
    }
}
