//! Parameter initialization from a TOML document
//!
//! Error handling policy:
//!
//! 1. Document does not parse: return Err (fail startup)
//! 2. Parameter missing: keep default silently
//! 3. Type mismatch or out of range: log WARN, keep default, continue
//! 4. Unknown key: log WARN and ignore
//!
//! Every key is processed independently; one bad value never hides the rest.

use super::GlobalParams;
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

impl GlobalParams {
    /// Reset all parameters to defaults (for testing only)
    #[cfg(test)]
    pub(crate) fn reset_to_defaults(&self) {
        use super::store;
        use crate::settings::{OutputFormat, ResamplingQuality};

        store(&self.output_format, OutputFormat::Opus);
        store(&self.resampling_quality, ResamplingQuality::Low);
        store(&self.volume, 100);
        store(&self.volume_ramp_step, 64);
        store(&self.frame_buffer_duration_ms, 5000);
        store(&self.stall_threshold_ms, 10_000);
        store(&self.native_library_path, None);
        store(&self.native_library_dir, None);
    }

    /// Apply the `[player]` table (or top-level keys) of a TOML document
    ///
    /// Returns the number of parameters that were applied.
    pub fn init_from_toml(&self, document: &str) -> Result<usize> {
        let value: toml::Value = document
            .parse()
            .map_err(|e: toml::de::Error| Error::Config(e.to_string()))?;

        let table = match value.get("player").and_then(|v| v.as_table()) {
            Some(player) => player.clone(),
            None => match value {
                toml::Value::Table(table) => table,
                _ => return Err(Error::Config("expected a table".to_string())),
            },
        };

        let mut applied = 0;
        for (key, raw) in &table {
            let Some(meta) = Self::metadata().iter().find(|m| m.key == key) else {
                warn!("Unknown config key '{}', ignoring", key);
                continue;
            };

            let text = match raw {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                other => {
                    warn!(
                        "{}: unsupported value type '{}', using default ({})",
                        key,
                        other.type_str(),
                        meta.default_value
                    );
                    continue;
                }
            };

            match self.apply(key, &text) {
                Ok(()) => {
                    debug!("{} = {}", key, text);
                    applied += 1;
                }
                Err(e) => warn!("{}, using default ({})", e, meta.default_value),
            }
        }

        info!("Applied {} parameter(s) from config", applied);
        Ok(applied)
    }
}
