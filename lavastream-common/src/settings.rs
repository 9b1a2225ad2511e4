//! Enumerated settings exposed to the external player

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output chunk format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Opus packets, stereo 48 kHz, 20 ms chunks
    Opus,
    /// Signed 16-bit little-endian PCM, stereo 48 kHz
    PcmS16le,
    /// Signed 16-bit big-endian PCM, stereo 48 kHz
    PcmS16be,
    /// Signed 16-bit little-endian PCM, stereo 44.1 kHz
    #[serde(rename = "pcm_s16le_44k")]
    PcmS16le44k,
    /// Signed 16-bit big-endian PCM, stereo 44.1 kHz
    #[serde(rename = "pcm_s16be_44k")]
    PcmS16be44k,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Opus,
        OutputFormat::PcmS16le,
        OutputFormat::PcmS16be,
        OutputFormat::PcmS16le44k,
        OutputFormat::PcmS16be44k,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Opus => "opus",
            OutputFormat::PcmS16le => "pcm_s16le",
            OutputFormat::PcmS16be => "pcm_s16be",
            OutputFormat::PcmS16le44k => "pcm_s16le_44k",
            OutputFormat::PcmS16be44k => "pcm_s16be_44k",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown output format '{}'", s))
    }
}

/// Sample-rate conversion quality
///
/// High and medium use windowed-sinc interpolation with long and short
/// filters respectively; low uses linear interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingQuality {
    High,
    Medium,
    Low,
}

impl ResamplingQuality {
    pub fn name(self) -> &'static str {
        match self {
            ResamplingQuality::High => "high",
            ResamplingQuality::Medium => "medium",
            ResamplingQuality::Low => "low",
        }
    }
}

impl fmt::Display for ResamplingQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResamplingQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(ResamplingQuality::High),
            "medium" => Ok(ResamplingQuality::Medium),
            "low" => Ok(ResamplingQuality::Low),
            other => Err(format!("unknown resampling quality '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_names_parse_back() {
        for format in OutputFormat::ALL {
            assert_eq!(format.name().parse::<OutputFormat>().unwrap(), format);
        }
        assert!("flac".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_quality_parse_is_case_insensitive() {
        assert_eq!("HIGH".parse::<ResamplingQuality>().unwrap(), ResamplingQuality::High);
        assert!("best".parse::<ResamplingQuality>().is_err());
    }

    #[test]
    fn test_serde_names_match_config_names() {
        let json = serde_json::to_string(&OutputFormat::PcmS16le44k).unwrap();
        assert_eq!(json, "\"pcm_s16le_44k\"");
        let quality: ResamplingQuality = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(quality, ResamplingQuality::Medium);
    }
}
