//! Format detection over the probe registry

use super::{ContainerProbe, MediaContainerHints, ProbeRegistry};
use crate::error::{Error, Result};
use crate::io::SeekableInput;
use lavastream_common::friendly::Severity;
use lavastream_common::{ContainerDescriptor, TrackInfo};
use serde::Serialize;
use std::io;
use tracing::{debug, warn};

/// Bytes a probe may scan for a frame sync before giving up
pub const STREAM_SCAN_DISTANCE: usize = 1000;

/// Outcome of detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DetectionResult {
    UnknownFormat,
    Unsupported {
        probe: &'static str,
        reason: String,
    },
    Supported {
        descriptor: ContainerDescriptor,
        info: TrackInfo,
    },
}

impl DetectionResult {
    pub fn unsupported(probe: &'static str, reason: impl Into<String>) -> Self {
        DetectionResult::Unsupported {
            probe,
            reason: reason.into(),
        }
    }

    pub fn supported(probe: &'static str, parameters: Option<String>, info: TrackInfo) -> Self {
        DetectionResult::Supported {
            descriptor: ContainerDescriptor {
                probe_name: probe.to_string(),
                parameters,
            },
            info,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, DetectionResult::Supported { .. })
    }
}

/// One detection run for one input
pub struct ContainerDetection<'a> {
    registry: &'a ProbeRegistry,
    identifier: &'a str,
    hints: &'a MediaContainerHints,
}

impl<'a> ContainerDetection<'a> {
    pub fn new(registry: &'a ProbeRegistry, identifier: &'a str, hints: &'a MediaContainerHints) -> Self {
        Self {
            registry,
            identifier,
            hints,
        }
    }

    /// Runs probes agreeing with the hints first, then all the others.
    ///
    /// Every probe starts at the position the input had on entry. Inputs
    /// that cannot seek hard should be wrapped in
    /// [`SavedHeadInput`](crate::io::SavedHeadInput) so that rewinding works.
    pub fn detect(&self, input: &mut dyn SeekableInput) -> Result<DetectionResult> {
        let start = input.position();
        let result = self
            .detect_pass(input, start, true)
            .and_then(|found| match found {
                Some(result) => Ok(Some(result)),
                None => self.detect_pass(input, start, false),
            })
            .and_then(|found| {
                if found.is_none() {
                    input.seek(start)?;
                }
                Ok(found)
            })
            .map_err(|e| {
                Error::Friendly(e.wrap_unfriendly(
                    "Could not read the file for detecting file type.",
                    Severity::Suspicious,
                ))
            })?;

        Ok(result.unwrap_or(DetectionResult::UnknownFormat))
    }

    fn detect_pass(
        &self,
        input: &mut dyn SeekableInput,
        start: u64,
        match_hints: bool,
    ) -> Result<Option<DetectionResult>> {
        for probe in self.registry.probes() {
            if probe.matches_hints(self.hints) != match_hints {
                continue;
            }

            input.seek(start)?;
            if let Some(result) = self.check_container(probe.as_ref(), input) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn check_container(&self, probe: &dyn ContainerProbe, input: &mut dyn SeekableInput) -> Option<DetectionResult> {
        match probe.probe(self.identifier, input) {
            Ok(Some(result)) => {
                debug!(probe = probe.name(), track = %self.identifier, "Container detected");
                Some(result)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    probe = probe.name(),
                    track = %self.identifier,
                    "Attempting to detect file with container {} failed: {}",
                    probe.name(),
                    e
                );
                None
            }
        }
    }
}

/// Checks whether the next bytes equal `pattern`, where `None` matches any
/// byte. The input position is restored before returning.
pub fn check_next_bytes(input: &mut dyn SeekableInput, pattern: &[Option<u8>]) -> io::Result<bool> {
    let position = input.position();
    let mut buf = vec![0u8; pattern.len()];
    let read = crate::io::read_up_to(&mut *input, &mut buf)?;
    input.seek(position)?;

    Ok(read == pattern.len()
        && pattern
            .iter()
            .zip(&buf)
            .all(|(expected, actual)| expected.map_or(true, |e| e == *actual)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryInput;

    #[test]
    fn test_check_next_bytes_restores_position() {
        let mut input = MemoryInput::new(b"ID3\x04rest".to_vec());
        assert!(check_next_bytes(&mut input, &[Some(b'I'), Some(b'D'), None]).unwrap());
        assert_eq!(input.position(), 0);
        assert!(!check_next_bytes(&mut input, &[Some(b'X')]).unwrap());
    }

    #[test]
    fn test_check_next_bytes_short_input() {
        let mut input = MemoryInput::new(vec![0x1A]);
        assert!(!check_next_bytes(&mut input, &[Some(0x1A), Some(0x45)]).unwrap());
    }

    #[test]
    fn test_unknown_format_for_noise() {
        let registry = ProbeRegistry::default();
        let hints = MediaContainerHints::default();
        let mut input = MemoryInput::new(vec![0x5Au8; 4096]);
        let result = ContainerDetection::new(&registry, "noise", &hints)
            .detect(&mut input)
            .unwrap();
        assert_eq!(result, DetectionResult::UnknownFormat);
    }

    #[test]
    fn test_unknown_format_rewinds_to_start() {
        let registry = ProbeRegistry::default();
        let hints = MediaContainerHints::default();
        let mut input = MemoryInput::new(vec![0x5Au8; 4096]);
        input.seek(16).unwrap();

        let result = ContainerDetection::new(&registry, "noise", &hints)
            .detect(&mut input)
            .unwrap();
        assert_eq!(result, DetectionResult::UnknownFormat);
        assert_eq!(input.position(), 16);
    }
}
