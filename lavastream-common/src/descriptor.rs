//! Container descriptor: which probe produced a track and with what parameters

use crate::error::{Error, Result};
use crate::wire::data::{DataRead, DataWrite};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// Separator between probe name and parameter string
pub const PARAMETER_SEPARATOR: char = '|';

/// Identifies the demuxer and configuration for a detected track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    pub probe_name: String,
    pub parameters: Option<String>,
}

impl ContainerDescriptor {
    /// Creates a descriptor.
    ///
    /// The encoded form splits at the first separator, so a probe name
    /// containing `|` cannot be told apart from a name with parameters and
    /// is rejected. Parameters may contain the separator freely.
    pub fn new(probe_name: impl Into<String>, parameters: Option<String>) -> Result<Self> {
        let probe_name = probe_name.into();
        if probe_name.contains(PARAMETER_SEPARATOR) {
            return Err(Error::InvalidInput(format!(
                "probe name '{}' contains the parameter separator",
                probe_name
            )));
        }
        Ok(Self {
            probe_name,
            parameters,
        })
    }

    /// String form: `name` or `name|parameters`
    pub fn to_encoded_string(&self) -> String {
        match &self.parameters {
            Some(parameters) => format!("{}{}{}", self.probe_name, PARAMETER_SEPARATOR, parameters),
            None => self.probe_name.clone(),
        }
    }

    pub fn parse(encoded: &str) -> Self {
        match encoded.split_once(PARAMETER_SEPARATOR) {
            Some((name, parameters)) => Self {
                probe_name: name.to_string(),
                parameters: Some(parameters.to_string()),
            },
            None => Self {
                probe_name: encoded.to_string(),
                parameters: None,
            },
        }
    }

    /// Writes the descriptor as one length-prefixed string
    pub fn write_to<W: Write + ?Sized>(&self, output: &mut W) -> Result<()> {
        if self.probe_name.contains(PARAMETER_SEPARATOR) {
            tracing::warn!(
                probe = %self.probe_name,
                "Refusing to encode container descriptor with separator in probe name"
            );
            return Err(Error::InvalidInput(format!(
                "probe name '{}' contains the parameter separator",
                self.probe_name
            )));
        }
        output.write_utf(&self.to_encoded_string())
    }

    pub fn read_from<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        Ok(Self::parse(&input.read_utf()?))
    }
}

impl fmt::Display for ContainerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_encoded_string())
    }
}
