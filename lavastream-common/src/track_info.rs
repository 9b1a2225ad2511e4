//! Immutable track metadata and its versioned serializers

use crate::error::{Error, Result};
use crate::wire::data::{DataRead, DataWrite};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Length value used on the wire for unknown duration
pub const DURATION_MS_UNKNOWN: i64 = i64::MAX;

/// Title used when the container carries none
pub const UNKNOWN_TITLE: &str = "Unknown title";

/// Author used when the container carries none
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// Latest track info layout
pub const TRACK_INFO_LATEST_VERSION: u8 = 2;

/// Metadata of one track, created at detection time and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    pub author: String,
    /// Duration in milliseconds, `None` for unknown or live
    pub length_ms: Option<i64>,
    pub identifier: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub is_stream: bool,
}

impl TrackInfo {
    pub fn builder(identifier: impl Into<String>) -> TrackInfoBuilder {
        TrackInfoBuilder::new(identifier)
    }

    /// Writes this info using the given layout version
    pub fn encode<W: Write + ?Sized>(&self, version: u8, output: &mut W) -> Result<()> {
        if !(1..=TRACK_INFO_LATEST_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }

        output.write_utf(&self.title)?;
        output.write_utf(&self.author)?;
        output.write_i64_be(self.length_ms.unwrap_or(DURATION_MS_UNKNOWN))?;
        output.write_utf(&self.identifier)?;

        if version >= 2 {
            output.write_nullable_utf(self.uri.as_deref())?;
            output.write_nullable_utf(self.artwork_url.as_deref())?;
        }

        output.write_bool(self.is_stream)?;
        Ok(())
    }

    /// Reads an info written with the given layout version
    pub fn decode<R: Read + ?Sized>(version: u8, input: &mut R) -> Result<Self> {
        if !(1..=TRACK_INFO_LATEST_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }

        let title = input.read_utf()?;
        let author = input.read_utf()?;
        let length = input.read_i64_be()?;
        let identifier = input.read_utf()?;

        let (uri, artwork_url) = if version >= 2 {
            (input.read_nullable_utf()?, input.read_nullable_utf()?)
        } else {
            (None, None)
        };

        let is_stream = input.read_bool()?;

        Ok(Self {
            title,
            author,
            length_ms: (length != DURATION_MS_UNKNOWN).then_some(length),
            identifier,
            uri,
            artwork_url,
            is_stream,
        })
    }
}

/// Builder filling in the unknown-title/artist defaults
#[derive(Debug, Clone)]
pub struct TrackInfoBuilder {
    title: Option<String>,
    author: Option<String>,
    length_ms: Option<i64>,
    identifier: String,
    uri: Option<String>,
    artwork_url: Option<String>,
    is_stream: bool,
}

impl TrackInfoBuilder {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            title: None,
            author: None,
            length_ms: None,
            identifier: identifier.into(),
            uri: None,
            artwork_url: None,
            is_stream: false,
        }
    }

    /// Sets the title; blank values are ignored
    pub fn title(mut self, title: Option<String>) -> Self {
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            self.title = Some(title);
        }
        self
    }

    /// Sets the author; blank values are ignored
    pub fn author(mut self, author: Option<String>) -> Self {
        if let Some(author) = author.filter(|a| !a.trim().is_empty()) {
            self.author = Some(author);
        }
        self
    }

    pub fn length_ms(mut self, length_ms: Option<i64>) -> Self {
        self.length_ms = length_ms;
        self
    }

    pub fn uri(mut self, uri: Option<String>) -> Self {
        self.uri = uri;
        self
    }

    pub fn artwork_url(mut self, artwork_url: Option<String>) -> Self {
        self.artwork_url = artwork_url;
        self
    }

    pub fn is_stream(mut self, is_stream: bool) -> Self {
        self.is_stream = is_stream;
        self
    }

    pub fn build(self) -> TrackInfo {
        TrackInfo {
            title: self.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            author: self.author.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            length_ms: self.length_ms,
            identifier: self.identifier,
            uri: self.uri,
            artwork_url: self.artwork_url,
            is_stream: self.is_stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_info() -> TrackInfo {
        TrackInfo::builder("/music/a.mp3")
            .title(Some("Song".into()))
            .author(Some("  ".into()))
            .length_ms(Some(3000))
            .uri(Some("file:///music/a.mp3".into()))
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let info = sample_info();
        assert_eq!(info.title, "Song");
        assert_eq!(info.author, UNKNOWN_ARTIST);
        assert!(!info.is_stream);
    }

    #[test]
    fn test_v1_drops_uri_fields() {
        let info = sample_info();
        let mut bytes = Vec::new();
        info.encode(1, &mut bytes).unwrap();

        let decoded = TrackInfo::decode(1, &mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.title, info.title);
        assert_eq!(decoded.length_ms, Some(3000));
        assert_eq!(decoded.uri, None);
    }

    #[test]
    fn test_unknown_length_uses_sentinel() {
        let info = TrackInfo::builder("live").is_stream(true).build();
        let mut bytes = Vec::new();
        info.encode(2, &mut bytes).unwrap();

        let decoded = TrackInfo::decode(2, &mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.length_ms, None);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = Vec::new();
        assert!(matches!(
            sample_info().encode(3, &mut bytes),
            Err(Error::UnsupportedVersion(3))
        ));
    }
}
