//! Encoded track messages
//!
//! A track is one framed message: version byte (when flagged as versioned),
//! track info, nullable source name, the source's details, and the playback
//! position. Sources in this workspace describe themselves by the container
//! descriptor of the probe that detected them, so a decoded track can be
//! rebuilt without probing again.

use crate::descriptor::ContainerDescriptor;
use crate::error::Result;
use crate::track_info::{TrackInfo, TRACK_INFO_LATEST_VERSION};
use crate::wire::data::{DataRead, DataWrite};
use crate::wire::message::{MessageInput, MessageOutput};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Message flag marking that a version byte precedes the track info
pub const TRACK_INFO_VERSIONED: u8 = 1;

/// Source-specific part of an encoded track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDetails {
    pub source_name: String,
    pub container: ContainerDescriptor,
}

/// A track as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedTrack {
    pub info: TrackInfo,
    pub source: Option<SourceDetails>,
    pub position_ms: i64,
}

/// A decoded track plus the header metadata it arrived with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTrack {
    pub track: EncodedTrack,
    pub version: u8,
    /// Raw message flags, passed through as-is
    pub flags: u8,
}

/// Writes one track message using the latest info layout
pub fn encode_track<W: Write>(output: &mut MessageOutput<W>, track: &EncodedTrack) -> Result<()> {
    encode_track_version(output, track, TRACK_INFO_LATEST_VERSION)
}

pub fn encode_track_version<W: Write>(
    output: &mut MessageOutput<W>,
    track: &EncodedTrack,
    version: u8,
) -> Result<()> {
    let message = output.start_message();
    message.write_u8_value(version)?;
    track.info.encode(version, message)?;

    match &track.source {
        Some(source) => {
            message.write_nullable_utf(Some(&source.source_name))?;
            source.container.write_to(message)?;
        }
        None => message.write_nullable_utf(None)?,
    }

    message.write_i64_be(track.position_ms)?;
    output.commit_message_with_flags(TRACK_INFO_VERSIONED)
}

/// Reads the next track message, or `None` at the end marker
pub fn decode_track<R: Read>(input: &mut MessageInput<R>) -> Result<Option<DecodedTrack>> {
    let mut message = match input.next_message()? {
        Some(message) => message,
        None => return Ok(None),
    };

    let flags = message.flags();
    let version = if flags & TRACK_INFO_VERSIONED != 0 {
        message.read_u8_value()?
    } else {
        1
    };

    let info = TrackInfo::decode(version, &mut message)?;
    let source = match message.read_nullable_utf()? {
        Some(source_name) => Some(SourceDetails {
            source_name,
            container: ContainerDescriptor::read_from(&mut message)?,
        }),
        None => None,
    };
    let position_ms = message.read_i64_be()?;

    message.skip_remaining_bytes();

    Ok(Some(DecodedTrack {
        track: EncodedTrack {
            info,
            source,
            position_ms,
        },
        version,
        flags,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn local_track() -> EncodedTrack {
        EncodedTrack {
            info: TrackInfo::builder("/tmp/song.mka")
                .title(Some("Song".into()))
                .length_ms(Some(181_000))
                .build(),
            source: Some(SourceDetails {
                source_name: "local".into(),
                container: ContainerDescriptor::new("matroska/webm", None).unwrap(),
            }),
            position_ms: 4_500,
        }
    }

    #[test]
    fn test_track_round_trip() {
        let mut output = MessageOutput::new(Vec::new());
        encode_track(&mut output, &local_track()).unwrap();
        output.finish().unwrap();

        let mut input = MessageInput::new(Cursor::new(output.into_inner()));
        let decoded = decode_track(&mut input).unwrap().unwrap();
        assert_eq!(decoded.track, local_track());
        assert_eq!(decoded.version, 2);
        assert_eq!(decoded.flags, TRACK_INFO_VERSIONED);
        assert!(decode_track(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_unversioned_message_reads_as_v1() {
        let track = local_track();
        let mut output = MessageOutput::new(Vec::new());
        let message = output.start_message();
        track.info.encode(1, message).unwrap();
        message.write_nullable_utf(None).unwrap();
        message.write_i64_be(0).unwrap();
        // trailing bytes from a newer writer are skipped
        message.write_i32_be(77).unwrap();
        output.commit_message().unwrap();
        output.finish().unwrap();

        let mut input = MessageInput::new(Cursor::new(output.into_inner()));
        let decoded = decode_track(&mut input).unwrap().unwrap();
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.track.source, None);
        assert_eq!(decoded.track.info.title, "Song");
        assert!(decode_track(&mut input).unwrap().is_none());
    }
}
