//! ID3v2 tag reading: skips the tag and keeps title and artist

use crate::container::bytes::ReadBytes;
use crate::error::Result;
use crate::io::SeekableInput;

const TAG_HEADER_SIZE: u64 = 10;
const MAX_TEXT_FRAME: u32 = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3Tags {
    pub title: Option<String>,
    pub artist: Option<String>,
}

fn syncsafe(b: [u8; 4]) -> u32 {
    (b[0] as u32 & 0x7F) << 21 | (b[1] as u32 & 0x7F) << 14 | (b[2] as u32 & 0x7F) << 7 | (b[3] as u32 & 0x7F)
}

/// Reads an ID3v2 tag starting at the current position, leaving the input
/// right after it. Returns `None` without consuming anything if no tag
/// starts here.
pub fn read_id3v2<I: SeekableInput + ?Sized>(input: &mut I) -> Result<Option<Id3Tags>> {
    let start = input.position();
    let mut header = [0u8; TAG_HEADER_SIZE as usize];
    let read = crate::io::read_up_to(&mut *input, &mut header)?;
    if read < header.len() || &header[..3] != b"ID3" {
        input.seek(start)?;
        return Ok(None);
    }

    let major = header[3];
    let flags = header[5];
    let tag_size = syncsafe([header[6], header[7], header[8], header[9]]) as u64;
    let footer = if flags & 0x10 != 0 { 10 } else { 0 };
    let end = start + TAG_HEADER_SIZE + tag_size + footer;

    let mut tags = Id3Tags::default();
    let frame_header_size: u64 = if major == 2 { 6 } else { 10 };
    let mut position = start + TAG_HEADER_SIZE;

    while position + frame_header_size <= start + TAG_HEADER_SIZE + tag_size {
        let (id, size) = if major == 2 {
            let id = input.read_vec(3)?;
            let size = input.read_be24()?;
            (id, size)
        } else {
            let id = input.read_vec(4)?;
            let raw = input.read_be32()?.to_be_bytes();
            let size = if major >= 4 { syncsafe(raw) } else { u32::from_be_bytes(raw) };
            input.read_be16()?;
            (id, size)
        };
        position += frame_header_size;

        if id[0] == 0 {
            break;
        }

        let wanted = matches!(&id[..], b"TIT2" | b"TT2" | b"TPE1" | b"TP1");
        if wanted && size <= MAX_TEXT_FRAME {
            let body = input.read_vec(size as usize)?;
            let text = decode_text(&body);
            match &id[..] {
                b"TIT2" | b"TT2" => tags.title = text,
                _ => tags.artist = text,
            }
        } else {
            input.skip_fully(size as u64)?;
        }
        position += size as u64;
    }

    let here = input.position();
    if here < end {
        input.skip_fully(end - here)?;
    }
    Ok(Some(tags))
}

/// Decodes an ID3 text frame body (encoding byte followed by text)
fn decode_text(body: &[u8]) -> Option<String> {
    let (&encoding, text) = body.split_first()?;
    let value = match encoding {
        0 => text.iter().map(|&b| b as char).collect::<String>(),
        1 | 2 => {
            let (big_endian, data) = match text {
                [0xFE, 0xFF, rest @ ..] => (true, rest),
                [0xFF, 0xFE, rest @ ..] => (false, rest),
                _ => (encoding == 2, text),
            };
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|c| {
                    if big_endian {
                        u16::from_be_bytes([c[0], c[1]])
                    } else {
                        u16::from_le_bytes([c[0], c[1]])
                    }
                })
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(text).into_owned(),
    };

    let trimmed = value.trim_end_matches('\0').trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryInput;
    use std::io::Read;

    fn read_all<R: Read>(mut input: R) -> Vec<u8> {
        let mut v = Vec::new();
        input.read_to_end(&mut v).unwrap();
        v
    }

    fn tag_v23(frames: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (id, data) in frames {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(data.len() as u32).to_be_bytes());
            body.extend_from_slice(&[0, 0]);
            body.extend_from_slice(data);
        }
        body.extend_from_slice(&[0u8; 16]);
        let size = body.len() as u32;
        let mut tag = b"ID3\x03\x00\x00".to_vec();
        tag.extend_from_slice(&[
            (size >> 21 & 0x7F) as u8,
            (size >> 14 & 0x7F) as u8,
            (size >> 7 & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        tag.extend_from_slice(&body);
        tag
    }

    #[test]
    fn test_reads_title_and_artist() {
        let mut bytes = tag_v23(&[
            (b"TIT2", &b"\x00Song\x00"[..]),
            (b"APIC", &[7u8; 40][..]),
            (b"TPE1", &b"\x03Band"[..]),
        ]);
        let tag_len = bytes.len() as u64;
        bytes.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);

        let mut input = MemoryInput::new(bytes);
        let tags = read_id3v2(&mut input).unwrap().unwrap();
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.artist.as_deref(), Some("Band"));
        assert_eq!(input.position(), tag_len);
        assert_eq!(read_all(&mut input), vec![0xFF, 0xFB, 0x90, 0x00]);
    }

    #[test]
    fn test_no_tag_leaves_position() {
        let mut input = MemoryInput::new(vec![0xFF, 0xFB, 0x90, 0x00]);
        assert!(read_id3v2(&mut input).unwrap().is_none());
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_utf16_text() {
        let body = [1u8, 0xFF, 0xFE, b'H', 0, b'i', 0, 0, 0];
        assert_eq!(decode_text(&body).as_deref(), Some("Hi"));
    }
}
