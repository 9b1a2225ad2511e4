//! Block payloads and frame lacing

use super::ebml::slice_vint;
use crate::error::{Error, Result};

/// Frames of one block, with the timecode relative to its cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFrames {
    pub relative_timecode: i16,
    pub keyframe: bool,
    pub frames: Vec<Vec<u8>>,
}

fn malformed(what: &str) -> Error {
    Error::container(format!("Malformed Matroska block: {}", what))
}

/// Parses a block body that follows the track number
pub fn parse_block_body(data: &[u8]) -> Result<BlockFrames> {
    if data.len() < 3 {
        return Err(malformed("header truncated"));
    }
    let relative_timecode = i16::from_be_bytes([data[0], data[1]]);
    let flags = data[2];
    let body = &data[3..];

    let frames = match (flags >> 1) & 0x03 {
        0 => vec![body.to_vec()],
        lacing => split_laced(body, lacing)?,
    };

    Ok(BlockFrames {
        relative_timecode,
        keyframe: flags & 0x80 != 0,
        frames,
    })
}

fn split_laced(body: &[u8], lacing: u8) -> Result<Vec<Vec<u8>>> {
    let count = *body.first().ok_or_else(|| malformed("lace count missing"))? as usize + 1;
    let mut at = 1usize;

    let sizes = match lacing {
        1 => read_xiph_sizes(body, &mut at, count - 1).ok_or_else(|| malformed("xiph lace sizes"))?,
        3 => read_ebml_sizes(body, &mut at, count - 1).ok_or_else(|| malformed("EBML lace sizes"))?,
        _ => {
            let total = body.len() - at;
            if total % count != 0 {
                return Err(malformed("fixed lace size does not divide the payload"));
            }
            vec![total / count; count - 1]
        }
    };

    let mut frames = Vec::with_capacity(count);
    for size in sizes {
        let frame = body
            .get(at..at + size)
            .ok_or_else(|| malformed("lace exceeds the block"))?;
        frames.push(frame.to_vec());
        at += size;
    }
    frames.push(body[at..].to_vec());
    Ok(frames)
}

/// Xiph lace sizes: each is a run of 255 bytes plus a final byte below 255
pub(crate) fn read_xiph_sizes(data: &[u8], at: &mut usize, count: usize) -> Option<Vec<usize>> {
    let mut sizes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut size = 0usize;
        loop {
            let b = *data.get(*at)?;
            *at += 1;
            size += b as usize;
            if b != 255 {
                break;
            }
        }
        sizes.push(size);
    }
    Some(sizes)
}

fn read_ebml_sizes(data: &[u8], at: &mut usize, count: usize) -> Option<Vec<usize>> {
    if count == 0 {
        return Some(Vec::new());
    }
    let mut sizes = Vec::with_capacity(count);
    let mut size = slice_vint(data, at)? as i64;
    sizes.push(usize::try_from(size).ok()?);

    for _ in 1..count {
        let start = *at;
        let raw = slice_vint(data, at)? as i64;
        let length = (*at - start) as u32;
        let bias = (1i64 << (7 * length - 1)) - 1;
        size += raw - bias;
        sizes.push(usize::try_from(size).ok()?);
    }
    Some(sizes)
}

/// Splits a Xiph-laced codec private block, as used for Vorbis headers
pub fn split_xiph_private(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let count = *data.first().ok_or_else(|| malformed("codec private is empty"))? as usize + 1;
    let mut at = 1usize;
    let sizes = read_xiph_sizes(data, &mut at, count - 1).ok_or_else(|| malformed("codec private lace sizes"))?;

    let mut parts = Vec::with_capacity(count);
    for size in sizes {
        let part = data
            .get(at..at + size)
            .ok_or_else(|| malformed("codec private lace exceeds the data"))?;
        parts.push(part.to_vec());
        at += size;
    }
    parts.push(data[at..].to_vec());
    Ok(parts)
}
