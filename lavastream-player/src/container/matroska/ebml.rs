//! EBML element reading
//!
//! Element headers are read into a reusable [`MutableElement`]; anything
//! that must outlive the next read is kept as a frozen [`MatroskaElement`].

use crate::container::bytes::{is_eof, ReadBytes};
use crate::error::{Error, Result};
use crate::io::SeekableInput;

/// Element IDs, with their length marker bits kept
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const TITLE: u32 = 0x7BA9;
    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;
    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
}

/// Largest binary or string payload read into memory
pub(crate) const MAX_PAYLOAD_SIZE: u64 = 16 * 1024 * 1024;

/// Immutable element header, safe to keep past the current read position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatroskaElement {
    pub id: u32,
    /// Depth in the element tree, 0 for top-level elements
    pub level: u8,
    /// Absolute position of the element header
    pub position: u64,
    pub header_size: u8,
    /// Payload size, `None` for elements of unknown size
    pub data_size: Option<u64>,
}

impl MatroskaElement {
    pub fn data_position(&self) -> u64 {
        self.position + self.header_size as u64
    }

    /// Absolute position just past the element, `None` when unknown
    pub fn end(&self) -> Option<u64> {
        self.data_size.map(|size| self.data_position() + size)
    }

    /// Bytes from `current` to the end of the element
    pub fn remaining(&self, current: u64) -> Option<u64> {
        self.end().map(|end| end.saturating_sub(current))
    }
}

/// Scratch element header reused across reads
#[derive(Debug, Clone)]
pub struct MutableElement {
    level: u8,
    id: u32,
    position: u64,
    header_size: u8,
    data_size: Option<u64>,
}

impl MutableElement {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            id: 0,
            position: 0,
            header_size: 0,
            data_size: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Reads the next element header at the input position.
    ///
    /// Returns `false` at the end of input or once `limit` is reached. An
    /// element whose payload would extend past `limit` or past the end of
    /// the input is a container error.
    pub fn read<I: SeekableInput + ?Sized>(&mut self, input: &mut I, limit: Option<u64>) -> Result<bool> {
        let limit = match (limit, input.content_length()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let position = input.position();
        if limit.is_some_and(|limit| position >= limit) {
            return Ok(false);
        }

        let Some((id, id_length)) = read_vint(input, true)? else {
            return Ok(false);
        };
        if id_length > 4 {
            return Err(Error::container(format!("Invalid Matroska element ID at {}", position)));
        }
        let Some((size, size_length)) = read_vint(input, false)? else {
            return Err(Error::container(format!(
                "Matroska element {:#x} at {} is truncated",
                id, position
            )));
        };

        let unknown_size = size == (1u64 << (7 * size_length as u32)) - 1;
        let data_size = if unknown_size {
            if id != u64::from(ids::SEGMENT) && id != u64::from(ids::CLUSTER) {
                return Err(Error::container(format!(
                    "Matroska element {:#x} at {} has unknown size",
                    id, position
                )));
            }
            None
        } else {
            Some(size)
        };

        let header_size = id_length + size_length;
        if let (Some(size), Some(limit)) = (data_size, limit) {
            let end = (position + header_size as u64).checked_add(size);
            if end.map_or(true, |end| end > limit) {
                return Err(Error::container(format!(
                    "Matroska element {:#x} at {} declares {} bytes, past the end of its container at {}",
                    id, position, size, limit
                )));
            }
        }

        self.id = id as u32;
        self.position = position;
        self.header_size = header_size;
        self.data_size = data_size;
        Ok(true)
    }

    pub fn frozen(&self) -> MatroskaElement {
        MatroskaElement {
            id: self.id,
            level: self.level,
            position: self.position,
            header_size: self.header_size,
            data_size: self.data_size,
        }
    }
}

/// Reads a variable-length integer and its length in bytes. IDs keep the
/// length marker bit, sizes drop it. `None` at end of input.
pub(crate) fn read_vint<I: SeekableInput + ?Sized>(input: &mut I, keep_marker: bool) -> Result<Option<(u64, u8)>> {
    let first = match input.read_byte() {
        Ok(b) => b,
        Err(e) if is_eof(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if first == 0 {
        return Err(Error::container("Invalid EBML variable-length integer"));
    }

    let length = first.leading_zeros() as u8 + 1;
    let mut value = if keep_marker {
        first as u64
    } else {
        first as u64 & (0xFF >> length)
    };
    for _ in 1..length {
        value = (value << 8) | input.read_byte()? as u64;
    }
    Ok(Some((value, length)))
}

/// Variable-length integer from a slice, advancing `at`
pub(crate) fn slice_vint(data: &[u8], at: &mut usize) -> Option<u64> {
    let first = *data.get(*at)?;
    if first == 0 {
        return None;
    }
    let length = first.leading_zeros() as usize + 1;
    let mut value = first as u64 & (0xFF >> length);
    for &b in data.get(*at + 1..*at + length)? {
        value = (value << 8) | b as u64;
    }
    *at += length;
    Some(value)
}

fn payload_size(element: &MatroskaElement) -> Result<u64> {
    element
        .data_size
        .ok_or_else(|| Error::container(format!("Matroska element {:#x} has no size", element.id)))
}

pub(crate) fn read_uint<I: SeekableInput + ?Sized>(input: &mut I, element: &MatroskaElement) -> Result<u64> {
    let size = payload_size(element)?;
    if size > 8 {
        return Err(Error::container(format!(
            "Matroska integer element {:#x} is {} bytes",
            element.id, size
        )));
    }
    let mut value = 0u64;
    for _ in 0..size {
        value = (value << 8) | input.read_byte()? as u64;
    }
    Ok(value)
}

pub(crate) fn read_float<I: SeekableInput + ?Sized>(input: &mut I, element: &MatroskaElement) -> Result<f64> {
    match payload_size(element)? {
        0 => Ok(0.0),
        4 => Ok(f32::from_bits(input.read_be32()?) as f64),
        8 => Ok(f64::from_bits(input.read_be64()?)),
        other => Err(Error::container(format!(
            "Matroska float element {:#x} is {} bytes",
            element.id, other
        ))),
    }
}

pub(crate) fn read_binary<I: SeekableInput + ?Sized>(input: &mut I, element: &MatroskaElement) -> Result<Vec<u8>> {
    let size = payload_size(element)?;
    if size > MAX_PAYLOAD_SIZE {
        return Err(Error::container(format!(
            "Matroska element {:#x} payload of {} bytes is too large",
            element.id, size
        )));
    }
    Ok(input.read_vec(size as usize)?)
}

pub(crate) fn read_string<I: SeekableInput + ?Sized>(input: &mut I, element: &MatroskaElement) -> Result<String> {
    let bytes = read_binary(input, element)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_end_matches('\0').to_string())
}

/// Moves the input to the end of `element` if it is not there yet
pub(crate) fn finish<I: SeekableInput + ?Sized>(input: &mut I, element: &MatroskaElement) -> Result<()> {
    if let Some(end) = element.end() {
        let position = input.position();
        if position < end {
            input.skip_fully(end - position)?;
        } else if position > end {
            return Err(Error::container(format!(
                "Read past the end of Matroska element {:#x}",
                element.id
            )));
        }
    }
    Ok(())
}

/// Visits every child of a sized master element, leaving the input at its end
pub(crate) fn for_each_child<I, F>(input: &mut I, parent: &MatroskaElement, mut visit: F) -> Result<()>
where
    I: SeekableInput + ?Sized,
    F: FnMut(&mut I, &MatroskaElement) -> Result<()>,
{
    let mut scratch = MutableElement::new(parent.level + 1);
    let end = parent.end();
    while scratch.read(input, end)? {
        let child = scratch.frozen();
        visit(input, &child)?;
        finish(input, &child)?;
    }
    Ok(())
}
