//! Length-prefixed message framing
//!
//! Every message starts with a big-endian 32-bit header: the top two bits are
//! flags, the low 30 bits the payload length. A header with length zero marks
//! the end of the stream. Flag values the reader does not understand are
//! handed to the caller untouched.

use crate::error::{Error, Result};
use crate::wire::data::{DataRead, DataWrite};
use std::io::{Cursor, Read, Write};

/// Largest payload a header can describe
pub const MAX_MESSAGE_SIZE: usize = 0x3FFF_FFFF;

const SIZE_MASK: u32 = 0x3FFF_FFFF;
const FLAGS_SHIFT: u32 = 30;

/// Writes framed messages to an underlying writer
pub struct MessageOutput<W: Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> MessageOutput<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    /// Begins a new message, discarding any uncommitted bytes
    pub fn start_message(&mut self) -> &mut Vec<u8> {
        self.buffer.clear();
        &mut self.buffer
    }

    /// Writes the pending message with no flags set
    pub fn commit_message(&mut self) -> Result<()> {
        self.commit_message_with_flags(0)
    }

    /// Writes the pending message with the given 2-bit flags
    pub fn commit_message_with_flags(&mut self, flags: u8) -> Result<()> {
        if flags > 3 {
            return Err(Error::InvalidInput(format!("message flags out of range: {}", flags)));
        }
        if self.buffer.is_empty() {
            return Err(Error::InvalidInput(
                "empty message would be read as the end marker".to_string(),
            ));
        }
        if self.buffer.len() > MAX_MESSAGE_SIZE {
            return Err(Error::InvalidInput(format!(
                "message too large: {} bytes",
                self.buffer.len()
            )));
        }

        let header = self.buffer.len() as u32 | (u32::from(flags) << FLAGS_SHIFT);
        self.inner.write_i32_be(header as i32)?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    /// Writes the end-of-stream marker
    pub fn finish(&mut self) -> Result<()> {
        self.inner.write_i32_be(0)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// One message read from a [`MessageInput`]
#[derive(Debug)]
pub struct Message {
    flags: u8,
    payload: Cursor<Vec<u8>>,
}

impl Message {
    /// Flags from the header (0-3)
    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn size(&self) -> usize {
        self.payload.get_ref().len()
    }

    /// Bytes of the payload not yet consumed
    pub fn remaining(&self) -> usize {
        self.size().saturating_sub(self.payload.position() as usize)
    }

    /// Skips whatever is left of this message
    pub fn skip_remaining_bytes(&mut self) {
        let end = self.size() as u64;
        self.payload.set_position(end);
    }
}

impl Read for Message {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.payload.read(buf)
    }
}

/// Reads framed messages from an underlying reader
pub struct MessageInput<R: Read> {
    inner: R,
}

impl<R: Read> MessageInput<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next message, or `None` at the end marker.
    ///
    /// Exactly the declared number of bytes is consumed from the underlying
    /// reader whether or not the caller reads the whole payload.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        let header = self.inner.read_i32_be()? as u32;
        let flags = (header >> FLAGS_SHIFT) as u8;
        let size = (header & SIZE_MASK) as usize;

        if size == 0 {
            return Ok(None);
        }

        let mut payload = Vec::new();
        let read = (&mut self.inner).take(size as u64).read_to_end(&mut payload)?;
        if read != size {
            return Err(Error::WireFormat(format!(
                "message truncated: declared {} bytes, got {}",
                size, read
            )));
        }

        Ok(Some(Message {
            flags,
            payload: Cursor::new(payload),
        }))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
