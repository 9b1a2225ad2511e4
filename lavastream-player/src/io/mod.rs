//! Seekable byte input abstraction
//!
//! Demuxers read through [`SeekableInput`]. Inputs that cannot seek
//! backwards report `can_seek_hard() == false`; they still accept forward
//! seeks, which are performed by skipping.

mod inputs;
mod saved_head;
mod source;

pub use inputs::{FileInput, ForwardOnlyInput, MemoryInput};
pub use saved_head::{SavedHeadInput, HEAD_MARK_LIMIT};
pub use source::{FileSource, MemorySource, TrackSource};

use std::io::{self, Read};

pub trait SeekableInput: Read + Send {
    /// Absolute read position
    fn position(&self) -> u64;

    /// Moves to an absolute position
    fn seek(&mut self, position: u64) -> io::Result<()>;

    /// Total length, when known
    fn content_length(&self) -> Option<u64>;

    /// Whether seeking backwards (or far ahead without reading) is cheap
    fn can_seek_hard(&self) -> bool;

    /// Skips exactly `count` bytes, failing with `UnexpectedEof` if the
    /// input ends first.
    fn skip_fully(&mut self, count: u64) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }
        if self.can_seek_hard() {
            let target = self.position() + count;
            if let Some(length) = self.content_length() {
                if target > length {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "skip past end of input",
                    ));
                }
            }
            return self.seek(target);
        }

        let mut limited = Read::take(&mut *self, count);
        let copied = io::copy(&mut limited, &mut io::sink())?;
        if copied < count {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input ended while skipping",
            ));
        }
        Ok(())
    }

    /// Bytes left before the end, when the length is known
    fn remaining(&self) -> Option<u64> {
        self.content_length()
            .map(|length| length.saturating_sub(self.position()))
    }
}

impl<T: SeekableInput + ?Sized> SeekableInput for &mut T {
    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        (**self).seek(position)
    }

    fn content_length(&self) -> Option<u64> {
        (**self).content_length()
    }

    fn can_seek_hard(&self) -> bool {
        (**self).can_seek_hard()
    }

    fn skip_fully(&mut self, count: u64) -> io::Result<()> {
        (**self).skip_fully(count)
    }
}

impl<T: SeekableInput + ?Sized> SeekableInput for Box<T> {
    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        (**self).seek(position)
    }

    fn content_length(&self) -> Option<u64> {
        (**self).content_length()
    }

    fn can_seek_hard(&self) -> bool {
        (**self).can_seek_hard()
    }

    fn skip_fully(&mut self, count: u64) -> io::Result<()> {
        (**self).skip_fully(count)
    }
}

/// Reads up to `buf.len()` bytes, stopping early only at end of input.
pub fn read_up_to<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
