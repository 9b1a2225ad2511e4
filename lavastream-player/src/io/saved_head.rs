use super::SeekableInput;
use std::io::{self, Read};

/// Bytes from the start of a stream kept for rewinding
pub const HEAD_MARK_LIMIT: usize = 1024;

/// Keeps the first [`HEAD_MARK_LIMIT`] bytes of the wrapped input so that
/// format detection can rewind to the start of a forward-only stream.
///
/// Inputs that can seek hard are passed through untouched.
pub struct SavedHeadInput<I> {
    inner: I,
    head: Vec<u8>,
    position: u64,
}

impl<I: SeekableInput> SavedHeadInput<I> {
    pub fn new(inner: I) -> Self {
        let position = inner.position();
        Self {
            inner,
            head: Vec::new(),
            position,
        }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }

    fn recording(&self) -> bool {
        !self.inner.can_seek_hard() && self.inner.position() == self.head.len() as u64
    }
}

impl<I: SeekableInput> Read for SavedHeadInput<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inner.can_seek_hard() {
            let n = self.inner.read(buf)?;
            self.position = self.inner.position();
            return Ok(n);
        }

        if (self.position as usize) < self.head.len()
            && self.inner.position() == self.head.len() as u64
        {
            let start = self.position as usize;
            let n = buf.len().min(self.head.len() - start);
            buf[..n].copy_from_slice(&self.head[start..start + n]);
            self.position += n as u64;
            return Ok(n);
        }

        let record = self.recording();
        let n = self.inner.read(buf)?;
        if record {
            let keep = n.min(HEAD_MARK_LIMIT.saturating_sub(self.head.len()));
            self.head.extend_from_slice(&buf[..keep]);
        }
        self.position = self.inner.position();
        Ok(n)
    }
}

impl<I: SeekableInput> SeekableInput for SavedHeadInput<I> {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        if self.inner.can_seek_hard() {
            self.inner.seek(position)?;
            self.position = position;
            return Ok(());
        }

        let inner_position = self.inner.position();
        if position < inner_position {
            if position < self.head.len() as u64 && inner_position == self.head.len() as u64 {
                self.position = position;
                return Ok(());
            }
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "cannot rewind to {} past the saved head of {} bytes",
                    position,
                    self.head.len()
                ),
            ));
        }

        // forward: first move the virtual position to the real one
        self.position = inner_position;
        let mut remaining = position - inner_position;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let want = remaining.min(scratch.len() as u64) as usize;
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input ended while seeking forward",
                ));
            }
            remaining -= n as u64;
        }
        Ok(())
    }

    fn content_length(&self) -> Option<u64> {
        self.inner.content_length()
    }

    fn can_seek_hard(&self) -> bool {
        self.inner.can_seek_hard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ForwardOnlyInput;
    use std::io::Cursor;

    fn stream(len: usize) -> SavedHeadInput<ForwardOnlyInput<Cursor<Vec<u8>>>> {
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        SavedHeadInput::new(ForwardOnlyInput::new(Cursor::new(bytes)))
    }

    #[test]
    fn test_rewind_within_head() {
        let mut input = stream(4000);
        let mut first = [0u8; 300];
        input.read_exact(&mut first).unwrap();
        input.seek(0).unwrap();

        let mut again = [0u8; 400];
        input.read_exact(&mut again).unwrap();
        assert_eq!(&again[..300], &first[..]);
        assert_eq!(again[350], (350 % 251) as u8);
        assert_eq!(input.position(), 400);
    }

    #[test]
    fn test_rewind_past_head_fails() {
        let mut input = stream(4000);
        input.seek(2000).unwrap();
        assert!(input.seek(10).is_err());
    }

    #[test]
    fn test_forward_seek_reads_through() {
        let mut input = stream(4000);
        input.seek(1500).unwrap();
        let mut b = [0u8; 1];
        input.read_exact(&mut b).unwrap();
        assert_eq!(b[0], (1500 % 251) as u8);
    }
}
