use super::SeekableInput;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Buffered local file
pub struct FileInput {
    reader: BufReader<File>,
    position: u64,
    length: u64,
}

impl FileInput {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::with_capacity(64 * 1024, file),
            position: 0,
            length,
        })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl SeekableInput for FileInput {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        let delta = position as i64 - self.position as i64;
        // seek_relative keeps the buffer when the target is inside it
        self.reader.seek_relative(delta)?;
        self.position = position;
        Ok(())
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn can_seek_hard(&self) -> bool {
        true
    }
}

/// In-memory input over shared bytes
#[derive(Clone)]
pub struct MemoryInput {
    data: Arc<[u8]>,
    position: u64,
}

impl MemoryInput {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl SeekableInput for MemoryInput {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        self.position = position;
        Ok(())
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn can_seek_hard(&self) -> bool {
        true
    }
}

/// Live stream input: no length, forward movement only
pub struct ForwardOnlyInput<R> {
    inner: R,
    position: u64,
}

impl<R: Read + Send> ForwardOnlyInput<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }
}

impl<R: Read> Read for ForwardOnlyInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Send> SeekableInput for ForwardOnlyInput<R> {
    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        if position < self.position {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "cannot seek backwards on a stream ({} -> {})",
                    self.position, position
                ),
            ));
        }
        self.skip_fully(position - self.position)
    }

    fn content_length(&self) -> Option<u64> {
        None
    }

    fn can_seek_hard(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_memory_input_seek_and_read() {
        let mut input = MemoryInput::new(vec![1u8, 2, 3, 4, 5]);
        input.seek(3).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(input.position(), 5);
        assert_eq!(input.remaining(), Some(0));
    }

    #[test]
    fn test_forward_only_rejects_backwards_seek() {
        let mut input = ForwardOnlyInput::new(Cursor::new(vec![0u8; 10]));
        input.seek(4).unwrap();
        assert_eq!(input.position(), 4);
        assert!(input.seek(2).is_err());
        assert!(input.skip_fully(7).is_err());
    }

    #[test]
    fn test_file_input_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[9u8; 100]).unwrap();
        let mut input = FileInput::open(file.path()).unwrap();
        assert_eq!(input.content_length(), Some(100));
        input.skip_fully(60).unwrap();
        assert_eq!(input.remaining(), Some(40));
        assert!(input.skip_fully(41).is_err());
    }
}
