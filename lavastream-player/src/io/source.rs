//! Track sources: something that can open a fresh input for a track
//!
//! The execution loop opens its input on its own worker thread, so it is
//! handed a source rather than an already open input.

use super::{FileInput, ForwardOnlyInput, MemoryInput, SeekableInput};
use crate::container::MediaContainerHints;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait TrackSource: Send + Sync {
    /// Identifier recorded in the track info
    fn identifier(&self) -> &str;

    fn hints(&self) -> MediaContainerHints;

    fn open(&self) -> io::Result<Box<dyn SeekableInput>>;
}

/// Local file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    identifier: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let identifier = path.display().to_string();
        Self { path, identifier }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackSource for FileSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn hints(&self) -> MediaContainerHints {
        MediaContainerHints::from_path(&self.path)
    }

    fn open(&self) -> io::Result<Box<dyn SeekableInput>> {
        Ok(Box::new(FileInput::open(&self.path)?))
    }
}

/// In-memory bytes, optionally exposed as a forward-only live stream
#[derive(Debug, Clone)]
pub struct MemorySource {
    identifier: String,
    data: Arc<[u8]>,
    hints: MediaContainerHints,
    forward_only: bool,
}

impl MemorySource {
    pub fn new(identifier: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            identifier: identifier.into(),
            data: data.into(),
            hints: MediaContainerHints::default(),
            forward_only: false,
        }
    }

    pub fn with_hints(mut self, hints: MediaContainerHints) -> Self {
        self.hints = hints;
        self
    }

    /// Opens as a stream without length or backward seeking
    pub fn forward_only(mut self) -> Self {
        self.forward_only = true;
        self
    }
}

impl TrackSource for MemorySource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn hints(&self) -> MediaContainerHints {
        self.hints.clone()
    }

    fn open(&self) -> io::Result<Box<dyn SeekableInput>> {
        let input = MemoryInput::new(self.data.clone());
        if self.forward_only {
            Ok(Box::new(ForwardOnlyInput::new(input)))
        } else {
            Ok(Box::new(input))
        }
    }
}
