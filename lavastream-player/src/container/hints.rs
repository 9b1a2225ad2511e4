use serde::Serialize;
use std::path::Path;

/// Format hints known before any bytes are read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaContainerHints {
    pub mime_type: Option<String>,
    pub file_extension: Option<String>,
}

impl MediaContainerHints {
    pub fn new(mime_type: Option<String>, file_extension: Option<String>) -> Self {
        Self {
            mime_type,
            file_extension,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(
            None,
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
        )
    }

    pub fn is_present(&self) -> bool {
        self.mime_type.is_some() || self.file_extension.is_some()
    }

    /// True when at least one hint is present and none contradicts
    /// `mime_type` / `extension`.
    pub fn agree_with(&self, mime_type: &str, extension: &str) -> bool {
        let invalid_mime = self
            .mime_type
            .as_deref()
            .is_some_and(|m| !m.eq_ignore_ascii_case(mime_type));
        let invalid_extension = self
            .file_extension
            .as_deref()
            .is_some_and(|e| !e.eq_ignore_ascii_case(extension));
        self.is_present() && !invalid_mime && !invalid_extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_requires_a_hint() {
        assert!(!MediaContainerHints::default().agree_with("audio/mpeg", "mp3"));
        assert!(MediaContainerHints::new(None, Some("MP3".into())).agree_with("audio/mpeg", "mp3"));
        assert!(!MediaContainerHints::new(Some("audio/aac".into()), Some("mp3".into()))
            .agree_with("audio/mpeg", "mp3"));
    }

    #[test]
    fn test_from_path_lowercases_extension() {
        let hints = MediaContainerHints::from_path(Path::new("/music/Song.MP3"));
        assert_eq!(hints.file_extension.as_deref(), Some("mp3"));
    }
}
