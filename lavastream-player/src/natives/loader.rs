use super::system::SystemType;
use crate::error::{Error, Result};
use libloading::Library;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Decides whether a library applies to the detected system
pub type SystemFilter = fn(&SystemType) -> bool;

/// A library kept loaded for the life of the process
#[derive(Debug, Clone)]
pub struct LoadedLibrary {
    pub path: PathBuf,
    /// Required entry points, all resolved at load time
    pub symbols: Vec<&'static str>,
    _library: Arc<Library>,
}

/// Loads one native library at most once per loader
///
/// Lookup order: explicit library path, then explicit directory
/// (`<dir>/<system>/<file>` before `<dir>/<file>`), then the platform's
/// own search by file name. The first outcome, success or failure, is
/// cached and returned to every later caller.
pub struct NativeLibraryLoader {
    library_name: String,
    system_filter: Option<SystemFilter>,
    library_path: Option<PathBuf>,
    library_dir: Option<PathBuf>,
    required_symbols: &'static [&'static str],
    result: OnceCell<std::result::Result<Option<LoadedLibrary>, String>>,
}

impl NativeLibraryLoader {
    pub fn new(library_name: impl Into<String>) -> Self {
        Self {
            library_name: library_name.into(),
            system_filter: None,
            library_path: None,
            library_dir: None,
            required_symbols: &[],
            result: OnceCell::new(),
        }
    }

    pub fn with_system_filter(mut self, filter: SystemFilter) -> Self {
        self.system_filter = Some(filter);
        self
    }

    pub fn with_library_path(mut self, path: Option<PathBuf>) -> Self {
        self.library_path = path;
        self
    }

    pub fn with_library_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.library_dir = dir;
        self
    }

    /// Entry points a loaded file must export to be accepted
    pub fn with_required_symbols(mut self, symbols: &'static [&'static str]) -> Self {
        self.required_symbols = symbols;
        self
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    /// Whether an explicit location was configured
    pub fn is_configured(&self) -> bool {
        self.library_path.is_some() || self.library_dir.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.result.get(), Some(Ok(Some(_))))
    }

    /// Gate for creating codec handles
    ///
    /// With an explicit location configured, the library there must load and
    /// export every required symbol. Without one, the codec's linked library
    /// is used and this always succeeds.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_configured() {
            self.load()?;
        }
        Ok(())
    }

    /// Loads the library, or returns the cached outcome of the first attempt
    ///
    /// `Ok(None)` means the system filter excluded this platform.
    pub fn load(&self) -> Result<Option<LoadedLibrary>> {
        let outcome = self.result.get_or_init(|| {
            info!("Native library {}: loading", self.library_name);
            match self.load_internal() {
                Ok(loaded) => Ok(loaded),
                Err(e) => {
                    error!("Native library {}: loading failed: {}", self.library_name, e);
                    Err(e.to_string())
                }
            }
        });

        outcome.clone().map_err(Error::NativeLibrary)
    }

    /// Candidate files in lookup order, for the detected system
    pub fn candidate_paths(&self, system: &SystemType) -> Vec<PathBuf> {
        if let Some(path) = &self.library_path {
            return vec![path.clone()];
        }

        let file_name = system.format_library_name(&self.library_name);
        match &self.library_dir {
            Some(dir) => vec![
                dir.join(system.system_name()).join(&file_name),
                dir.join(&file_name),
            ],
            None => vec![PathBuf::from(file_name)],
        }
    }

    fn load_internal(&self) -> Result<Option<LoadedLibrary>> {
        if let Some(path) = &self.library_path {
            debug!(
                "Native library {}: explicit path provided {}",
                self.library_name,
                path.display()
            );
            return self.load_from(path).map(Some);
        }

        let system = match SystemType::detect() {
            Ok(system) => system,
            Err(e) if self.system_filter.is_some() => {
                info!(
                    "Native library {}: could not detect system type ({}), assuming the filter does not match",
                    self.library_name, e
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if let Some(filter) = self.system_filter {
            if !filter(&system) {
                debug!(
                    "Native library {}: system filter does not match {}, skipping",
                    self.library_name, system
                );
                return Ok(None);
            }
        }

        let candidates = self.candidate_paths(&system);
        if self.library_dir.is_some() {
            let existing = candidates.iter().find(|p| p.is_file()).ok_or_else(|| {
                Error::NativeLibrary(format!(
                    "{} not found in {:?}",
                    system.format_library_name(&self.library_name),
                    candidates
                ))
            })?;
            return self.load_from(existing).map(Some);
        }

        // bare file name: let the platform loader search its usual paths
        let file_name = system.format_library_name(&self.library_name);
        self.load_from(Path::new(&file_name)).map(Some)
    }

    fn load_from(&self, path: &Path) -> Result<LoadedLibrary> {
        debug!("Attempting to load native library at {}", path.display());
        // SAFETY: loading runs the library's initialisers; only codec libraries
        // named by configuration or the platform search are loaded here.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::NativeLibrary(format!("{}: {}", path.display(), e)))?;

        for symbol in self.required_symbols {
            // SAFETY: the symbol is only looked up, never called through this type
            unsafe { library.get::<unsafe extern "C" fn()>(symbol.as_bytes()) }.map_err(|e| {
                Error::NativeLibrary(format!(
                    "{} does not export {}: {}",
                    path.display(),
                    symbol,
                    e
                ))
            })?;
        }

        info!("Native library loaded from {}", path.display());
        Ok(LoadedLibrary {
            path: path.to_path_buf(),
            symbols: self.required_symbols.to_vec(),
            _library: Arc::new(library),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natives::OsType;

    #[test]
    fn test_candidates_prefer_system_subdirectory() {
        let loader = NativeLibraryLoader::new("opus").with_library_dir(Some("/opt/natives".into()));
        let system = SystemType::new(OsType::Linux, "x86-64");
        assert_eq!(
            loader.candidate_paths(&system),
            vec![
                PathBuf::from("/opt/natives/linux-x86-64/libopus.so"),
                PathBuf::from("/opt/natives/libopus.so"),
            ]
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let loader = NativeLibraryLoader::new("opus")
            .with_library_path(Some("/x/custom.so".into()))
            .with_library_dir(Some("/opt/natives".into()));
        let system = SystemType::new(OsType::Linux, "x86-64");
        assert_eq!(loader.candidate_paths(&system), vec![PathBuf::from("/x/custom.so")]);
    }

    #[test]
    fn test_failure_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLibraryLoader::new("definitely-missing").with_library_dir(Some(dir.path().into()));

        let first = loader.load().unwrap_err().to_string();
        // a file appearing later does not change the cached outcome
        let system = SystemType::detect().unwrap();
        std::fs::write(dir.path().join(system.format_library_name("definitely-missing")), b"x").unwrap();
        let second = loader.load().unwrap_err().to_string();

        assert_eq!(first, second);
        assert!(!loader.is_loaded());
    }

    #[test]
    fn test_unconfigured_loader_is_available() {
        let loader = NativeLibraryLoader::new("definitely-missing");
        assert!(loader.ensure_available().is_ok());
        assert!(!loader.is_loaded());
    }

    #[test]
    fn test_configured_garbage_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libbogus.so");
        std::fs::write(&path, b"not a shared object").unwrap();

        let loader = NativeLibraryLoader::new("bogus").with_library_path(Some(path));
        assert!(matches!(loader.ensure_available(), Err(Error::NativeLibrary(_))));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_required_symbols_are_resolved() {
        let libc = || NativeLibraryLoader::new("c").with_library_path(Some("libc.so.6".into()));

        let loaded = libc()
            .with_required_symbols(&["malloc", "free"])
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(loaded.symbols, vec!["malloc", "free"]);

        let err = libc()
            .with_required_symbols(&["opus_decoder_create"])
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("opus_decoder_create"), "{}", err);
    }

    #[test]
    fn test_filter_excludes_system() {
        let loader = NativeLibraryLoader::new("opus").with_system_filter(|_| false);
        assert!(loader.load().unwrap().is_none());
    }
}
