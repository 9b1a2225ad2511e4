use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Operating system family, with its shared library naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OsType {
    Linux,
    Windows,
    Darwin,
    Solaris,
}

impl OsType {
    pub fn detect() -> Result<Self> {
        match std::env::consts::OS {
            "linux" | "android" => Ok(OsType::Linux),
            "windows" => Ok(OsType::Windows),
            "macos" | "ios" => Ok(OsType::Darwin),
            "solaris" | "illumos" => Ok(OsType::Solaris),
            other => Err(Error::NativeLibrary(format!(
                "Unknown operating system: {}",
                other
            ))),
        }
    }

    pub fn identifier(self) -> &'static str {
        match self {
            OsType::Linux => "linux",
            OsType::Windows => "win",
            OsType::Darwin => "darwin",
            OsType::Solaris => "solaris",
        }
    }

    pub fn library_prefix(self) -> &'static str {
        match self {
            OsType::Windows => "",
            _ => "lib",
        }
    }

    pub fn library_suffix(self) -> &'static str {
        match self {
            OsType::Linux | OsType::Solaris => ".so",
            OsType::Windows => ".dll",
            OsType::Darwin => ".dylib",
        }
    }
}

/// OS and CPU architecture pair that native binaries are built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SystemType {
    pub os: OsType,
    pub architecture: String,
}

impl SystemType {
    pub fn new(os: OsType, architecture: impl Into<String>) -> Self {
        Self {
            os,
            architecture: architecture.into(),
        }
    }

    pub fn detect() -> Result<Self> {
        Ok(Self::new(OsType::detect()?, architecture_identifier(std::env::consts::ARCH)))
    }

    /// Directory name for this system's binaries, e.g. `linux-x86-64`
    pub fn system_name(&self) -> String {
        format!("{}-{}", self.os.identifier(), self.architecture)
    }

    /// Platform file name of a library, e.g. `libopus.so` or `opus.dll`
    pub fn format_library_name(&self, library_name: &str) -> String {
        format!(
            "{}{}{}",
            self.os.library_prefix(),
            library_name,
            self.os.library_suffix()
        )
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.system_name())
    }
}

fn architecture_identifier(arch: &str) -> String {
    match arch {
        "x86_64" => "x86-64".to_string(),
        "x86" => "x86".to_string(),
        "aarch64" => "aarch64".to_string(),
        "arm" => "arm".to_string(),
        "powerpc64" => "ppc64".to_string(),
        other => other.replace('_', "-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_names_per_os() {
        let linux = SystemType::new(OsType::Linux, "x86-64");
        assert_eq!(linux.format_library_name("opus"), "libopus.so");
        assert_eq!(linux.system_name(), "linux-x86-64");

        let windows = SystemType::new(OsType::Windows, "x86");
        assert_eq!(windows.format_library_name("opus"), "opus.dll");
        assert_eq!(windows.system_name(), "win-x86");

        let mac = SystemType::new(OsType::Darwin, "aarch64");
        assert_eq!(mac.format_library_name("opus"), "libopus.dylib");
        assert_eq!(
            SystemType::new(OsType::Solaris, "x86-64").format_library_name("opus"),
            "libopus.so"
        );
    }

    #[test]
    fn test_architecture_identifiers() {
        assert_eq!(architecture_identifier("x86_64"), "x86-64");
        assert_eq!(architecture_identifier("mips64"), "mips64");
    }
}
