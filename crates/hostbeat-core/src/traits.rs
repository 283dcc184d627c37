//! Filesystem abstraction for the metric samplers.
//!
//! Samplers read kernel counter files through this trait so tests can feed
//! them string fixtures instead of a live `/proc`.

use std::io;
use std::path::Path;

/// Read access to counter files.
pub trait FileSystem: Send {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: std::collections::HashMap<std::path::PathBuf, String>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content, replacing any previous content.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .insert(path.as_ref().to_path_buf(), content.into());
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn mock_fs_read_and_miss() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 1 kB");

        assert_eq!(
            fs.read_to_string(Path::new("/proc/meminfo")).unwrap(),
            "MemTotal: 1 kB"
        );
        assert!(fs.read_to_string(Path::new("/proc/stat")).is_err());
    }
}
