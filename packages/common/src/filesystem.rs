use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Backing store for document text
///
/// The engine never touches the disk directly; hosts hand it a
/// `FileSystem` so tests can swap in [`MockFileSystem`].
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Last modification time, when the store tracks one
    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>>;
}

/// Real file system implementation
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>> {
        Ok(std::fs::metadata(path)?.modified().ok())
    }
}

#[derive(Debug, Clone)]
struct MockFile {
    contents: String,
    modified: SystemTime,
}

/// In-memory file system for testing
///
/// Every write advances a logical clock by one second so modification
/// times are strictly increasing.
pub struct MockFileSystem {
    files: Mutex<HashMap<PathBuf, MockFile>>,
    clock: Mutex<SystemTime>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            clock: Mutex::new(SystemTime::UNIX_EPOCH),
        }
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let modified = self.tick();
        self.lock_files().insert(
            path.into(),
            MockFile {
                contents: contents.into(),
                modified,
            },
        );
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock_files().get(path).map(|f| f.contents.clone())
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        *clock += Duration::from_secs(1);
        *clock
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, MockFile>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.lock_files().contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.contents(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.add_file(path.to_path_buf(), contents);
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>> {
        self.lock_files()
            .get(path)
            .map(|f| Some(f.modified))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_roundtrip_and_clock() {
        let fs = MockFileSystem::new();
        let path = Path::new("/work/pom.xml");
        assert!(!fs.exists(path));

        fs.write(path, "<a/>").unwrap();
        let first = fs.modified(path).unwrap();
        fs.write(path, "<b/>").unwrap();
        let second = fs.modified(path).unwrap();

        assert_eq!(fs.read_to_string(path).unwrap(), "<b/>");
        assert!(second > first);
    }

    #[test]
    fn test_mock_missing_file() {
        let fs = MockFileSystem::new();
        let err = fs.read_to_string(Path::new("/nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
