//! File provider capability.
//!
//! The engine never touches the filesystem directly; everything goes
//! through the `FileProvider` trait so that jobs can run against the local
//! filesystem, a test double, or any other backend that can list folders
//! and open byte streams.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Capability interface the engine uses to read sources and write
/// destinations.
///
/// Queries (`exists`, `is_dir`, `is_symlink`) answer from current state and
/// never fail silently; operations return `io::Error` on failure so the
/// engine can route them through its error reporter.
pub trait FileProvider: Send + Sync {
    /// List a folder's children as full paths, in a stable order.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// True if the path itself is a symbolic link (not resolved).
    fn is_symlink(&self, path: &Path) -> bool;

    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    fn size(&self, path: &Path) -> io::Result<u64>;

    /// Create `name` as a directory directly under `parent`.
    fn create_dir(&self, parent: &Path, name: &str) -> io::Result<()>;

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Open a destination file for writing. With `append` the stream starts
    /// at the file's current end; otherwise the file is truncated.
    fn open_write(&self, path: &Path, append: bool) -> io::Result<Box<dyn Write + Send>>;

    /// Replicate a modification time onto a destination file.
    fn set_modified(&self, path: &Path, mtime: SystemTime) -> io::Result<()>;
}

/// `FileProvider` over the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileProvider for LocalFileSystem {
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            entries.push(entry?.path());
        }
        // read_dir order is platform-dependent; sort for deterministic
        // traversal and prompt ordering.
        entries.sort();
        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn create_dir(&self, parent: &Path, name: &str) -> io::Result<()> {
        fs::create_dir(parent.join(name))
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn open_write(&self, path: &Path, append: bool) -> io::Result<Box<dyn Write + Send>> {
        let file = if append {
            fs::OpenOptions::new().create(true).append(true).open(path)?
        } else {
            fs::File::create(path)?
        };
        Ok(Box::new(file))
    }

    fn set_modified(&self, path: &Path, mtime: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(mtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_is_sorted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        for name in ["zebra.txt", "alpha.txt", "mid.txt"] {
            fs::File::create(temp_dir.path().join(name)).expect("Failed to create file");
        }

        let fs_provider = LocalFileSystem;
        let listed = fs_provider.list(temp_dir.path()).expect("Failed to list");
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.txt", "mid.txt", "zebra.txt"]);
    }

    #[test]
    fn test_open_write_append_starts_at_end() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("out.txt");
        fs::write(&path, b"hello ").expect("Failed to seed file");

        let fs_provider = LocalFileSystem;
        let mut writer = fs_provider
            .open_write(&path, true)
            .expect("Failed to open for append");
        writer.write_all(b"world").expect("Failed to append");
        drop(writer);

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn test_open_write_truncates_without_append() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("out.txt");
        fs::write(&path, b"old contents").expect("Failed to seed file");

        let fs_provider = LocalFileSystem;
        let mut writer = fs_provider
            .open_write(&path, false)
            .expect("Failed to open for write");
        writer.write_all(b"new").expect("Failed to write");
        drop(writer);

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_create_dir_under_parent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fs_provider = LocalFileSystem;

        fs_provider
            .create_dir(temp_dir.path(), "sub")
            .expect("Failed to create dir");
        assert!(temp_dir.path().join("sub").is_dir());

        // Creating over an existing file is an error, not a silent success.
        fs::File::create(temp_dir.path().join("occupied")).unwrap();
        assert!(fs_provider.create_dir(temp_dir.path(), "occupied").is_err());
    }

    #[test]
    fn test_set_modified_roundtrip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("stamped.txt");
        fs::write(&path, b"x").unwrap();

        let fs_provider = LocalFileSystem;
        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs_provider
            .set_modified(&path, mtime)
            .expect("Failed to set mtime");
        assert_eq!(fs_provider.modified(&path).unwrap(), mtime);
    }

    #[cfg(unix)]
    #[test]
    fn test_is_symlink_does_not_resolve() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("target.txt");
        fs::write(&target, b"x").unwrap();
        let link = temp_dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).expect("Failed to create symlink");

        let fs_provider = LocalFileSystem;
        assert!(fs_provider.is_symlink(&link));
        assert!(!fs_provider.is_symlink(&target));
    }
}
