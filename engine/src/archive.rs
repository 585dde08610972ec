//! Archive capability.
//!
//! A browsable archive is exposed to the traversal as a pseudo-directory: a
//! plain tree of named entries that looks like a folder listing, selected at
//! traversal time instead of being baked into the file abstraction. The
//! engine only needs two operations from an archive backend: "is this file
//! browsable" and "give me its entries".

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::warn;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::EngineError;

/// Opens one archive entry's byte stream.
type EntryOpener = Box<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send>;

/// A regular file exposed through a pseudo-directory view.
pub struct PseudoFile {
    pub name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    opener: EntryOpener,
}

impl PseudoFile {
    pub fn new(
        name: String,
        size: u64,
        modified: Option<SystemTime>,
        opener: EntryOpener,
    ) -> Self {
        PseudoFile {
            name,
            size,
            modified,
            opener,
        }
    }

    /// Open the entry's contents for reading. Each call yields a fresh
    /// stream starting at the beginning of the entry.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        (self.opener)()
    }
}

impl std::fmt::Debug for PseudoFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("modified", &self.modified)
            .finish()
    }
}

/// A folder inside a pseudo-directory view.
#[derive(Debug)]
pub struct PseudoDir {
    pub name: String,
    pub entries: Vec<PseudoEntry>,
}

/// One entry of a pseudo-directory listing.
#[derive(Debug)]
pub enum PseudoEntry {
    Dir(PseudoDir),
    File(PseudoFile),
}

impl PseudoEntry {
    pub fn name(&self) -> &str {
        match self {
            PseudoEntry::Dir(d) => &d.name,
            PseudoEntry::File(f) => &f.name,
        }
    }
}

/// The root listing of an archive viewed as a directory.
#[derive(Debug, Default)]
pub struct PseudoDirectory {
    pub entries: Vec<PseudoEntry>,
}

/// Capability interface for treating archive files as directories.
pub trait ArchiveCapability: Send + Sync {
    /// True if the file looks like an archive this backend can browse.
    fn is_browsable(&self, path: &Path) -> bool;

    /// Expose the archive as a directory view.
    fn as_pseudo_directory(&self, path: &Path) -> Result<PseudoDirectory, EngineError>;
}

/// Null implementation for jobs that never expand archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArchives;

impl ArchiveCapability for NoArchives {
    fn is_browsable(&self, _path: &Path) -> bool {
        false
    }

    fn as_pseudo_directory(&self, path: &Path) -> Result<PseudoDirectory, EngineError> {
        Err(EngineError::OpenArchive {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Unsupported, "archive browsing not available"),
        })
    }
}

/// ZIP-backed archive capability.
///
/// Entry streams are materialized per open: each `PseudoFile::open` call
/// reopens the archive and decompresses that entry, so the view itself
/// holds no file handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipAdapter;

impl ZipAdapter {
    fn build_view(path: &Path) -> Result<PseudoDirectory, EngineError> {
        let open_archive_err = |source: io::Error| EngineError::OpenArchive {
            path: path.to_path_buf(),
            source,
        };

        let file = fs::File::open(path).map_err(open_archive_err)?;
        let mut archive = ZipArchive::new(file).map_err(|e| open_archive_err(zip_to_io(e)))?;

        let mut root = PseudoDirectory::default();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| open_archive_err(zip_to_io(e)))?;

            let components = match safe_components(entry.name()) {
                Some(components) => components,
                None => {
                    warn!(entry = entry.name(), "skipping unsafe archive entry name");
                    continue;
                }
            };

            if entry.is_dir() {
                let mut entries = &mut root.entries;
                for component in &components {
                    entries = &mut ensure_dir(entries, component).entries;
                }
            } else {
                let (leaf, parents) = match components.split_last() {
                    Some(split) => split,
                    None => continue,
                };
                let mut entries = &mut root.entries;
                for component in parents {
                    entries = &mut ensure_dir(entries, component).entries;
                }

                let archive_path = path.to_path_buf();
                let opener: EntryOpener = Box::new(move || read_entry(&archive_path, index));
                entries.push(PseudoEntry::File(PseudoFile::new(
                    leaf.clone(),
                    entry.size(),
                    entry.last_modified().and_then(datetime_to_system_time),
                    opener,
                )));
            }
        }

        Ok(root)
    }
}

impl ArchiveCapability for ZipAdapter {
    fn is_browsable(&self, path: &Path) -> bool {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };
        name.ends_with(".zip") || name.ends_with(".jar")
    }

    fn as_pseudo_directory(&self, path: &Path) -> Result<PseudoDirectory, EngineError> {
        Self::build_view(path)
    }
}

/// Decompress one entry into memory and hand back a readable stream.
fn read_entry(archive_path: &Path, index: usize) -> io::Result<Box<dyn Read + Send>> {
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(zip_to_io)?;
    let mut entry = archive.by_index(index).map_err(zip_to_io)?;
    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut contents)?;
    Ok(Box::new(io::Cursor::new(contents)))
}

fn zip_to_io(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(source) => source,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

/// Split an entry name into path components, rejecting names that could
/// escape the destination folder.
fn safe_components(name: &str) -> Option<Vec<String>> {
    if name.starts_with('/') || name.contains('\\') {
        return None;
    }
    let mut components = Vec::new();
    for component in name.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            component => components.push(component.to_string()),
        }
    }
    if components.is_empty() {
        None
    } else {
        Some(components)
    }
}

fn ensure_dir<'a>(entries: &'a mut Vec<PseudoEntry>, name: &str) -> &'a mut PseudoDir {
    let position = entries
        .iter()
        .position(|e| matches!(e, PseudoEntry::Dir(d) if d.name == name));
    let index = match position {
        Some(index) => index,
        None => {
            entries.push(PseudoEntry::Dir(PseudoDir {
                name: name.to_string(),
                entries: Vec::new(),
            }));
            entries.len() - 1
        }
    };
    match &mut entries[index] {
        PseudoEntry::Dir(dir) => dir,
        PseudoEntry::File(_) => unreachable!("position only matches Dir entries"),
    }
}

fn datetime_to_system_time(dt: zip::DateTime) -> Option<SystemTime> {
    let date = chrono::NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?;
    let naive = date.and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )?;
    let timestamp = naive.and_utc().timestamp();
    if timestamp < 0 {
        return None;
    }
    Some(SystemTime::UNIX_EPOCH + Duration::from_secs(timestamp as u64))
}
