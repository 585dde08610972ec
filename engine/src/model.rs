//! Core data model for transfer jobs.
//!
//! This module defines the main data structures for representing transfer
//! operations:
//! - FileSet: the ordered set of source entries a job operates on
//! - TransferOptions: per-job settings (rename, archive expansion)
//! - ConflictChoice / ConflictDecision: what to do about an existing
//!   destination file
//! - ErrorAction: what to do about a failed operation
//! - JobState, JobOutcome, JobReport: job lifecycle and terminal summary

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An ordered set of source entries sharing a common base folder.
///
/// The base folder is the logical parent of the entries at the time the job
/// was created; entries directly contained in it are the job's top-level
/// entries. A FileSet is read-only once a job starts.
#[derive(Debug, Clone)]
pub struct FileSet {
    base_folder: PathBuf,
    entries: Vec<PathBuf>,
}

impl FileSet {
    /// Create a file set from a base folder and the entries to transfer.
    pub fn new<P: Into<PathBuf>>(base_folder: P, entries: Vec<PathBuf>) -> Self {
        FileSet {
            base_folder: base_folder.into(),
            entries,
        }
    }

    /// Create a file set holding a single entry, based at its parent folder.
    pub fn single<P: Into<PathBuf>>(entry: P) -> Self {
        let entry = entry.into();
        let base = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(""));
        FileSet {
            base_folder: base,
            entries: vec![entry],
        }
    }

    /// The common logical parent of the top-level entries.
    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    /// The top-level entries, in transfer order.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-job settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferOptions {
    /// New filename in the destination folder. Applies only to top-level
    /// entries; descendants discovered through recursion keep their names.
    pub rename: Option<String>,

    /// Treat top-level archive files as directories and extract their
    /// contents directly into the destination folder.
    pub expand_archives: bool,
}

/// Whether a job is copying plain files or extracting archive contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Extract,
}

impl TransferMode {
    /// Progress verb for status strings.
    pub fn verb(&self) -> &'static str {
        match self {
            TransferMode::Copy => "Copying",
            TransferMode::Extract => "Extracting",
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Copy => write!(f, "Copy"),
            TransferMode::Extract => write!(f, "Extract"),
        }
    }
}

/// What to do about a destination file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictChoice {
    /// Interrupt the whole job.
    Cancel,
    /// Leave the destination alone and move on.
    Skip,
    /// Replace the destination unconditionally.
    Overwrite,
    /// Replace the destination only if the source is strictly newer.
    OverwriteIfNewer,
    /// Resume: write starting at the destination's current length.
    Append,
}

impl std::fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictChoice::Cancel => write!(f, "Cancel"),
            ConflictChoice::Skip => write!(f, "Skip"),
            ConflictChoice::Overwrite => write!(f, "Overwrite"),
            ConflictChoice::OverwriteIfNewer => write!(f, "OverwriteIfNewer"),
            ConflictChoice::Append => write!(f, "Append"),
        }
    }
}

/// A resolver's answer for one conflict.
///
/// When `apply_to_all` is set the job caches the choice and never consults
/// the resolver again for the remainder of the job.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDecision {
    pub choice: ConflictChoice,
    pub apply_to_all: bool,
}

impl ConflictDecision {
    pub fn once(choice: ConflictChoice) -> Self {
        ConflictDecision {
            choice,
            apply_to_all: false,
        }
    }

    pub fn for_all(choice: ConflictChoice) -> Self {
        ConflictDecision {
            choice,
            apply_to_all: true,
        }
    }
}

/// What to do about a failed operation.
///
/// Produced per error occurrence and consumed immediately; there is no
/// apply-to-all for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Repeat the single failed step.
    Retry,
    /// Abandon the affected file or branch, continue the job.
    Skip,
    /// Interrupt the whole job.
    Cancel,
}

/// The state of a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started.
    Pending,
    /// Currently executing on its worker.
    Running,
    /// Stopped by cancellation before processing everything.
    Interrupted,
    /// All entries processed (some may have been skipped).
    Completed,
}

/// How a finished job ended, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every entry was handled with no skips or failures.
    Success,
    /// The job ran to the end but some entries were skipped or failed.
    Partial,
    /// The job was cancelled before running to the end.
    Cancelled,
}

/// Terminal summary of a job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: uuid::Uuid,
    pub outcome: JobOutcome,
    pub files_copied: u64,
    pub directories_created: u64,
    /// Entries abandoned by a skip decision or an unrecovered error.
    pub entries_skipped: u64,
    pub bytes_copied: u64,
}
