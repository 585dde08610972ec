//! Job orchestration module.
//!
//! A `TransferJob` walks its file set depth-first on a single worker,
//! copying regular files, recreating directories, expanding top-level
//! archives, and consulting its collaborators whenever a destination
//! conflict or an error needs a decision. The job owns all of its mutable
//! state; the only piece visible to other threads is the shared interrupted
//! flag and the current-file snapshot behind a `JobHandle`.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::archive::{ArchiveCapability, PseudoDir, PseudoEntry, PseudoFile, ZipAdapter};
use crate::copier::{copy_with_retries, CopyRequest, CopyStatus};
use crate::error::EngineError;
use crate::model::{
    ConflictChoice, ErrorAction, FileSet, JobOutcome, JobReport, JobState, TransferMode,
    TransferOptions,
};
use crate::progress::{FileOutcome, NullSink, ProgressSink};
use crate::provider::{FileProvider, LocalFileSystem};
use crate::resolve::{ConflictContext, ConflictResolver, ErrorReporter, PresetResolver, SkipErrors};

/// State shared between a running job and its handles.
#[derive(Debug)]
struct JobShared {
    /// Monotonic: set once, never cleared. Checked at entry boundaries,
    /// loop iterations, and chunk boundaries.
    interrupted: AtomicBool,
    current: Mutex<Option<CurrentFile>>,
}

#[derive(Debug, Clone)]
struct CurrentFile {
    name: String,
    mode: TransferMode,
}

/// Thread-safe view of a job for cancellation and status queries.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    shared: Arc<JobShared>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the job to stop. Idempotent; the job observes the request at its
    /// next checkpoint.
    pub fn request_cancel(&self) {
        self.shared.interrupted.store(true, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.interrupted.load(Ordering::Relaxed)
    }

    /// Human-readable description of what the job is doing right now.
    pub fn status_description(&self) -> String {
        let current = self
            .shared
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match current.as_ref() {
            Some(file) => format!("{} \"{}\"", file.mode.verb(), file.name),
            None => "Idle".to_string(),
        }
    }
}

/// A source entry under consideration during traversal.
enum Node<'a> {
    /// A file or directory reachable through the file provider.
    Fs { path: &'a Path, top_level: bool },
    /// A folder inside an expanded archive.
    PseudoDir {
        dir: &'a PseudoDir,
        virtual_path: PathBuf,
    },
    /// A file inside an expanded archive.
    PseudoFile {
        file: &'a PseudoFile,
        virtual_path: PathBuf,
    },
}

impl<'a> Node<'a> {
    fn from_pseudo(entry: &'a PseudoEntry, virtual_path: PathBuf) -> Self {
        match entry {
            PseudoEntry::Dir(dir) => Node::PseudoDir { dir, virtual_path },
            PseudoEntry::File(file) => Node::PseudoFile { file, virtual_path },
        }
    }

    fn name(&self) -> String {
        match self {
            Node::Fs { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Node::PseudoDir { dir, .. } => dir.name.clone(),
            Node::PseudoFile { file, .. } => file.name.clone(),
        }
    }
}

/// Result of making sure a destination directory exists.
enum DirEnsure {
    Ready(PathBuf),
    /// Branch abandoned or job cancelled; counters already updated.
    Stopped,
}

/// One recursive copy (or extract) of a file set into a destination folder.
///
/// Collaborators default to the local filesystem, the ZIP adapter, a
/// resolver that skips conflicts, a reporter that skips errors, and a
/// progress sink that ignores everything; swap them with the `with_*`
/// builders before running.
pub struct TransferJob {
    id: Uuid,
    file_set: FileSet,
    dest_folder: PathBuf,
    options: TransferOptions,
    mode: TransferMode,

    provider: Arc<dyn FileProvider>,
    archives: Arc<dyn ArchiveCapability>,
    resolver: Box<dyn ConflictResolver>,
    reporter: Box<dyn ErrorReporter>,
    sink: Box<dyn ProgressSink>,

    /// A conflict choice marked "apply to all", kept for the rest of the
    /// job. Never consulted again once set.
    sticky_choice: Option<ConflictChoice>,
    shared: Arc<JobShared>,
    state: JobState,

    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,

    files_copied: u64,
    directories_created: u64,
    entries_skipped: u64,
    bytes_copied: u64,
}

impl TransferJob {
    pub fn new<P: Into<PathBuf>>(
        file_set: FileSet,
        dest_folder: P,
        options: TransferOptions,
    ) -> Self {
        let mode = if options.expand_archives {
            TransferMode::Extract
        } else {
            TransferMode::Copy
        };
        TransferJob {
            id: Uuid::new_v4(),
            file_set,
            dest_folder: dest_folder.into(),
            options,
            mode,
            provider: Arc::new(LocalFileSystem),
            archives: Arc::new(ZipAdapter),
            resolver: Box::new(PresetResolver::new(ConflictChoice::Skip)),
            reporter: Box::new(SkipErrors),
            sink: Box::new(NullSink),
            sticky_choice: None,
            shared: Arc::new(JobShared {
                interrupted: AtomicBool::new(false),
                current: Mutex::new(None),
            }),
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            files_copied: 0,
            directories_created: 0,
            entries_skipped: 0,
            bytes_copied: 0,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn FileProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_archives(mut self, archives: Arc<dyn ArchiveCapability>) -> Self {
        self.archives = archives;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_progress(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// A cancellation/status handle usable from any thread.
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Execute the job on the calling thread.
    ///
    /// Never panics past and never returns an error: every failure is
    /// resolved through the collaborators, and the terminal report tells
    /// the caller how things ended. Running a job a second time returns a
    /// snapshot of the first run's result.
    pub fn run(&mut self) -> JobReport {
        if self.state != JobState::Pending {
            return self.report();
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        debug!(
            job = %self.id,
            base = %self.file_set.base_folder().display(),
            destination = %self.dest_folder.display(),
            mode = %self.mode,
            "job started"
        );
        self.sink.on_job_started(self.file_set.len());

        let entries: Vec<PathBuf> = self.file_set.entries().to_vec();
        let dest_folder = self.dest_folder.clone();
        for entry in &entries {
            if self.interrupted() {
                break;
            }
            self.process_entry(
                Node::Fs {
                    path: entry,
                    top_level: true,
                },
                &dest_folder,
            );
        }

        self.finished_at = Some(Utc::now());
        self.state = if self.interrupted() {
            JobState::Interrupted
        } else {
            JobState::Completed
        };
        self.clear_current();

        let report = self.report();
        debug!(job = %self.id, outcome = ?report.outcome, "job finished");
        self.sink.on_job_finished(&report);
        report
    }

    /// Execute the job on a dedicated worker thread.
    pub fn spawn(mut self) -> (JobHandle, thread::JoinHandle<JobReport>) {
        let handle = self.handle();
        let join = thread::spawn(move || self.run());
        (handle, join)
    }

    fn report(&self) -> JobReport {
        let outcome = match self.state {
            JobState::Interrupted => JobOutcome::Cancelled,
            _ if self.entries_skipped > 0 => JobOutcome::Partial,
            _ => JobOutcome::Success,
        };
        JobReport {
            job_id: self.id,
            outcome,
            files_copied: self.files_copied,
            directories_created: self.directories_created,
            entries_skipped: self.entries_skipped,
            bytes_copied: self.bytes_copied,
        }
    }

    fn interrupted(&self) -> bool {
        self.shared.interrupted.load(Ordering::Relaxed)
    }

    fn interrupt(&self) {
        self.shared.interrupted.store(true, Ordering::Relaxed);
    }

    fn announce(&self, name: &str) {
        let mut current = self
            .shared
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(CurrentFile {
            name: name.to_string(),
            mode: self.mode,
        });
        drop(current);
        self.sink.on_file_started(name, self.mode);
    }

    fn clear_current(&self) {
        let mut current = self
            .shared
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = None;
    }

    /// Process one entry into `dest_dir`, recursing into directories and
    /// pseudo-directories. Returns `true` when the entry was fully handled
    /// and `false` when its branch stopped early.
    fn process_entry(&mut self, node: Node<'_>, dest_dir: &Path) -> bool {
        if self.interrupted() {
            return false;
        }

        let name = node.name();
        self.announce(&name);

        // Top-level entries of an extract job are read through the archive
        // capability; their contents land directly in the destination
        // folder, with no folder named after the archive.
        if let Node::Fs {
            path,
            top_level: true,
        } = &node
        {
            if self.options.expand_archives && !self.provider.is_dir(path) {
                return self.process_archive(path, dest_dir);
            }
        }

        let top_level = matches!(&node, Node::Fs { top_level: true, .. });
        let dest_name = match (&self.options.rename, top_level) {
            (Some(rename), true) => rename.clone(),
            _ => name.clone(),
        };

        match node {
            Node::Fs { path, .. } => {
                // Symlinks are never followed or recreated; cycles and
                // accidental target duplication stop here.
                if self.provider.is_symlink(path) {
                    debug!(path = %path.display(), "skipping symlink");
                    return true;
                }

                if self.provider.is_dir(path) {
                    let target = match self.ensure_destination_dir(dest_dir, &dest_name) {
                        DirEnsure::Ready(target) => target,
                        DirEnsure::Stopped => return false,
                    };
                    self.process_fs_children(path, &target)
                } else {
                    let provider = Arc::clone(&self.provider);
                    let source_path = path.to_path_buf();
                    let open_source =
                        move || -> io::Result<Box<dyn Read + Send>> {
                            provider.open_read(&source_path)
                        };
                    let source_size = self.provider.size(path).ok();
                    let source_modified = self.provider.modified(path).ok();
                    self.process_file(
                        &name,
                        path,
                        &open_source,
                        source_size,
                        source_modified,
                        dest_dir,
                        &dest_name,
                    )
                }
            }
            Node::PseudoDir { dir, virtual_path } => {
                let target = match self.ensure_destination_dir(dest_dir, &dest_name) {
                    DirEnsure::Ready(target) => target,
                    DirEnsure::Stopped => return false,
                };
                for entry in &dir.entries {
                    if self.interrupted() {
                        return false;
                    }
                    let child_path = virtual_path.join(entry.name());
                    self.process_entry(Node::from_pseudo(entry, child_path), &target);
                }
                true
            }
            Node::PseudoFile { file, virtual_path } => {
                let open_source = || file.open();
                self.process_file(
                    &name,
                    &virtual_path,
                    &open_source,
                    Some(file.size),
                    file.modified,
                    dest_dir,
                    &dest_name,
                )
            }
        }
    }

    /// Expand a top-level archive into `dest_dir`, retrying the listing on
    /// demand. A file the archive backend cannot browse surfaces as an
    /// open-archive error through the error reporter.
    fn process_archive(&mut self, path: &Path, dest_dir: &Path) -> bool {
        debug!(archive = %path.display(), "expanding archive");
        loop {
            let listing = if self.archives.is_browsable(path) {
                self.archives.as_pseudo_directory(path)
            } else {
                Err(EngineError::OpenArchive {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidData, "not a browsable archive"),
                })
            };
            match listing {
                Ok(view) => {
                    for entry in &view.entries {
                        if self.interrupted() {
                            return false;
                        }
                        let virtual_path = path.join(entry.name());
                        self.process_entry(Node::from_pseudo(entry, virtual_path), dest_dir);
                    }
                    return true;
                }
                Err(error) => match self.reporter.report(&error) {
                    ErrorAction::Retry => continue,
                    ErrorAction::Skip => {
                        warn!(archive = %path.display(), "archive branch abandoned");
                        self.entries_skipped += 1;
                        return false;
                    }
                    ErrorAction::Cancel => {
                        self.interrupt();
                        return false;
                    }
                },
            }
        }
    }

    /// Make sure `dest_dir/dest_name` exists as a directory, creating it if
    /// needed. A non-directory occupant surfaces as a create failure
    /// through the error reporter.
    fn ensure_destination_dir(&mut self, dest_dir: &Path, dest_name: &str) -> DirEnsure {
        let target = dest_dir.join(dest_name);
        loop {
            if self.provider.exists(&target) && self.provider.is_dir(&target) {
                return DirEnsure::Ready(target);
            }
            match self.provider.create_dir(dest_dir, dest_name) {
                Ok(()) => {
                    self.directories_created += 1;
                    return DirEnsure::Ready(target);
                }
                Err(source) => {
                    let error = EngineError::CreateDir {
                        path: target.clone(),
                        source,
                    };
                    match self.reporter.report(&error) {
                        ErrorAction::Retry => continue,
                        ErrorAction::Skip => {
                            warn!(path = %target.display(), "folder branch abandoned");
                            self.entries_skipped += 1;
                            return DirEnsure::Stopped;
                        }
                        ErrorAction::Cancel => {
                            self.interrupt();
                            return DirEnsure::Stopped;
                        }
                    }
                }
            }
        }
    }

    /// List a source directory and recurse into each child, retrying the
    /// listing on demand.
    fn process_fs_children(&mut self, path: &Path, target: &Path) -> bool {
        loop {
            match self.provider.list(path) {
                Ok(children) => {
                    for child in &children {
                        if self.interrupted() {
                            return false;
                        }
                        self.process_entry(
                            Node::Fs {
                                path: child,
                                top_level: false,
                            },
                            target,
                        );
                    }
                    return true;
                }
                Err(source) => {
                    let error = EngineError::ListDir {
                        path: path.to_path_buf(),
                        source,
                    };
                    match self.reporter.report(&error) {
                        ErrorAction::Retry => continue,
                        ErrorAction::Skip => {
                            warn!(path = %path.display(), "folder branch abandoned");
                            self.entries_skipped += 1;
                            return false;
                        }
                        ErrorAction::Cancel => {
                            self.interrupt();
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Copy one regular file, resolving a destination conflict first when
    /// there is one.
    #[allow(clippy::too_many_arguments)]
    fn process_file(
        &mut self,
        name: &str,
        source_display: &Path,
        open_source: &dyn Fn() -> io::Result<Box<dyn Read + Send>>,
        source_size: Option<u64>,
        source_modified: Option<SystemTime>,
        dest_dir: &Path,
        dest_name: &str,
    ) -> bool {
        let destination = dest_dir.join(dest_name);
        let mut append = false;

        if self.provider.exists(&destination) {
            let choice = match self.sticky_choice {
                Some(choice) => choice,
                None => {
                    let context = ConflictContext {
                        source: source_display.to_path_buf(),
                        destination: destination.clone(),
                        source_size,
                        destination_size: self.provider.size(&destination).ok(),
                        source_modified,
                        destination_modified: self.provider.modified(&destination).ok(),
                    };
                    let decision = self.resolver.resolve(&context);
                    if decision.apply_to_all {
                        debug!(choice = %decision.choice, "conflict choice cached for the rest of the job");
                        self.sticky_choice = Some(decision.choice);
                    }
                    decision.choice
                }
            };

            match choice {
                ConflictChoice::Cancel => {
                    self.interrupt();
                    return false;
                }
                ConflictChoice::Skip => {
                    debug!(destination = %destination.display(), "conflicting file skipped");
                    self.entries_skipped += 1;
                    self.sink.on_file_finished(name, FileOutcome::Skipped);
                    return false;
                }
                ConflictChoice::Overwrite => {}
                ConflictChoice::OverwriteIfNewer => {
                    let newer = match (source_modified, self.provider.modified(&destination).ok())
                    {
                        (Some(source), Some(destination)) => source > destination,
                        (Some(_), None) => true,
                        // Unknown source age never clobbers the
                        // destination.
                        (None, _) => false,
                    };
                    if !newer {
                        debug!(destination = %destination.display(), "destination already up to date");
                        self.sink.on_file_finished(name, FileOutcome::Done);
                        return true;
                    }
                }
                ConflictChoice::Append => append = true,
            }
        }

        let provider = Arc::clone(&self.provider);
        let request = CopyRequest {
            provider: provider.as_ref(),
            open_source,
            source: source_display,
            source_modified,
            destination: &destination,
            append,
        };
        let status = copy_with_retries(
            &request,
            &mut *self.reporter,
            &*self.sink,
            &self.shared.interrupted,
        );
        match status {
            CopyStatus::Done { bytes } => {
                self.files_copied += 1;
                self.bytes_copied += bytes;
                self.sink.on_file_finished(name, FileOutcome::Done);
                true
            }
            CopyStatus::Abandoned => {
                self.entries_skipped += 1;
                self.sink.on_file_finished(name, FileOutcome::Failed);
                false
            }
            CopyStatus::Cancelled => false,
        }
    }
}
