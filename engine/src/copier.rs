//! Chunked byte transfer with retry and resume.
//!
//! A copy attempt streams fixed-size chunks from a source stream into a
//! destination opened through the file provider, reporting each chunk to
//! the progress sink and checking the interrupted flag between chunks. A
//! failed attempt is classified (cannot open source, cannot open
//! destination, error while transferring) and handed to the error reporter;
//! a retry after a mid-transfer failure switches to append mode so bytes
//! already written are not copied again.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::model::ErrorAction;
use crate::progress::ProgressSink;
use crate::provider::FileProvider;
use crate::resolve::ErrorReporter;

/// Chunk size for the transfer loop. Bounds memory use and sets the
/// progress-reporting granularity.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// One file transfer the engine wants performed.
pub(crate) struct CopyRequest<'a> {
    pub provider: &'a dyn FileProvider,
    /// Opens a fresh source stream, starting at the beginning. Called once
    /// per attempt.
    pub open_source: &'a dyn Fn() -> io::Result<Box<dyn Read + Send>>,
    /// Source path, for progress and error messages.
    pub source: &'a Path,
    pub source_modified: Option<SystemTime>,
    pub destination: &'a Path,
    /// Start in resume mode: keep the destination's current bytes and
    /// continue from its end.
    pub append: bool,
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyStatus {
    Done { bytes: u64 },
    /// Abandoned by a skip decision; the job continues.
    Abandoned,
    /// The job was interrupted, either mid-transfer or by a cancel
    /// decision.
    Cancelled,
}

/// Copy one file, consulting the error reporter until the transfer either
/// succeeds, is abandoned, or cancels the job.
pub(crate) fn copy_with_retries(
    request: &CopyRequest<'_>,
    reporter: &mut dyn ErrorReporter,
    sink: &dyn ProgressSink,
    interrupted: &AtomicBool,
) -> CopyStatus {
    let mut append = request.append;
    loop {
        match copy_once(request, append, sink, interrupted) {
            Ok(Some(bytes)) => {
                if let Some(mtime) = request.source_modified {
                    // Timestamp replication is best-effort.
                    let _ = request.provider.set_modified(request.destination, mtime);
                }
                debug!(
                    source = %request.source.display(),
                    destination = %request.destination.display(),
                    bytes,
                    "file transferred"
                );
                return CopyStatus::Done { bytes };
            }
            Ok(None) => return CopyStatus::Cancelled,
            Err(error) => {
                warn!(error = %error, "transfer attempt failed");
                match reporter.report(&error) {
                    ErrorAction::Retry => {
                        // Bytes written before a mid-transfer failure stay
                        // in place; the retry resumes after them.
                        if matches!(error, EngineError::Transfer { .. }) {
                            append = true;
                        }
                    }
                    ErrorAction::Skip => return CopyStatus::Abandoned,
                    ErrorAction::Cancel => {
                        interrupted.store(true, Ordering::Relaxed);
                        return CopyStatus::Cancelled;
                    }
                }
            }
        }
    }
}

/// One transfer attempt. `Ok(None)` means the job was interrupted between
/// chunks; the chunk in flight at that moment has already been written.
fn copy_once(
    request: &CopyRequest<'_>,
    append: bool,
    sink: &dyn ProgressSink,
    interrupted: &AtomicBool,
) -> Result<Option<u64>, EngineError> {
    let open_source_err = |source: io::Error| EngineError::OpenSource {
        path: request.source.to_path_buf(),
        source,
    };
    let open_dest_err = |source: io::Error| EngineError::OpenDestination {
        path: request.destination.to_path_buf(),
        source,
    };
    let transfer_err = |source: io::Error| EngineError::Transfer {
        path: request.source.to_path_buf(),
        source,
    };

    let mut reader = (request.open_source)().map_err(open_source_err)?;
    let mut writer = request
        .provider
        .open_write(request.destination, append)
        .map_err(open_dest_err)?;

    if append {
        let existing = request
            .provider
            .size(request.destination)
            .map_err(open_dest_err)?;
        if existing > 0 {
            // The source stream cannot generally seek (it may come out of
            // an archive), so discard the bytes the destination already
            // has.
            let mut skipped = reader.take(existing);
            io::copy(&mut skipped, &mut io::sink()).map_err(transfer_err)?;
            reader = skipped.into_inner();
        }
    }

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        if interrupted.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let read = reader.read(&mut buffer).map_err(transfer_err)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).map_err(transfer_err)?;
        total += read as u64;
        sink.on_bytes_transferred(read as u64);
    }
    writer.flush().map_err(transfer_err)?;

    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use crate::provider::LocalFileSystem;
    use crate::resolve::SkipErrors;
    use std::cell::Cell;
    use std::fs;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    struct CountingSink {
        bytes: Arc<AtomicU64>,
        chunks: Arc<AtomicU64>,
    }

    impl ProgressSink for CountingSink {
        fn on_job_started(&self, _total_entries: usize) {}
        fn on_file_started(&self, _name: &str, _mode: crate::model::TransferMode) {}
        fn on_bytes_transferred(&self, count: u64) {
            self.bytes.fetch_add(count, Ordering::Relaxed);
            self.chunks.fetch_add(1, Ordering::Relaxed);
        }
        fn on_file_finished(&self, _name: &str, _outcome: crate::progress::FileOutcome) {}
        fn on_job_finished(&self, _report: &crate::model::JobReport) {}
    }

    /// Reader that yields `good` bytes then fails.
    struct FlakyReader {
        good: Vec<u8>,
        served: usize,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served < self.good.len() {
                let n = (self.good.len() - self.served).min(buf.len());
                buf[..n].copy_from_slice(&self.good[self.served..self.served + n]);
                self.served += n;
                Ok(n)
            } else {
                Err(io::Error::new(io::ErrorKind::Other, "source went away"))
            }
        }
    }

    struct RetryAlways;

    impl ErrorReporter for RetryAlways {
        fn report(&mut self, _error: &EngineError) -> ErrorAction {
            ErrorAction::Retry
        }
    }

    #[test]
    fn test_copy_reports_bytes_and_writes_contents() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("src.txt");
        let destination = temp_dir.path().join("dst.txt");
        fs::write(&source, b"chunked transfer").unwrap();

        let provider = LocalFileSystem;
        let src = source.clone();
        let open_source = move || LocalFileSystem.open_read(&src);

        let bytes = Arc::new(AtomicU64::new(0));
        let chunks = Arc::new(AtomicU64::new(0));
        let sink = CountingSink {
            bytes: bytes.clone(),
            chunks: chunks.clone(),
        };

        let status = copy_with_retries(
            &CopyRequest {
                provider: &provider,
                open_source: &open_source,
                source: &source,
                source_modified: None,
                destination: &destination,
                append: false,
            },
            &mut SkipErrors,
            &sink,
            &AtomicBool::new(false),
        );

        assert_eq!(status, CopyStatus::Done { bytes: 16 });
        assert_eq!(bytes.load(Ordering::Relaxed), 16);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "chunked transfer");
    }

    #[test]
    fn test_append_resumes_at_destination_length() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("src.txt");
        let destination = temp_dir.path().join("dst.txt");
        fs::write(&source, b"hello world").unwrap();
        fs::write(&destination, b"hello ").unwrap();

        let provider = LocalFileSystem;
        let src = source.clone();
        let open_source = move || LocalFileSystem.open_read(&src);

        let status = copy_with_retries(
            &CopyRequest {
                provider: &provider,
                open_source: &open_source,
                source: &source,
                source_modified: None,
                destination: &destination,
                append: true,
            },
            &mut SkipErrors,
            &NullSink,
            &AtomicBool::new(false),
        );

        // Only the five missing bytes travel.
        assert_eq!(status, CopyStatus::Done { bytes: 5 });
        assert_eq!(fs::read_to_string(&destination).unwrap(), "hello world");
    }

    #[test]
    fn test_retry_after_transfer_error_switches_to_append() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("src.txt");
        let destination = temp_dir.path().join("dst.txt");
        fs::write(&source, b"hello world").unwrap();

        let provider = LocalFileSystem;
        let attempts = Cell::new(0u32);
        let src = source.clone();
        let open_source = move || -> io::Result<Box<dyn Read + Send>> {
            attempts.set(attempts.get() + 1);
            if attempts.get() == 1 {
                // First attempt delivers four bytes, then the stream dies.
                Ok(Box::new(FlakyReader {
                    good: b"hell".to_vec(),
                    served: 0,
                }))
            } else {
                Ok(Box::new(fs::File::open(&src)?))
            }
        };

        let status = copy_with_retries(
            &CopyRequest {
                provider: &provider,
                open_source: &open_source,
                source: &source,
                source_modified: None,
                destination: &destination,
                append: false,
            },
            &mut RetryAlways,
            &NullSink,
            &AtomicBool::new(false),
        );

        // Four bytes from the failed attempt plus seven resumed, with no
        // duplicated prefix.
        assert_eq!(status, CopyStatus::Done { bytes: 7 });
        assert_eq!(fs::read_to_string(&destination).unwrap(), "hello world");
    }

    #[test]
    fn test_unopenable_source_is_abandoned_on_skip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("missing.txt");
        let destination = temp_dir.path().join("dst.txt");

        let provider = LocalFileSystem;
        let src = source.clone();
        let open_source = move || LocalFileSystem.open_read(&src);

        let status = copy_with_retries(
            &CopyRequest {
                provider: &provider,
                open_source: &open_source,
                source: &source,
                source_modified: None,
                destination: &destination,
                append: false,
            },
            &mut SkipErrors,
            &NullSink,
            &AtomicBool::new(false),
        );

        assert_eq!(status, CopyStatus::Abandoned);
        assert!(!destination.exists());
    }

    #[test]
    fn test_cancel_decision_sets_interrupted_flag() {
        struct CancelAlways;
        impl ErrorReporter for CancelAlways {
            fn report(&mut self, _error: &EngineError) -> ErrorAction {
                ErrorAction::Cancel
            }
        }

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("missing.txt");
        let destination = temp_dir.path().join("dst.txt");

        let provider = LocalFileSystem;
        let src = source.clone();
        let open_source = move || LocalFileSystem.open_read(&src);
        let interrupted = AtomicBool::new(false);

        let status = copy_with_retries(
            &CopyRequest {
                provider: &provider,
                open_source: &open_source,
                source: &source,
                source_modified: None,
                destination: &destination,
                append: false,
            },
            &mut CancelAlways,
            &NullSink,
            &interrupted,
        );

        assert_eq!(status, CopyStatus::Cancelled);
        assert!(interrupted.load(Ordering::Relaxed));
    }

    #[test]
    fn test_interrupted_flag_stops_before_first_chunk() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = temp_dir.path().join("src.txt");
        let destination = temp_dir.path().join("dst.txt");
        fs::write(&source, b"never copied").unwrap();

        let provider = LocalFileSystem;
        let src = source.clone();
        let open_source = move || LocalFileSystem.open_read(&src);

        let status = copy_with_retries(
            &CopyRequest {
                provider: &provider,
                open_source: &open_source,
                source: &source,
                source_modified: None,
                destination: &destination,
                append: false,
            },
            &mut SkipErrors,
            &NullSink,
            &AtomicBool::new(true),
        );

        assert_eq!(status, CopyStatus::Cancelled);
        assert_eq!(fs::metadata(&destination).unwrap().len(), 0);
    }
}
