//! Progress reporting trait.
//!
//! This module defines the ProgressSink trait, which decouples the transfer
//! engine from any specific UI technology. A sink receives file-level
//! transitions and chunk-level byte counts; it has no back-pressure control
//! over the engine beyond the job's shared interrupted flag.

use crossbeam_channel::Sender;

use crate::model::{JobReport, TransferMode};

/// How a single entry ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Copied, or resolved as an up-to-date no-op.
    Done,
    /// Left behind by a skip decision.
    Skipped,
    /// Abandoned after an unrecovered error.
    Failed,
}

/// Trait for receiving progress updates from a transfer job.
///
/// All methods are called synchronously on the job's worker, in traversal
/// order. `on_bytes_transferred` reports per-chunk deltas, so the running
/// total a sink accumulates is monotonically increasing.
pub trait ProgressSink: Send {
    /// Called once when job execution starts.
    fn on_job_started(&self, total_entries: usize);

    /// Called when an entry (file, folder, or archive) becomes current.
    fn on_file_started(&self, name: &str, mode: TransferMode);

    /// Called after each chunk of a file copy with the chunk's byte count.
    fn on_bytes_transferred(&self, count: u64);

    /// Called when a regular file is done (copied, skipped, or failed).
    fn on_file_finished(&self, name: &str, outcome: FileOutcome);

    /// Called once when job execution is complete.
    fn on_job_finished(&self, report: &JobReport);
}

/// A sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_job_started(&self, _total_entries: usize) {}
    fn on_file_started(&self, _name: &str, _mode: TransferMode) {}
    fn on_bytes_transferred(&self, _count: u64) {}
    fn on_file_finished(&self, _name: &str, _outcome: FileOutcome) {}
    fn on_job_finished(&self, _report: &JobReport) {}
}

/// Progress event payload for channel-based observers.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    JobStarted {
        total_entries: usize,
    },
    FileStarted {
        name: String,
        mode: TransferMode,
    },
    BytesTransferred {
        count: u64,
    },
    FileFinished {
        name: String,
        outcome: FileOutcome,
    },
    JobFinished {
        report: JobReport,
    },
}

/// A ProgressSink implementation that forwards updates over a channel.
///
/// Send failures are ignored: a disconnected observer must not disturb the
/// running job.
pub struct ChannelSink {
    sender: Sender<ProgressUpdate>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ProgressUpdate>) -> Self {
        ChannelSink { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn on_job_started(&self, total_entries: usize) {
        let _ = self.sender.send(ProgressUpdate::JobStarted { total_entries });
    }

    fn on_file_started(&self, name: &str, mode: TransferMode) {
        let _ = self.sender.send(ProgressUpdate::FileStarted {
            name: name.to_string(),
            mode,
        });
    }

    fn on_bytes_transferred(&self, count: u64) {
        let _ = self.sender.send(ProgressUpdate::BytesTransferred { count });
    }

    fn on_file_finished(&self, name: &str, outcome: FileOutcome) {
        let _ = self.sender.send(ProgressUpdate::FileFinished {
            name: name.to_string(),
            outcome,
        });
    }

    fn on_job_finished(&self, report: &JobReport) {
        let _ = self.sender.send(ProgressUpdate::JobFinished {
            report: report.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobOutcome;

    #[test]
    fn test_channel_sink_forwards_updates() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(tx);

        sink.on_job_started(2);
        sink.on_file_started("a.txt", TransferMode::Copy);
        sink.on_bytes_transferred(512);
        sink.on_file_finished("a.txt", FileOutcome::Done);
        sink.on_job_finished(&JobReport {
            job_id: uuid::Uuid::new_v4(),
            outcome: JobOutcome::Success,
            files_copied: 1,
            directories_created: 0,
            entries_skipped: 0,
            bytes_copied: 512,
        });

        let updates: Vec<_> = rx.try_iter().collect();
        assert_eq!(updates.len(), 5);
        assert!(matches!(
            updates[0],
            ProgressUpdate::JobStarted { total_entries: 2 }
        ));
        assert!(matches!(
            &updates[1],
            ProgressUpdate::FileStarted { name, mode: TransferMode::Copy } if name == "a.txt"
        ));
        assert!(matches!(
            updates[2],
            ProgressUpdate::BytesTransferred { count: 512 }
        ));
    }

    #[test]
    fn test_channel_sink_survives_disconnected_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let sink = ChannelSink::new(tx);
        sink.on_bytes_transferred(1);
    }
}
