//! Conflict and error decision collaborators.
//!
//! The engine delegates every "what now?" question to two trait objects: a
//! `ConflictResolver` for existing destination files and an `ErrorReporter`
//! for failed operations. Interactive frontends implement these by showing
//! a dialog and blocking until the user answers; the presets in this module
//! answer without asking, for headless use and tests.

use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::EngineError;
use crate::model::{ConflictChoice, ConflictDecision, ErrorAction};

/// Everything a resolver may want to show about one conflict.
#[derive(Debug, Clone)]
pub struct ConflictContext {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub source_size: Option<u64>,
    pub destination_size: Option<u64>,
    pub source_modified: Option<SystemTime>,
    pub destination_modified: Option<SystemTime>,
}

/// Decides what to do when a destination file already exists.
///
/// `resolve` may block indefinitely while waiting for external input; the
/// job's worker suspends until it returns.
pub trait ConflictResolver: Send {
    fn resolve(&mut self, context: &ConflictContext) -> ConflictDecision;
}

/// Decides what to do about a failed operation.
pub trait ErrorReporter: Send {
    fn report(&mut self, error: &EngineError) -> ErrorAction;
}

/// Answers every conflict with a fixed choice, never prompting.
#[derive(Debug, Clone, Copy)]
pub struct PresetResolver {
    choice: ConflictChoice,
}

impl PresetResolver {
    pub fn new(choice: ConflictChoice) -> Self {
        PresetResolver { choice }
    }
}

impl ConflictResolver for PresetResolver {
    fn resolve(&mut self, _context: &ConflictContext) -> ConflictDecision {
        ConflictDecision::once(self.choice)
    }
}

/// Skips past every error, leaving the affected branch behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipErrors;

impl ErrorReporter for SkipErrors {
    fn report(&mut self, _error: &EngineError) -> ErrorAction {
        ErrorAction::Skip
    }
}

/// Cancels the whole job on the first error.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelOnError;

impl ErrorReporter for CancelOnError {
    fn report(&mut self, _error: &EngineError) -> ErrorAction {
        ErrorAction::Cancel
    }
}
