//! Error types for the transfer engine.
//!
//! `EngineError` covers the failures the engine resolves through its error
//! reporter. Structural errors affect a branch of the traversal (a folder
//! that cannot be listed or created, an archive that cannot be opened);
//! transfer errors affect a single file copy. Every variant keeps the
//! affected path and the underlying I/O error.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors surfaced to the error reporter during a transfer job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A source folder's children could not be listed.
    #[error("cannot read folder {}", path.display())]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A destination folder could not be created.
    #[error("cannot create folder {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An archive could not be opened or its entries listed.
    #[error("cannot open archive {}", path.display())]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A source file could not be opened for reading.
    #[error("cannot read source file {}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A destination file could not be opened for writing.
    #[error("cannot write destination file {}", path.display())]
    OpenDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing failed partway through a transfer.
    #[error("error while transferring {}", path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// The path the error is about.
    pub fn path(&self) -> &Path {
        match self {
            EngineError::ListDir { path, .. }
            | EngineError::CreateDir { path, .. }
            | EngineError::OpenArchive { path, .. }
            | EngineError::OpenSource { path, .. }
            | EngineError::OpenDestination { path, .. }
            | EngineError::Transfer { path, .. } => path,
        }
    }

    /// True for errors affecting a branch of the traversal rather than a
    /// single file copy.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineError::ListDir { .. }
                | EngineError::CreateDir { .. }
                | EngineError::OpenArchive { .. }
        )
    }

    /// True for errors raised by the byte-copy path.
    pub fn is_transfer(&self) -> bool {
        !self.is_structural()
    }
}
