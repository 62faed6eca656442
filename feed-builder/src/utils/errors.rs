//! Custom error types for the feed builder.

use bitflags::bitflags;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to locate file {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("The feed file location needs to be defined. The outputs cannot be generated without this.")]
    InvalidFeedLocation,

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Feed verification failed: {0}")]
    Verification(String),
}

impl FeedError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FeedError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit bits reported for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FeedError::FileNotFound(_) => ExitCode::FAILURE | ExitCode::FILE_NOT_FOUND,
            FeedError::InvalidFeedLocation => {
                ExitCode::FAILURE | ExitCode::INVALID_FEED_FILE_LOCATION
            }
            _ => ExitCode::FAILURE,
        }
    }
}

/// Errors raised while walking the source tree.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Duplicate entry '{relative_path}' ({} collides with {})", .second.display(), .first.display())]
    DuplicateEntry {
        relative_path: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A staging destination that cannot be built from the feed directory and
/// an entry's relative path.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("The file could not be pathed: folder '{folder}', file '{file}'")]
pub struct PathResolutionError {
    pub folder: String,
    pub file: String,
}

bitflags! {
    /// Process exit status. Bits combine, e.g. `FAILURE | FILE_NOT_FOUND`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExitCode: u8 {
        const FAILURE                    = 0b0000_0001;
        const FILE_NOT_FOUND             = 0b0000_0010;
        const INVALID_FEED_FILE_LOCATION = 0b0000_0100;
    }
}

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode::empty();
}

pub type Result<T> = std::result::Result<T, FeedError>;
