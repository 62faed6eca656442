//! Utility modules for the feed builder.

pub mod errors;
pub mod logger;
pub mod shell;

pub use errors::{ExitCode, FeedError, PathResolutionError, Result, ScanError};
