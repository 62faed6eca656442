//! Feed Builder Library
//!
//! Builds update-feed manifests from a folder of build outputs and stages the
//! files next to the feed.

pub mod config;
pub mod executor;
pub mod feed;
pub mod fs;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use executor::{BuildOptions, BuildSummary, FeedBuilder};
pub use utils::errors::{ExitCode, FeedError};
pub type Result<T> = std::result::Result<T, FeedError>;
