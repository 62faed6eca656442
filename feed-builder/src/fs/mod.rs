//! File system access: scanning, metadata and resilient copying.

pub mod metadata;
pub mod ops;
pub mod walker;

pub use metadata::FileCatalogEntry;
pub use ops::RetryPolicy;
pub use walker::{scan, FileCatalog};
