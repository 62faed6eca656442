//! Directory creation and file copying with bounded retry.
//!
//! A slow or briefly locked disk shows up as I/O or permission errors. Those
//! are retried a fixed number of times with a fixed blocking delay; every
//! other error fails on the first attempt.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Same attempt count without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Whether an error is worth another attempt.
///
/// Malformed paths and unsupported operations will fail the same way every
/// time; everything else is treated as an I/O or permission problem.
pub fn is_transient(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::Unsupported
    )
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. The last error is returned.
pub fn retry<T, F>(policy: &RetryPolicy, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < max_attempts => {
                debug!(
                    "Attempt {}/{} failed: {}, retrying in {:?}",
                    attempt, max_attempts, e, policy.delay
                );
                thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Create `path` and any missing parents.
///
/// Succeeds if another process creates the directory concurrently.
pub fn ensure_directory(path: &Path, policy: &RetryPolicy) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    retry(policy, || fs::create_dir_all(path))
}

/// Copy `source` over `dest`, replacing any existing file.
///
/// Returns `false` when the copy could not be completed; the reason is logged.
pub fn copy_file(source: &Path, dest: &Path, policy: &RetryPolicy) -> bool {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = ensure_directory(parent, policy) {
            warn!("Failed to create {}: {}", parent.display(), e);
            return false;
        }
    }

    let result = retry(policy, || {
        if dest.symlink_metadata().is_ok() {
            fs::remove_file(dest)?;
        }
        fs::copy(source, dest).map(|_| ())
    });

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Failed to copy {} to {}: {}",
                source.display(),
                dest.display(),
                e
            );
            false
        }
    }
}

/// Whether two paths name the same existing file.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
