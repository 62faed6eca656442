//! Feed build orchestration.
//!
//! Ties the pieces together for one run:
//! - scan the output folder into a catalog
//! - derive conditions and a feed task per file
//! - stage each file next to the feed (optional)
//! - write the feed, optionally verify it and clean stale staged files
//! - report summary counts

use crate::config::Settings;
use crate::feed::{build_conditions, resolve_destination, FeedDocument, FileUpdateTask};
use crate::fs::ops::{copy_file, ensure_directory, is_same_file, RetryPolicy};
use crate::fs::walker::{self, FileCatalog};
use crate::utils::errors::{FeedError, Result};
use crate::utils::shell::{Reveal, ShellReveal};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Switches that come from the command line rather than the settings file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Open the feed folder once the build succeeds
    pub open_output: bool,

    /// Read the written feed back and compare it with what was built
    pub verify: bool,
}

/// Counts reported at the end of a build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub tasks: usize,
    pub copied: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub missing_conditions: usize,
}

impl BuildSummary {
    /// Log the completion message and every non-zero counter.
    pub fn report(&self) {
        info!("Done building feed.");
        info!("{:>5} tasks written", self.tasks);
        for (count, label) in [
            (self.copied, "items copied"),
            (self.cleaned, "items cleaned"),
            (self.skipped, "items skipped"),
            (self.failed, "items failed"),
            (self.missing_conditions, "items without any conditions"),
        ] {
            if count > 0 {
                info!("{:>5} {}", count, label);
            }
        }
    }
}

/// Runs feed builds for one set of settings
pub struct FeedBuilder<R: Reveal = ShellReveal> {
    settings: Settings,
    options: BuildOptions,
    retry: RetryPolicy,
    reveal: R,
}

impl FeedBuilder<ShellReveal> {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            options: BuildOptions::default(),
            retry: RetryPolicy::default(),
            reveal: ShellReveal,
        }
    }
}

impl<R: Reveal> FeedBuilder<R> {
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reveal<T: Reveal>(self, reveal: T) -> FeedBuilder<T> {
        FeedBuilder {
            settings: self.settings,
            options: self.options,
            retry: self.retry,
            reveal,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Absolute location of the feed file.
    pub fn feed_path(&self) -> Result<PathBuf> {
        if self.settings.feed_xml.trim().is_empty() {
            return Err(FeedError::InvalidFeedLocation);
        }
        absolute(Path::new(self.settings.feed_xml.trim()))
    }

    fn source_root(&self) -> Result<PathBuf> {
        let folder = self.settings.output_folder.trim();
        if folder.is_empty() {
            return Ok(PathBuf::new());
        }
        absolute(Path::new(folder))
    }

    /// Catalogue the output folder. The feed file is never part of it.
    pub fn scan(&self) -> Result<FileCatalog> {
        let root = self.source_root()?;
        let mut rules = self.settings.ignore_rules();
        if let Ok(feed_path) = self.feed_path() {
            rules.excluded_paths.push(feed_path);
        }
        Ok(walker::scan(&root, &rules, &self.settings.comparison_policy())?)
    }

    /// Build the feed, staging files when `CopyFiles` is set.
    ///
    /// Per-file problems (unresolvable destinations, failed copies) are
    /// counted in the summary; only configuration, scan and write failures
    /// abort the build.
    pub fn build(&self) -> Result<BuildSummary> {
        info!("Building feed '{}'", self.settings.base_url);

        let feed_path = self.feed_path()?;
        let feed_dir = feed_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let catalog = self.scan()?;
        let policy = self.settings.comparison_policy();
        let mut document = FeedDocument::new(&self.settings.base_url);
        let mut summary = BuildSummary::default();
        let mut staged: HashSet<PathBuf> = HashSet::new();

        info!("Processing feed items");
        for entry in catalog.iter() {
            let conditions = build_conditions(entry, &policy);
            if conditions.is_missing_conditions() {
                summary.missing_conditions += 1;
            }
            document.push_task(FileUpdateTask::new(entry, conditions));
            summary.tasks += 1;
            info!("Added tasks for {}", entry.relative_path);

            let dest = match resolve_destination(&feed_dir, &entry.relative_path) {
                Ok(dest) => dest,
                Err(e) => {
                    warn!("{}", e);
                    if self.settings.copy_files {
                        summary.skipped += 1;
                    }
                    continue;
                }
            };

            if !self.settings.copy_files {
                continue;
            }

            if is_same_file(&entry.absolute_path, &dest) {
                debug!("{} is already in place", dest.display());
                summary.skipped += 1;
                staged.insert(canonical_or(dest));
                continue;
            }

            if copy_file(&entry.absolute_path, &dest, &self.retry) {
                summary.copied += 1;
                staged.insert(canonical_or(dest));
            } else {
                summary.failed += 1;
            }
        }

        document.write(&feed_path, &self.retry)?;
        info!("Wrote {}", feed_path.display());

        if self.options.verify {
            verify(&feed_path, &document)?;
        }

        if self.settings.copy_files && self.settings.clean_up {
            summary.cleaned = self.clean_up(&feed_dir, &feed_path, &staged)?;
        }

        if self.options.open_output {
            match ensure_directory(&feed_dir, &self.retry) {
                Ok(()) => self.reveal.reveal(&feed_dir),
                Err(e) => warn!("Failed to create {}: {}", feed_dir.display(), e),
            }
        }

        summary.report();
        Ok(summary)
    }

    /// Delete files under `feed_dir` that were not staged by this build.
    ///
    /// `staged` holds canonical paths. Nothing is deleted unless both folders
    /// resolve on disk and neither contains the other.
    fn clean_up(
        &self,
        feed_dir: &Path,
        feed_path: &Path,
        staged: &HashSet<PathBuf>,
    ) -> Result<usize> {
        let root = self.source_root()?;
        let (feed_dir, root) = match (fs::canonicalize(feed_dir), fs::canonicalize(&root)) {
            (Ok(feed_dir), Ok(root)) => (feed_dir, root),
            _ => {
                warn!(
                    "Not cleaning {}: unable to resolve it against the output folder {}",
                    feed_dir.display(),
                    root.display()
                );
                return Ok(0);
            }
        };
        if root.starts_with(&feed_dir) || feed_dir.starts_with(&root) {
            warn!(
                "Not cleaning {}: it overlaps the output folder {}",
                feed_dir.display(),
                root.display()
            );
            return Ok(0);
        }
        let feed_path = canonical_or(feed_path.to_path_buf());

        let mut cleaned = 0;
        for entry in WalkDir::new(&feed_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read {}: {}", feed_dir.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if path == feed_path || staged.contains(path) {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    info!("Cleaned {}", path.display());
                    cleaned += 1;
                }
                Err(e) => warn!("Failed to clean {}: {}", path.display(), e),
            }
        }

        Ok(cleaned)
    }
}

/// Resolve `path` on disk, keeping it as given when it cannot be resolved.
fn canonical_or(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

fn verify(feed_path: &Path, expected: &FeedDocument) -> Result<()> {
    let written = FeedDocument::read(feed_path)?;
    if &written != expected {
        return Err(FeedError::Verification(format!(
            "{} holds {} tasks, expected {}",
            feed_path.display(),
            written.tasks().len(),
            expected.tasks().len()
        )));
    }
    info!("Verified {} tasks in {}", written.tasks().len(), feed_path.display());
    Ok(())
}

/// Make `path` absolute against the working directory without touching the
/// file system.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| FeedError::io(path, e))
}
