//! Settings for a feed build.
//!
//! Loaded once from a TOML file whose keys follow the feed builder's settings
//! store (`OutputFolder`, `FeedXML`, `BaseURL`, ...). The loaded value is
//! passed explicitly to the scanner, condition builder and writer and never
//! written back.

use crate::utils::errors::{FeedError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the build outputs to scan
    #[serde(rename = "OutputFolder")]
    pub output_folder: String,

    /// Where the feed XML is written; staged files land next to it
    #[serde(rename = "FeedXML")]
    pub feed_xml: String,

    /// Value of the feed's `BaseUrl` attribute
    #[serde(rename = "BaseURL")]
    pub base_url: String,

    #[serde(rename = "IgnoreDebugSymbols")]
    pub ignore_debug_symbols: bool,

    #[serde(rename = "IgnoreVsHosting")]
    pub ignore_vs_hosting: bool,

    /// Extra file names to leave out of the feed (case-insensitive)
    #[serde(rename = "IgnoreFiles")]
    pub ignore_files: Vec<String>,

    #[serde(rename = "CompareVersion")]
    pub compare_version: bool,

    #[serde(rename = "CompareSize")]
    pub compare_size: bool,

    #[serde(rename = "CompareDate")]
    pub compare_date: bool,

    #[serde(rename = "CompareHash")]
    pub compare_hash: bool,

    /// Stage scanned files next to the feed
    #[serde(rename = "CopyFiles")]
    pub copy_files: bool,

    /// Delete staged files that are no longer part of the feed
    #[serde(rename = "CleanUp")]
    pub clean_up: bool,

    /// Fold case when checking relative paths for duplicates
    #[serde(rename = "CaseInsensitivePaths")]
    pub case_insensitive_paths: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "LogLevel")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_folder: String::new(),
            feed_xml: String::new(),
            base_url: String::new(),
            ignore_debug_symbols: true,
            ignore_vs_hosting: true,
            ignore_files: Vec::new(),
            compare_version: true,
            compare_size: false,
            compare_date: false,
            compare_hash: false,
            copy_files: true,
            clean_up: false,
            case_insensitive_paths: default_case_insensitive_paths(),
            log_level: default_log_level(),
        }
    }
}

fn default_case_insensitive_paths() -> bool {
    cfg!(any(target_os = "windows", target_os = "macos"))
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which dimensions a client compares against its installed copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonPolicy {
    pub compare_version: bool,
    pub compare_size: bool,
    pub compare_date: bool,
    pub compare_hash: bool,
}

impl ComparisonPolicy {
    pub fn all() -> Self {
        Self {
            compare_version: true,
            compare_size: true,
            compare_date: true,
            compare_hash: true,
        }
    }
}

/// Rules deciding which scanned files stay out of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    pub ignore_debug_symbols: bool,
    pub ignore_hosting_stub: bool,
    pub ignore_files: Vec<String>,
    /// Absolute paths that are never catalogued (the feed file itself)
    pub excluded_paths: Vec<PathBuf>,
    pub case_insensitive_paths: bool,
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// Relative `OutputFolder` and `FeedXML` values are resolved against the
    /// directory holding the settings file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FeedError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| FeedError::io(path, e))?;
        let mut settings = Self::from_toml(&content)?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            settings.output_folder = rebase(base, &settings.output_folder);
            settings.feed_xml = rebase(base, &settings.feed_xml);
        }
        Ok(settings)
    }

    /// Parse settings from TOML text. String values are trimmed.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut settings: Settings =
            toml::from_str(content).map_err(|e| FeedError::Config(e.to_string()))?;
        settings.trim();
        Ok(settings)
    }

    fn trim(&mut self) {
        for value in [
            &mut self.output_folder,
            &mut self.feed_xml,
            &mut self.base_url,
            &mut self.log_level,
        ] {
            *value = value.trim().to_string();
        }
        self.ignore_files.retain(|name| !name.trim().is_empty());
        for name in &mut self.ignore_files {
            *name = name.trim().to_string();
        }
    }

    pub fn comparison_policy(&self) -> ComparisonPolicy {
        ComparisonPolicy {
            compare_version: self.compare_version,
            compare_size: self.compare_size,
            compare_date: self.compare_date,
            compare_hash: self.compare_hash,
        }
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules {
            ignore_debug_symbols: self.ignore_debug_symbols,
            ignore_hosting_stub: self.ignore_vs_hosting,
            ignore_files: self.ignore_files.clone(),
            excluded_paths: Vec::new(),
            case_insensitive_paths: self.case_insensitive_paths,
        }
    }
}

fn rebase(base: &Path, value: &str) -> String {
    if value.is_empty() || Path::new(value).is_absolute() {
        return value.to_string();
    }
    base.join(value).to_string_lossy().into_owned()
}
