//! Source tree scanning.
//!
//! Walks the build output directory once, drops ignorable files and returns
//! the remaining files keyed by their path relative to the root, in walk
//! order.

use crate::config::{ComparisonPolicy, IgnoreRules};
use crate::fs::metadata::FileCatalogEntry;
use crate::utils::errors::ScanError;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extension of debug symbol files
const DEBUG_SYMBOL_EXTENSION: &str = "pdb";

/// Name fragment of the Visual Studio hosting process stub
const HOSTING_STUB_PATTERN: &str = "vshost.exe";

/// Scanned files keyed by relative path, in scan order
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    entries: IndexMap<String, FileCatalogEntry>,
}

impl FileCatalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative_path: &str) -> Option<&FileCatalogEntry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileCatalogEntry> {
        self.entries.values()
    }

    pub fn relative_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Walk `root` and catalogue every file that is not ignorable.
///
/// A missing root yields an empty catalog. Two files whose relative paths
/// collide (after case folding, when `rules.case_insensitive_paths` is set)
/// fail the scan.
///
/// # Example
/// ```no_run
/// use feed_builder::config::{ComparisonPolicy, IgnoreRules};
/// use feed_builder::fs::walker::scan;
/// use std::path::Path;
///
/// let catalog = scan(Path::new("bin/Release"), &IgnoreRules::default(), &ComparisonPolicy::default()).unwrap();
/// println!("Found {} files", catalog.len());
/// ```
pub fn scan(
    root: &Path,
    rules: &IgnoreRules,
    policy: &ComparisonPolicy,
) -> Result<FileCatalog, ScanError> {
    let mut catalog = FileCatalog::default();
    if root.as_os_str().is_empty() || !root.is_dir() {
        return Ok(catalog);
    }

    // folded key -> first path that produced it
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        if entry.path_is_symlink() && !path.is_file() {
            debug!("Skipping {} (link does not resolve to a file)", path.display());
            continue;
        }

        if is_ignorable(path, rules) {
            warn!("Skipping {}", path.display());
            continue;
        }

        let relative_path = relative_name(path, root);
        let folded = fold_key(&relative_path, rules.case_insensitive_paths);
        if let Some(first) = seen.get(&folded) {
            return Err(ScanError::DuplicateEntry {
                relative_path,
                first: first.clone(),
                second: path.to_path_buf(),
            });
        }

        let file = FileCatalogEntry::from_path(path, relative_path.clone(), policy).map_err(
            |source| ScanError::Io {
                path: path.to_path_buf(),
                source,
            },
        )?;

        seen.insert(folded, path.to_path_buf());
        catalog.entries.insert(relative_path.clone(), file);
        info!("Added {} to file list", relative_path);
    }

    Ok(catalog)
}

/// Whether a scanned file stays out of the feed.
pub fn is_ignorable(path: &Path, rules: &IgnoreRules) -> bool {
    if rules.ignore_debug_symbols
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DEBUG_SYMBOL_EXTENSION))
    {
        return true;
    }

    if rules.ignore_hosting_stub
        && path
            .to_string_lossy()
            .to_lowercase()
            .contains(HOSTING_STUB_PATTERN)
    {
        return true;
    }

    if let Some(name) = path.file_name().map(|n| n.to_string_lossy()) {
        if rules
            .ignore_files
            .iter()
            .any(|ignored| ignored.to_lowercase() == name.to_lowercase())
        {
            return true;
        }
    }

    rules.excluded_paths.iter().any(|excluded| excluded == path)
}

/// Path of `path` below `root`, joined with the platform separator.
fn relative_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(MAIN_SEPARATOR_STR)
}

fn fold_key(relative_path: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        relative_path.to_lowercase()
    } else {
        relative_path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing_subscriber::fmt::writer::MakeWriter;

    /// Collects formatted log output in memory
    #[derive(Clone, Default)]
    struct CapturedLogs {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            let buf = self.buf.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn rules(debug: bool, stub: bool) -> IgnoreRules {
        IgnoreRules {
            ignore_debug_symbols: debug,
            ignore_hosting_stub: stub,
            ..IgnoreRules::default()
        }
    }

    fn sep(path: &str) -> String {
        path.replace('/', MAIN_SEPARATOR_STR)
    }

    #[test]
    fn test_scan_empty_directory() -> Result<(), ScanError> {
        let temp_dir = TempDir::new().unwrap();
        let catalog = scan(temp_dir.path(), &IgnoreRules::default(), &ComparisonPolicy::default())?;
        assert!(catalog.is_empty());
        Ok(())
    }

    #[test]
    fn test_scan_missing_root_is_empty() -> Result<(), ScanError> {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let catalog = scan(&missing, &IgnoreRules::default(), &ComparisonPolicy::default())?;
        assert!(catalog.is_empty());

        let catalog = scan(Path::new(""), &IgnoreRules::default(), &ComparisonPolicy::default())?;
        assert!(catalog.is_empty());
        Ok(())
    }

    #[test]
    fn test_scan_keys_by_relative_path_in_order() -> Result<(), ScanError> {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("plugins/net")).unwrap();
        fs::write(root.join("b.dll"), b"bb").unwrap();
        fs::write(root.join("a.exe"), b"a").unwrap();
        fs::write(root.join("plugins/net/http.dll"), b"http").unwrap();

        let catalog = scan(root, &IgnoreRules::default(), &ComparisonPolicy::default())?;

        let paths: Vec<&str> = catalog.relative_paths().collect();
        let nested = sep("plugins/net/http.dll");
        assert_eq!(paths, vec!["a.exe", "b.dll", nested.as_str()]);

        let http = catalog.get(&sep("plugins/net/http.dll")).unwrap();
        assert_eq!(http.size_bytes, 4);
        assert_eq!(http.absolute_path, root.join("plugins/net/http.dll"));
        Ok(())
    }

    #[test]
    fn test_debug_symbols_excluded_only_when_enabled() {
        let pdb = Path::new("/build/app.pdb");
        assert!(is_ignorable(pdb, &rules(true, false)));
        assert!(is_ignorable(pdb, &rules(true, true)));
        assert!(!is_ignorable(pdb, &rules(false, false)));
        assert!(!is_ignorable(pdb, &rules(false, true)));
        assert!(!is_ignorable(Path::new("/build/app.exe"), &rules(true, true)));
    }

    #[test]
    fn test_hosting_stub_excluded_only_when_enabled() {
        let stub = Path::new("/build/App.VSHost.EXE");
        assert!(is_ignorable(stub, &rules(false, true)));
        assert!(is_ignorable(stub, &rules(true, true)));
        assert!(!is_ignorable(stub, &rules(false, false)));
        assert!(!is_ignorable(stub, &rules(true, false)));

        let manifest = Path::new("/build/app.vshost.exe.manifest");
        assert!(is_ignorable(manifest, &rules(false, true)));
    }

    #[test]
    fn test_ignore_files_and_excluded_paths() {
        let rules = IgnoreRules {
            ignore_files: vec!["Thumbs.db".to_string()],
            excluded_paths: vec![PathBuf::from("/dist/feed.xml")],
            ..IgnoreRules::default()
        };
        assert!(is_ignorable(Path::new("/build/img/thumbs.DB"), &rules));
        assert!(is_ignorable(Path::new("/dist/feed.xml"), &rules));
        assert!(!is_ignorable(Path::new("/dist/other.xml"), &rules));
    }

    #[test]
    fn test_scan_skips_ignorable_files() -> Result<(), ScanError> {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("app.exe"), b"exe").unwrap();
        fs::write(root.join("app.pdb"), b"pdb").unwrap();
        fs::write(root.join("app.vshost.exe"), b"stub").unwrap();

        let catalog = scan(root, &rules(true, true), &ComparisonPolicy::default())?;
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("app.exe"));

        let catalog = scan(root, &rules(false, false), &ComparisonPolicy::default())?;
        assert_eq!(catalog.len(), 3);
        Ok(())
    }

    #[test]
    fn test_scan_logs_one_warning_per_skipped_file() -> Result<(), ScanError> {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("app.exe"), b"exe").unwrap();
        fs::write(root.join("app.pdb"), b"pdb").unwrap();
        fs::write(root.join("app.vshost.exe"), b"stub").unwrap();

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let catalog = tracing::subscriber::with_default(subscriber, || {
            scan(root, &rules(true, true), &ComparisonPolicy::default())
        })?;
        assert_eq!(catalog.len(), 1);

        let lines = logs.lines();
        let skips: Vec<&String> = lines
            .iter()
            .filter(|line| line.contains("WARN") && line.contains("Skipping"))
            .collect();
        assert_eq!(skips.len(), 2);
        assert!(skips.iter().any(|line| line.contains("app.pdb")));
        assert!(skips.iter().any(|line| line.contains("app.vshost.exe")));

        let added = lines
            .iter()
            .filter(|line| line.contains("INFO") && line.contains("Added app.exe to file list"))
            .count();
        assert_eq!(added, 1);
        Ok(())
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_case_folded_duplicates_fail_scan() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("Readme.txt"), b"1").unwrap();
        fs::write(root.join("readme.txt"), b"2").unwrap();

        let case_sensitive = IgnoreRules::default();
        let catalog = scan(root, &case_sensitive, &ComparisonPolicy::default()).unwrap();
        assert_eq!(catalog.len(), 2);

        let case_insensitive = IgnoreRules {
            case_insensitive_paths: true,
            ..IgnoreRules::default()
        };
        let err = scan(root, &case_insensitive, &ComparisonPolicy::default()).unwrap_err();
        match err {
            ScanError::DuplicateEntry { relative_path, .. } => {
                assert_eq!(relative_path, "readme.txt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_scan_skips_dangling_symlink() -> Result<(), ScanError> {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("real.dll"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("gone.dll"), root.join("dangling.dll")).unwrap();

        let catalog = scan(root, &IgnoreRules::default(), &ComparisonPolicy::default())?;
        assert_eq!(catalog.relative_paths().collect::<Vec<_>>(), vec!["real.dll"]);
        Ok(())
    }
}
