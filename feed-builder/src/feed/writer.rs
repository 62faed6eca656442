//! Feed document model and XML serialization.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <Feed BaseUrl="https://updates.example.com/">
//!   <Tasks>
//!     <FileUpdateTask localPath="app.exe" lastModified="133444736001234567" fileSize="1024" version="1.2.0.0">
//!       <Conditions>
//!         <FileExistsCondition type="or"/>
//!         <FileSizeCondition type="not" what="is" size="1024"/>
//!       </Conditions>
//!     </FileUpdateTask>
//!   </Tasks>
//! </Feed>
//! ```

use crate::feed::conditions::{Combinator, Condition, ConditionSet, CHECKSUM_TYPE_SHA256};
use crate::fs::metadata::FileCatalogEntry;
use crate::fs::ops::{ensure_directory, RetryPolicy};
use crate::utils::errors::{FeedError, PathResolutionError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// One `<FileUpdateTask>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdateTask {
    pub local_path: String,
    pub last_modified: i64,
    pub file_size: u64,
    pub version: Option<String>,
    pub conditions: ConditionSet,
}

impl FileUpdateTask {
    pub fn new(entry: &FileCatalogEntry, conditions: ConditionSet) -> Self {
        Self {
            local_path: entry.relative_path.clone(),
            last_modified: entry.last_modified,
            file_size: entry.size_bytes,
            version: entry.file_version.clone().filter(|v| !v.is_empty()),
            conditions,
        }
    }
}

/// In-memory feed, serialized once when the build finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    base_url: Option<String>,
    tasks: Vec<FileUpdateTask>,
}

impl FeedDocument {
    /// Start an empty feed. A blank base URL leaves `BaseUrl` off the root.
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim();
        Self {
            base_url: (!base_url.is_empty()).then(|| base_url.to_string()),
            tasks: Vec::new(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn tasks(&self) -> &[FileUpdateTask] {
        &self.tasks
    }

    pub fn push_task(&mut self, task: FileUpdateTask) {
        self.tasks.push(task);
    }

    /// Serialize to UTF-8 XML with a declaration and two-space indentation.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;

        let mut feed = BytesStart::new("Feed");
        if let Some(base_url) = &self.base_url {
            feed.push_attribute(("BaseUrl", base_url.as_str()));
        }
        writer.write_event(Event::Start(feed)).map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("Tasks")))
            .map_err(xml_error)?;

        for task in &self.tasks {
            write_task(&mut writer, task)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("Tasks")))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("Feed")))
            .map_err(xml_error)?;

        let mut xml = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
        xml.push('\n');
        Ok(xml)
    }

    /// Write the feed to `path`, creating its directory under `retry` and
    /// replacing any existing file.
    pub fn write(&self, path: &Path, retry: &RetryPolicy) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(FeedError::InvalidFeedLocation);
        }

        let xml = self.to_xml_string()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent, retry)
                .map_err(|e| FeedError::io(parent, e))?;
        }
        fs::write(path, xml).map_err(|e| FeedError::io(path, e))
    }

    /// Read a feed file written by [`FeedDocument::write`].
    pub fn read(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path).map_err(|e| FeedError::io(path, e))?;
        Self::parse(&xml)
    }

    /// Parse feed XML back into a document.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut document = FeedDocument::default();
        let mut current: Option<FileUpdateTask> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => {
                    let attrs = read_attributes(&e)?;
                    match e.name().as_ref() {
                        b"Feed" => document.base_url = attrs.get("BaseUrl").cloned(),
                        b"FileUpdateTask" => current = Some(parse_task(&attrs)?),
                        name => push_condition(&mut current, name, &attrs)?,
                    }
                }
                Event::Empty(e) => {
                    let attrs = read_attributes(&e)?;
                    match e.name().as_ref() {
                        b"Feed" => document.base_url = attrs.get("BaseUrl").cloned(),
                        b"FileUpdateTask" => document.tasks.push(parse_task(&attrs)?),
                        name => push_condition(&mut current, name, &attrs)?,
                    }
                }
                Event::End(e) if e.name().as_ref() == b"FileUpdateTask" => {
                    if let Some(task) = current.take() {
                        document.tasks.push(task);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(document)
    }
}

/// Destination of a staged file: `feed_dir` joined with the entry's relative
/// path. Empty components, absolute paths and `..` are rejected.
pub fn resolve_destination(
    feed_dir: &Path,
    relative_path: &str,
) -> std::result::Result<PathBuf, PathResolutionError> {
    let unresolved = || PathResolutionError {
        folder: feed_dir.display().to_string(),
        file: relative_path.to_string(),
    };

    if feed_dir.as_os_str().is_empty() || relative_path.trim().is_empty() {
        return Err(unresolved());
    }

    let relative = Path::new(relative_path);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(unresolved());
    }

    Ok(feed_dir.join(relative))
}

fn write_task(writer: &mut Writer<Vec<u8>>, task: &FileUpdateTask) -> Result<()> {
    let last_modified = task.last_modified.to_string();
    let file_size = task.file_size.to_string();

    let mut start = BytesStart::new("FileUpdateTask");
    start.push_attribute(("localPath", task.local_path.as_str()));
    start.push_attribute(("lastModified", last_modified.as_str()));
    start.push_attribute(("fileSize", file_size.as_str()));
    if let Some(version) = &task.version {
        start.push_attribute(("version", version.as_str()));
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("Conditions")))
        .map_err(xml_error)?;
    for condition in &task.conditions {
        let mut element = BytesStart::new(condition.element_name());
        for (key, value) in condition.attributes() {
            element.push_attribute((key, value.as_str()));
        }
        writer.write_event(Event::Empty(element)).map_err(xml_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("Conditions")))
        .map_err(xml_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("FileUpdateTask")))
        .map_err(xml_error)?;
    Ok(())
}

fn read_attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn parse_task(attrs: &HashMap<String, String>) -> Result<FileUpdateTask> {
    Ok(FileUpdateTask {
        local_path: required(attrs, "localPath")?.to_string(),
        last_modified: parse_number(attrs, "lastModified")?,
        file_size: parse_number(attrs, "fileSize")?,
        version: attrs.get("version").cloned(),
        conditions: ConditionSet::default(),
    })
}

fn push_condition(
    current: &mut Option<FileUpdateTask>,
    name: &[u8],
    attrs: &HashMap<String, String>,
) -> Result<()> {
    let combinator = || -> Result<Combinator> {
        let value = required(attrs, "type")?;
        Combinator::parse(value)
            .ok_or_else(|| FeedError::Xml(format!("unknown condition type '{value}'")))
    };

    let condition = match name {
        b"FileExistsCondition" => Condition::FileExists {
            combinator: combinator()?,
        },
        b"FileVersionCondition" => Condition::FileVersion {
            combinator: combinator()?,
            version: required(attrs, "version")?.to_string(),
        },
        b"FileSizeCondition" => Condition::FileSize {
            combinator: combinator()?,
            size: parse_number(attrs, "size")?,
        },
        b"FileDateCondition" => Condition::FileDate {
            combinator: match attrs.get("type") {
                Some(_) => Some(combinator()?),
                None => None,
            },
            timestamp: parse_number(attrs, "timestamp")?,
        },
        b"FileChecksumCondition" => {
            let checksum_type = required(attrs, "checksumType")?;
            if checksum_type != CHECKSUM_TYPE_SHA256 {
                return Err(FeedError::Xml(format!(
                    "unsupported checksum type '{checksum_type}'"
                )));
            }
            Condition::FileChecksum {
                combinator: combinator()?,
                checksum: required(attrs, "checksum")?.to_string(),
            }
        }
        _ => return Ok(()),
    };

    match current {
        Some(task) => {
            task.conditions.push(condition);
            Ok(())
        }
        None => Err(FeedError::Xml(format!(
            "{} outside of a FileUpdateTask",
            condition.element_name()
        ))),
    }
}

fn required<'a>(attrs: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    attrs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| FeedError::Xml(format!("missing attribute '{key}'")))
}

fn parse_number<T: std::str::FromStr>(attrs: &HashMap<String, String>, key: &str) -> Result<T> {
    let value = required(attrs, key)?;
    value
        .parse()
        .map_err(|_| FeedError::Xml(format!("attribute '{key}' is not a number: '{value}'")))
}

fn xml_error<E: std::fmt::Display>(err: E) -> FeedError {
    FeedError::Xml(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComparisonPolicy;
    use crate::feed::conditions::build_conditions;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn entry(relative_path: &str) -> FileCatalogEntry {
        FileCatalogEntry {
            relative_path: relative_path.to_string(),
            absolute_path: PathBuf::from("/build").join(relative_path),
            size_bytes: 18_446_744_073_709_551_000,
            last_modified: 133_444_736_001_234_567,
            file_version: Some("1.2.0.0".to_string()),
            content_hash: Some(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_string(),
            ),
        }
    }

    fn sample_document() -> FeedDocument {
        let mut document = FeedDocument::new("https://updates.example.com/app/?a=1&b=2");
        for path in ["app.exe", "data/strings & things.txt"] {
            let entry = entry(path);
            let conditions = build_conditions(&entry, &ComparisonPolicy::all());
            document.push_task(FileUpdateTask::new(&entry, conditions));
        }
        document
    }

    #[test]
    fn test_serialized_layout() {
        let mut document = FeedDocument::new("https://updates.example.com/");
        let mut file = entry("app.exe");
        file.size_bytes = 1024;
        let conditions = build_conditions(
            &file,
            &ComparisonPolicy {
                compare_size: true,
                ..ComparisonPolicy::default()
            },
        );
        document.push_task(FileUpdateTask::new(&file, conditions));

        let expected = concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
            "<Feed BaseUrl=\"https://updates.example.com/\">\n",
            "  <Tasks>\n",
            "    <FileUpdateTask localPath=\"app.exe\" lastModified=\"133444736001234567\" fileSize=\"1024\" version=\"1.2.0.0\">\n",
            "      <Conditions>\n",
            "        <FileExistsCondition type=\"or\"/>\n",
            "        <FileSizeCondition type=\"not\" what=\"is\" size=\"1024\"/>\n",
            "      </Conditions>\n",
            "    </FileUpdateTask>\n",
            "  </Tasks>\n",
            "</Feed>\n",
        );
        assert_eq!(document.to_xml_string().unwrap(), expected);
    }

    #[test]
    fn test_blank_base_url_omits_attribute() {
        let document = FeedDocument::new("   ");
        assert_eq!(document.base_url(), None);
        let xml = document.to_xml_string().unwrap();
        assert!(xml.contains("<Feed>"));
        assert!(!xml.contains("BaseUrl"));
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let document = sample_document();
        let xml = document.to_xml_string().unwrap();
        let parsed = FeedDocument::parse(&xml).unwrap();

        assert_eq!(parsed, document);
        let task = &parsed.tasks()[0];
        assert_eq!(task.file_size, 18_446_744_073_709_551_000);
        assert_eq!(task.last_modified, 133_444_736_001_234_567);
        assert_eq!(parsed.tasks()[1].local_path, "data/strings & things.txt");
        assert_eq!(
            parsed.base_url(),
            Some("https://updates.example.com/app/?a=1&b=2")
        );
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let first = sample_document().to_xml_string().unwrap();
        let second = sample_document().to_xml_string().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_creates_parent_and_overwrites() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dist/v1/feed.xml");

        FeedDocument::new("").write(&path, &RetryPolicy::immediate(3))?;
        assert!(FeedDocument::read(&path)?.tasks().is_empty());

        let document = sample_document();
        document.write(&path, &RetryPolicy::immediate(3))?;
        assert_eq!(FeedDocument::read(&path)?, document);
        Ok(())
    }

    #[test]
    fn test_write_without_location_fails() {
        let err = sample_document()
            .write(Path::new(""), &RetryPolicy::default())
            .unwrap_err();
        assert!(matches!(err, FeedError::InvalidFeedLocation));
    }

    #[test]
    fn test_write_uses_given_retry_policy() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("dist");
        fs::write(&blocker, b"not a directory").unwrap();

        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(150),
        };
        let start = Instant::now();
        let err = sample_document()
            .write(&blocker.join("feed.xml"), &policy)
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, FeedError::Io { .. }));
        assert!(elapsed >= Duration::from_millis(150));

        let start = Instant::now();
        let err = sample_document()
            .write(&blocker.join("feed.xml"), &RetryPolicy::immediate(3))
            .unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        let xml = r#"<Feed><Tasks><FileUpdateTask localPath="a" lastModified="x" fileSize="1"/></Tasks></Feed>"#;
        assert!(matches!(FeedDocument::parse(xml), Err(FeedError::Xml(_))));
    }

    #[test]
    fn test_resolve_destination() {
        let dir = Path::new("/dist");
        assert_eq!(
            resolve_destination(dir, "bin/app.exe").unwrap(),
            PathBuf::from("/dist/bin/app.exe")
        );
        assert!(resolve_destination(dir, "").is_err());
        assert!(resolve_destination(Path::new(""), "app.exe").is_err());
        assert!(resolve_destination(dir, "../escape.dll").is_err());
        assert!(resolve_destination(dir, "/etc/passwd").is_err());

        let err = resolve_destination(dir, "").unwrap_err();
        assert_eq!(err.folder, "/dist");
    }
}
