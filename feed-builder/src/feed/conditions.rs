//! Update conditions attached to each feed task.
//!
//! The client evaluates a task's conditions left to right, joining each one
//! to the running result with its combinator. The existence check always
//! comes first so a missing file always qualifies for update; the enabled
//! comparisons follow in a fixed order.

use crate::config::ComparisonPolicy;
use crate::fs::metadata::FileCatalogEntry;

pub const CHECKSUM_TYPE_SHA256: &str = "sha256";

/// How a condition joins the conditions before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    Or,
    OrNot,
    Not,
}

impl Combinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Combinator::Or => "or",
            Combinator::OrNot => "or-not",
            Combinator::Not => "not",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "or" => Some(Combinator::Or),
            "or-not" => Some(Combinator::OrNot),
            "not" => Some(Combinator::Not),
            _ => None,
        }
    }

    /// `or-not` once an earlier comparison exists, plain `not` otherwise
    fn negated(has_prior: bool) -> Self {
        if has_prior {
            Combinator::OrNot
        } else {
            Combinator::Not
        }
    }
}

/// A single comparison emitted into a task's `<Conditions>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Update when the file is missing on the client
    FileExists { combinator: Combinator },

    /// Update when the installed version is below `version`
    FileVersion {
        combinator: Combinator,
        version: String,
    },

    /// Update unless the installed size is `size`
    FileSize { combinator: Combinator, size: u64 },

    /// Update when the installed file is older than `timestamp`.
    /// Without a combinator the element carries no `type` attribute.
    FileDate {
        combinator: Option<Combinator>,
        timestamp: i64,
    },

    /// Update unless the installed file hashes to `checksum`
    FileChecksum {
        combinator: Combinator,
        checksum: String,
    },
}

impl Condition {
    /// XML element name
    pub fn element_name(&self) -> &'static str {
        match self {
            Condition::FileExists { .. } => "FileExistsCondition",
            Condition::FileVersion { .. } => "FileVersionCondition",
            Condition::FileSize { .. } => "FileSizeCondition",
            Condition::FileDate { .. } => "FileDateCondition",
            Condition::FileChecksum { .. } => "FileChecksumCondition",
        }
    }

    pub fn combinator(&self) -> Option<Combinator> {
        match self {
            Condition::FileExists { combinator }
            | Condition::FileVersion { combinator, .. }
            | Condition::FileSize { combinator, .. }
            | Condition::FileChecksum { combinator, .. } => Some(*combinator),
            Condition::FileDate { combinator, .. } => *combinator,
        }
    }

    /// Attributes in document order, `type` first when present
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::with_capacity(3);
        if let Some(combinator) = self.combinator() {
            attrs.push(("type", combinator.as_str().to_string()));
        }
        match self {
            Condition::FileExists { .. } => {}
            Condition::FileVersion { version, .. } => {
                attrs.push(("what", "below".to_string()));
                attrs.push(("version", version.clone()));
            }
            Condition::FileSize { size, .. } => {
                attrs.push(("what", "is".to_string()));
                attrs.push(("size", size.to_string()));
            }
            Condition::FileDate { timestamp, .. } => {
                attrs.push(("what", "older".to_string()));
                attrs.push(("timestamp", timestamp.to_string()));
            }
            Condition::FileChecksum { checksum, .. } => {
                attrs.push(("checksumType", CHECKSUM_TYPE_SHA256.to_string()));
                attrs.push(("checksum", checksum.clone()));
            }
        }
        attrs
    }
}

/// Ordered conditions for one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    /// True when nothing beyond the existence check was emitted: the client
    /// will never refresh a file it already has.
    pub fn is_missing_conditions(&self) -> bool {
        !self
            .conditions
            .iter()
            .any(|c| !matches!(c, Condition::FileExists { .. }))
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

/// Derive the update conditions for `entry` under `policy`.
///
/// Order and combinators:
///
/// | Condition | Enabled by        | `type` with prior | without prior |
/// |-----------|-------------------|-------------------|---------------|
/// | exists    | always            | `or`              | `or`          |
/// | version   | `compare_version` | `or`              | `or`          |
/// | size      | `compare_size`    | `or-not`          | `not`         |
/// | date      | `compare_date`    | `or`              | (none)        |
/// | checksum  | `compare_hash`    | `or-not`          | `not`         |
///
/// "Prior" means an earlier comparison other than the existence check was
/// emitted. Version and checksum are only emitted when the entry carries the
/// value.
pub fn build_conditions(entry: &FileCatalogEntry, policy: &ComparisonPolicy) -> ConditionSet {
    let mut set = ConditionSet::default();
    let mut has_prior = false;

    set.push(Condition::FileExists {
        combinator: Combinator::Or,
    });

    if policy.compare_version {
        if let Some(version) = entry.file_version.as_deref().filter(|v| !v.is_empty()) {
            set.push(Condition::FileVersion {
                combinator: Combinator::Or,
                version: version.to_string(),
            });
            has_prior = true;
        }
    }

    if policy.compare_size {
        set.push(Condition::FileSize {
            combinator: Combinator::negated(has_prior),
            size: entry.size_bytes,
        });
        has_prior = true;
    }

    if policy.compare_date {
        set.push(Condition::FileDate {
            combinator: has_prior.then_some(Combinator::Or),
            timestamp: entry.last_modified,
        });
        has_prior = true;
    }

    if policy.compare_hash {
        if let Some(checksum) = entry.content_hash.as_deref() {
            set.push(Condition::FileChecksum {
                combinator: Combinator::negated(has_prior),
                checksum: checksum.to_string(),
            });
        }
    }

    set
}
