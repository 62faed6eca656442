//! Per-file metadata captured for the feed.
//!
//! Size and last-modified time are always read. The binary file version and
//! the SHA-256 content hash are only extracted when the comparison policy
//! asks for them, since both require reading the file contents.

use crate::config::ComparisonPolicy;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Seconds between 1601-01-01T00:00:00Z and the Unix epoch
const FILE_TIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// File-time ticks per second (100 ns intervals)
const TICKS_PER_SECOND: i64 = 10_000_000;

/// `VS_FIXEDFILEINFO.dwSignature` followed by `dwStrucVersion` 1.0, little-endian
const FIXED_FILE_INFO_MARKER: [u8; 8] = [0xBD, 0x04, 0xEF, 0xFE, 0x00, 0x00, 0x01, 0x00];

/// Metadata snapshot for a single catalogued file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCatalogEntry {
    /// Path relative to the scan root, used as `localPath` in the feed
    pub relative_path: String,

    /// Location of the file on disk
    pub absolute_path: PathBuf,

    /// File size in bytes
    pub size_bytes: u64,

    /// Last write time as file-time ticks
    pub last_modified: i64,

    /// Binary file version, when requested and present
    pub file_version: Option<String>,

    /// Lowercase hex SHA-256 of the contents, when requested
    pub content_hash: Option<String>,
}

impl FileCatalogEntry {
    /// Read the metadata of `path`, extracting the optional fields the
    /// comparison policy needs.
    pub fn from_path(
        path: &Path,
        relative_path: String,
        policy: &ComparisonPolicy,
    ) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;

        let file_version = if policy.compare_version {
            read_file_version(path)?
        } else {
            None
        };

        let content_hash = if policy.compare_hash {
            Some(sha256_hex(path)?)
        } else {
            None
        };

        Ok(Self {
            relative_path,
            absolute_path: path.to_path_buf(),
            size_bytes: metadata.len(),
            last_modified: to_file_time(metadata.modified()?),
            file_version,
            content_hash,
        })
    }
}

/// Encode a timestamp as Windows file-time ticks: 100 ns intervals since
/// 1601-01-01T00:00:00Z. Times before that epoch clamp to zero.
pub fn to_file_time(time: SystemTime) -> i64 {
    let time: DateTime<Utc> = time.into();
    let secs = time.timestamp() + FILE_TIME_EPOCH_OFFSET_SECS;
    if secs < 0 {
        return 0;
    }
    secs.saturating_mul(TICKS_PER_SECOND)
        .saturating_add(i64::from(time.timestamp_subsec_nanos() / 100))
}

/// Extract `major.minor.build.revision` from a PE image's fixed version
/// resource. Returns `None` for anything that is not a PE image or carries no
/// version resource.
pub fn read_file_version(path: &Path) -> io::Result<Option<String>> {
    let mut file = fs::File::open(path)?;
    let mut magic = [0u8; 2];
    if file.read(&mut magic)? < 2 || &magic != b"MZ" {
        return Ok(None);
    }

    let mut data = magic.to_vec();
    file.read_to_end(&mut data)?;
    Ok(parse_fixed_file_version(&data))
}

fn parse_fixed_file_version(data: &[u8]) -> Option<String> {
    let start = data
        .windows(FIXED_FILE_INFO_MARKER.len())
        .position(|w| w == FIXED_FILE_INFO_MARKER)?;
    let fields = data.get(start + 8..start + 16)?;

    let ms = u32::from_le_bytes([fields[0], fields[1], fields[2], fields[3]]);
    let ls = u32::from_le_bytes([fields[4], fields[5], fields[6], fields[7]]);
    Some(format!(
        "{}.{}.{}.{}",
        ms >> 16,
        ms & 0xFFFF,
        ls >> 16,
        ls & 0xFFFF
    ))
}

/// Compute the SHA-256 hex digest of a file's contents, reading in 64 KiB
/// chunks.
pub fn sha256_hex(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65_536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Minimal PE-looking bytes carrying a fixed version resource, for tests.
#[cfg(test)]
pub(crate) fn fake_pe_image(version: [u16; 4], total_len: usize) -> Vec<u8> {
    let mut data = b"MZ".to_vec();
    data.resize(64, 0);
    data.extend_from_slice(&FIXED_FILE_INFO_MARKER);
    let ms = (u32::from(version[0]) << 16) | u32::from(version[1]);
    let ls = (u32::from(version[2]) << 16) | u32::from(version[3]);
    data.extend_from_slice(&ms.to_le_bytes());
    data.extend_from_slice(&ls.to_le_bytes());
    if data.len() < total_len {
        data.resize(total_len, 0);
    }
    data
}
