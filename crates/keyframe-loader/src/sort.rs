//! File ordering for directory batches.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Ordering applied to the directory listing before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    NameAsc,
    NameDesc,
    DateAsc,
    DateDesc,
    SizeAsc,
    SizeDesc,
    /// Directory-listing order, as returned by the OS.
    None,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::DateAsc => "date_asc",
            Self::DateDesc => "date_desc",
            Self::SizeAsc => "size_asc",
            Self::SizeDesc => "size_desc",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Modification time as a sortable key. Unreadable metadata sorts as
/// latest, so broken entries land at the end of an ascending sort.
fn mtime_key(path: &PathBuf) -> u128 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(u128::MAX)
}

/// File size as a sortable key; unreadable metadata sorts as size zero.
fn size_key(path: &PathBuf) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Sort file paths per the requested mode. Stable for equal keys.
pub fn sort_files(mut files: Vec<PathBuf>, mode: SortMode) -> Vec<PathBuf> {
    match mode {
        SortMode::None => {}
        SortMode::NameAsc => files.sort(),
        SortMode::NameDesc => files.sort_by(|a, b| b.cmp(a)),
        SortMode::DateAsc => files.sort_by_key(mtime_key),
        SortMode::DateDesc => files.sort_by(|a, b| mtime_key(b).cmp(&mtime_key(a))),
        SortMode::SizeAsc => files.sort_by_key(size_key),
        SortMode::SizeDesc => files.sort_by(|a, b| size_key(b).cmp(&size_key(a))),
    }
    files
}
