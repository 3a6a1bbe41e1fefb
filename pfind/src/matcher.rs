/// File matching against user supplied criteria.
///
/// `FileMatcher` is the predicate every pool member applies to each file it visits. The
/// criteria are checked in a fixed order and evaluation stops at the first one that fails:
///
/// 1. name substring (literal, case-sensitive, base name only)
/// 2. exact size
/// 3. modification time strictly after the threshold
///
/// ```rust,ignore
/// let matcher = FileMatcher::new(MatchCriteria {
///     name: Some(".log".to_string()),
///     ..Default::default()
/// });
/// assert!(matcher.is_match(Path::new("/var/log/app.log"), &facts));
/// ```
use std::fs::Metadata;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::MatchCriteria;
use crate::report::Reporter;

/// The subset of file metadata the predicate looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFacts {
    /// Size in bytes as reported by `lstat`
    pub size: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<SystemTime>,
}

impl FileFacts {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Evaluates `MatchCriteria` against files
#[derive(Debug, Clone)]
pub struct FileMatcher {
    criteria: MatchCriteria,
}

impl FileMatcher {
    pub fn new(criteria: MatchCriteria) -> Self {
        Self { criteria }
    }

    /// Pure predicate: no output, no filesystem access
    pub fn is_match(&self, path: &Path, facts: &FileFacts) -> bool {
        if let Some(name) = &self.criteria.name {
            if !name_contains(path, name) {
                return false;
            }
        }

        if let Some(size) = self.criteria.size {
            if facts.size != size {
                return false;
            }
        }

        if let Some(threshold) = self.criteria.newer_than {
            match facts.modified {
                Some(modified) if is_newer(modified, threshold) => {}
                _ => return false,
            }
        }

        true
    }

    /// Evaluates the predicate and reports the file when it matches and output is not silenced
    pub fn check(&self, path: &Path, metadata: &Metadata, reporter: &dyn Reporter) -> bool {
        let facts = FileFacts::from_metadata(metadata);
        let matched = self.is_match(path, &facts);
        if matched && !self.criteria.silent {
            reporter.matched(path, &facts);
        }
        matched
    }
}

/// Byte-wise substring test on the base name; names that are not UTF-8 are never rewritten
#[cfg(unix)]
fn name_contains(path: &Path, needle: &str) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Some(base) = path.file_name() else {
        return false;
    };
    let (haystack, needle) = (base.as_bytes(), needle.as_bytes());
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(not(unix))]
fn name_contains(path: &Path, needle: &str) -> bool {
    path.file_name()
        .and_then(|base| base.to_str())
        .map_or(false, |base| base.contains(needle))
}

/// Strict comparison: a file modified exactly at the threshold is not newer
fn is_newer(modified: SystemTime, threshold: i64) -> bool {
    let bound = if threshold >= 0 {
        UNIX_EPOCH.checked_add(Duration::from_secs(threshold as u64))
    } else {
        UNIX_EPOCH.checked_sub(Duration::from_secs(threshold.unsigned_abs()))
    };

    match bound {
        Some(bound) => modified > bound,
        // Unrepresentable: far past is always older, far future is never reached
        None => threshold < 0,
    }
}
