/// Error types for pfind.
///
/// Errors fall into two groups:
///
/// 1. **Member-local failures** such as a failed `lstat` or an unreadable root. These are
///    ordinary `Result` values returned by the coordinator or a worker.
/// 2. **Pool aborts**. When any member fails, the whole pool is torn down. Every other member
///    observes the abort as `FindError::Aborted` carrying the `FatalError` that started it,
///    and `ProcessPool::run` returns that same error to the caller.
///
/// ```rust,ignore
/// match pfind::find(&config, &reporter) {
///     Ok(totals) => println!("{}", totals),
///     Err(FindError::Aborted(fatal)) => std::process::exit(fatal.exit_code),
///     Err(e) => eprintln!("{}", e),
/// }
/// ```
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for pfind operations
pub type FindResult<T> = Result<T, FindError>;

/// Exit code used when a member fails with an error or a panic
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Exit code used when the user interrupts the run
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Errors that can occur while coordinating or crawling
#[derive(Error, Debug)]
pub enum FindError {
    #[error("Cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("OS error: cannot list {path}: {source}")]
    Listing {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Configuration error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("Invalid timestamp '{0}': expected seconds since the epoch or an RFC 3339 time")]
    InvalidTimestamp(String),
    #[error("Failed to start process pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Pool aborted: {0}")]
    Aborted(FatalError),
}

/// The notice delivered to every pool member when one of them fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
    /// Rank of the member that triggered the abort
    pub rank: usize,
    /// Exit code the whole run should terminate with
    pub exit_code: i32,
    /// Human readable cause
    pub reason: String,
}

impl FatalError {
    pub fn new(rank: usize, exit_code: i32, reason: impl Into<String>) -> Self {
        Self {
            rank,
            exit_code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exception on rank {}: {}", self.rank, self.reason)
    }
}

impl FindError {
    pub fn stat(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Stat {
            path: path.into(),
            source,
        }
    }

    pub fn listing(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Listing {
            path: path.into(),
            source,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// True when this error only reports that some other member aborted the pool
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Exit code the process should use when this error ends the run
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Aborted(fatal) => fatal.exit_code,
            _ => FAILURE_EXIT_CODE,
        }
    }
}

/// Renders an error together with its chain of sources on one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}

/// Strips trailing separators from a root path, keeping a bare root intact. Works on the raw
/// bytes of the path, so names that are not valid UTF-8 survive unchanged.
#[cfg(unix)]
pub fn normalize_root(original: &Path) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let bytes = original.as_os_str().as_bytes();
    match bytes.iter().rposition(|&b| b != b'/') {
        Some(last) => PathBuf::from(OsStr::from_bytes(&bytes[..=last])),
        None if bytes.is_empty() => PathBuf::new(),
        None => PathBuf::from("/"),
    }
}

#[cfg(not(unix))]
pub fn normalize_root(original: &Path) -> PathBuf {
    let Some(text) = original.to_str() else {
        return original.to_path_buf();
    };
    let trimmed = text.trim_end_matches(std::path::is_separator);
    if trimmed.is_empty() && !text.is_empty() {
        PathBuf::from(std::path::MAIN_SEPARATOR.to_string())
    } else {
        PathBuf::from(trimmed)
    }
}
