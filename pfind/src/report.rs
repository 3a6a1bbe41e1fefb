//! Standard output side channel for matches and diagnostics.
//!
//! Every pool member reports matches as it finds them, so implementations must be `Sync`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::matcher::FileFacts;
use crate::results::CrawlResult;

/// Receives the user-visible lines produced during a run
pub trait Reporter: Sync {
    /// A visited file satisfied the criteria
    fn matched(&self, path: &Path, facts: &FileFacts);

    /// A top-level entry was neither crawled nor counted
    fn skipped(&self, path: &Path);

    /// Free-form notice such as the non-parallel warning
    fn notice(&self, message: &str);
}

/// Writes one line per event to stdout.
///
/// The first failed write is remembered and every later line is dropped; `finish` reports
/// that failure (typically `BrokenPipe` when the reader went away) instead of the summary.
pub struct ConsoleReporter<W = io::Stdout> {
    out: Mutex<W>,
    human_readable: bool,
    failure: Mutex<Option<io::ErrorKind>>,
}

impl ConsoleReporter {
    pub fn new(human_readable: bool) -> Self {
        Self::with_writer(io::stdout(), human_readable)
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn with_writer(out: W, human_readable: bool) -> Self {
        Self {
            out: Mutex::new(out),
            human_readable,
            failure: Mutex::new(None),
        }
    }

    /// Writes the final `matches/entries` line, or returns the first earlier write failure
    pub fn finish(&self, totals: &CrawlResult) -> io::Result<()> {
        let failed = *lock(&self.failure);
        if let Some(kind) = failed {
            return Err(io::Error::from(kind));
        }

        let mut out = lock(&self.out);
        writeln!(out, "{}", totals)?;
        out.flush()
    }

    fn emit(&self, line: &str) {
        let mut failure = lock(&self.failure);
        if failure.is_some() {
            return;
        }

        if let Err(e) = writeln!(lock(&self.out), "{}", line) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                debug!("Output closed, dropping further lines");
            } else {
                warn!("Cannot write to output: {}", e);
            }
            *failure = Some(e.kind());
        }
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn matched(&self, path: &Path, facts: &FileFacts) {
        self.emit(&format_match_line(path, facts, self.human_readable));
    }

    fn skipped(&self, path: &Path) {
        self.emit(&format_skip_line(path));
    }

    fn notice(&self, message: &str) {
        self.emit(message);
    }
}

/// Keeps everything in memory; used by tests and benchmarks
#[derive(Debug, Default)]
pub struct CollectingReporter {
    matched: Mutex<Vec<PathBuf>>,
    skipped: Mutex<Vec<PathBuf>>,
    notices: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn matched_paths(&self) -> Vec<PathBuf> {
        lock(&self.matched).clone()
    }

    pub fn skipped_paths(&self) -> Vec<PathBuf> {
        lock(&self.skipped).clone()
    }

    pub fn notices(&self) -> Vec<String> {
        lock(&self.notices).clone()
    }
}

impl Reporter for CollectingReporter {
    fn matched(&self, path: &Path, _facts: &FileFacts) {
        lock(&self.matched).push(path.to_path_buf());
    }

    fn skipped(&self, path: &Path) {
        lock(&self.skipped).push(path.to_path_buf());
    }

    fn notice(&self, message: &str) {
        lock(&self.notices).push(message.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `<path> [<size>, modified <time>]`
pub fn format_match_line(path: &Path, facts: &FileFacts, human_readable: bool) -> String {
    let size = if human_readable {
        format_size(facts.size)
    } else {
        facts.size.to_string()
    };
    match facts.modified {
        Some(modified) => format!(
            "{} [{}, modified {}]",
            path.display(),
            size,
            humantime::format_rfc3339_seconds(modified)
        ),
        None => format!("{} [{}]", path.display(), size),
    }
}

pub fn format_skip_line(path: &Path) -> String {
    format!("Not sure what to do about {}", path.display())
}

/// Formats a byte count the way `du -h` does: 512, 1.5K, 20M, ...
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["K", "M", "G", "T", "P", "E"];

    if bytes < 1024 {
        return bytes.to_string();
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value < 10.0 {
        format!("{:.1}{}", value, UNITS[unit])
    } else {
        format!("{:.0}{}", value, UNITS[unit])
    }
}
