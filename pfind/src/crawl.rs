/// Collective subtree crawling.
///
/// A crawl is performed jointly by every member of the pool: the coordinator names the
/// directory, every member calls `TreeCrawler::execute` at the same point in the protocol,
/// and each member returns the full list of per-member results.
///
/// What happens to each file is decided by a `FileVisitor`, injected into the crawler:
///
/// ```rust,ignore
/// let visitor = MatchCounter::new(&matcher, &reporter);
/// let mut crawler = ParallelWalk::new(&comm, visitor);
/// let per_member = crawler.execute(Some(Path::new("/data/projects")))?;
/// ```
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::errors::{FindError, FindResult};
use crate::matcher::FileMatcher;
use crate::pool::queue::WorkGuard;
use crate::pool::Communicator;
use crate::report::Reporter;
use crate::results::CrawlResult;
use crate::stat::lstat;

/// How long an idle member waits for a directory before re-checking for completion
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Per-file hook invoked by a crawler
pub trait FileVisitor {
    /// Called once for every non-directory object the crawl visits. `metadata` is the
    /// crawler's own `lstat` of `path`.
    fn on_file(&mut self, path: &Path, metadata: &Metadata);

    /// The counters accumulated so far
    fn result(&self) -> CrawlResult;
}

/// Collective crawl of one subtree
pub trait TreeCrawler {
    /// Must be called by every pool member for the same crawl. Only the coordinator's `path`
    /// is used. Returns one result per member, ordered by rank.
    fn execute(&mut self, path: Option<&Path>) -> FindResult<Vec<CrawlResult>>;
}

/// Counts visited files and the ones accepted by a `FileMatcher`
pub struct MatchCounter<'a> {
    matcher: &'a FileMatcher,
    reporter: &'a dyn Reporter,
    result: CrawlResult,
}

impl<'a> MatchCounter<'a> {
    pub fn new(matcher: &'a FileMatcher, reporter: &'a dyn Reporter) -> Self {
        Self {
            matcher,
            reporter,
            result: CrawlResult::new(),
        }
    }
}

impl FileVisitor for MatchCounter<'_> {
    fn on_file(&mut self, path: &Path, metadata: &Metadata) {
        let matched = self.matcher.check(path, metadata, self.reporter);
        self.result.record(matched);
    }

    fn result(&self) -> CrawlResult {
        self.result
    }
}

/// Work-sharing crawler: members pull directories from a pool-wide queue and push back the
/// subdirectories they find, until no directory is queued or being read.
pub struct ParallelWalk<'c, V> {
    comm: &'c Communicator,
    visitor: V,
}

impl<'c, V: FileVisitor> ParallelWalk<'c, V> {
    pub fn new(comm: &'c Communicator, visitor: V) -> Self {
        Self { comm, visitor }
    }

    fn walk(&mut self) -> FindResult<()> {
        let comm = self.comm;
        let queue = comm.work_queue();
        loop {
            comm.check_aborted()?;

            match queue.recv_timeout(IDLE_POLL) {
                Some(dir) => {
                    let _guard = WorkGuard::new(queue);
                    self.read_directory(&dir)?;
                }
                None if queue.is_drained() => return Ok(()),
                None => {}
            }
        }
    }

    fn read_directory(&mut self, dir: &Path) -> FindResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(rank = self.comm.rank(), path = %dir.display(), "Cannot read directory: {}", e);
                self.comm.metrics().record_unreadable_directory();
                return Ok(());
            }
        };
        self.comm.metrics().record_directory();
        trace!(rank = self.comm.rank(), path = %dir.display(), queued = self.comm.work_queue().len(), "Reading directory");

        let queue = self.comm.work_queue();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(rank = self.comm.rank(), path = %dir.display(), "Cannot read entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            let metadata = match lstat(&path) {
                Ok(metadata) => metadata,
                Err(FindError::Stat { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Entry vanished before stat");
                    self.comm.metrics().record_vanished_entry();
                    continue;
                }
                Err(e) => return Err(e),
            };

            if metadata.is_dir() {
                queue.push(path);
            } else {
                self.visitor.on_file(&path, &metadata);
            }
        }
        Ok(())
    }
}

impl<V: FileVisitor> TreeCrawler for ParallelWalk<'_, V> {
    fn execute(&mut self, path: Option<&Path>) -> FindResult<Vec<CrawlResult>> {
        if self.comm.is_coordinator() {
            let root = path.ok_or_else(|| {
                FindError::protocol("the coordinator must name the directory to crawl")
            })?;
            self.comm.work_queue().push(root.to_path_buf());
        }

        // Nobody starts walking before the seed is queued
        self.comm.barrier()?;
        self.walk()?;

        let local = self.visitor.result();
        debug!(rank = self.comm.rank(), entries = local.entries, matches = local.matches, "Crawl finished");
        self.comm.all_gather(local)
    }
}
