/// The coordinator and worker sides of a pfind run.
///
/// Every pool member runs a `CoordinationLoop`. Its behaviour depends on the member's role:
///
/// - The **coordinator** (rank 0) lists the immediate children of the root. Each
///   subdirectory is announced with `Signal::Crawl` and then crawled collectively; the
///   per-member results are folded into the running totals. Anything that is not a
///   directory is reported as skipped. `Signal::Shutdown` is broadcast exactly once at the
///   end, even when the root holds no directories at all.
/// - A **worker** waits for signals. Each `Crawl` makes it join exactly one collective crawl,
///   whose result it discards. `Shutdown` ends the loop.
///
/// A crawler is created per crawl, so every member starts each subtree with fresh counters.
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use crate::config::FindConfig;
use crate::crawl::TreeCrawler;
use crate::errors::{normalize_root, FindError, FindResult};
use crate::pool::{Communicator, ProcessRole, Signal, COORDINATOR_RANK};
use crate::report::Reporter;
use crate::results::CrawlResult;
use crate::stat::lstat;

pub const NON_PARALLEL_WARNING: [&str; 2] = [
    "WARNING: Running in non-parallel mode.",
    "Did you mean to request more processes (-j)?",
];

pub struct CoordinationLoop<'a> {
    comm: &'a Communicator,
    config: &'a FindConfig,
    reporter: &'a dyn Reporter,
}

impl<'a> CoordinationLoop<'a> {
    pub fn new(comm: &'a Communicator, config: &'a FindConfig, reporter: &'a dyn Reporter) -> Self {
        Self {
            comm,
            config,
            reporter,
        }
    }

    /// Runs this member's side of the protocol. Returns the totals on the coordinator and
    /// `None` on workers.
    pub fn run<F, C>(&self, make_crawler: F) -> FindResult<Option<CrawlResult>>
    where
        F: FnMut() -> C,
        C: TreeCrawler,
    {
        match self.comm.role() {
            ProcessRole::Coordinator => self.coordinate(make_crawler).map(Some),
            ProcessRole::Worker => self.work(make_crawler).map(|()| None),
        }
    }

    fn coordinate<F, C>(&self, mut make_crawler: F) -> FindResult<CrawlResult>
    where
        F: FnMut() -> C,
        C: TreeCrawler,
    {
        if self.comm.size() == 1 && !self.config.criteria.silent {
            for line in NON_PARALLEL_WARNING {
                self.reporter.notice(line);
            }
        }

        let root = normalize_root(&self.config.root_path);
        let children =
            fs::read_dir(&root).map_err(|e| FindError::listing(root.clone(), e))?;

        let mut totals = CrawlResult::new();
        for child in children {
            let path = child.map_err(|e| FindError::listing(root.clone(), e))?.path();

            let metadata = match lstat(&path) {
                Ok(metadata) => metadata,
                Err(FindError::Stat { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Top-level entry vanished before stat");
                    self.comm.metrics().record_vanished_entry();
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !metadata.is_dir() {
                self.reporter.skipped(&path);
                continue;
            }

            self.comm.broadcast(Some(Signal::Crawl), COORDINATOR_RANK)?;
            self.comm.metrics().record_crawl();
            let per_member = make_crawler().execute(Some(&path))?;
            let subtree = CrawlResult::fold(&per_member);
            totals.absorb(subtree);
            debug!("{} in {}", subtree, path.display());
        }

        self.comm.broadcast(Some(Signal::Shutdown), COORDINATOR_RANK)?;
        info!(matches = totals.matches, entries = totals.entries, "Search complete");
        self.comm.metrics().log_stats();
        Ok(totals)
    }

    fn work<F, C>(&self, mut make_crawler: F) -> FindResult<()>
    where
        F: FnMut() -> C,
        C: TreeCrawler,
    {
        loop {
            match self.comm.broadcast(None, COORDINATOR_RANK)? {
                Signal::Crawl => {
                    make_crawler().execute(None)?;
                }
                Signal::Shutdown => {
                    debug!(rank = self.comm.rank(), "Shutdown received");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ProcessPool;
    use crate::report::CollectingReporter;
    use std::num::NonZeroUsize;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Reports one entry per file directly under the crawled directory, without recursing
    struct ShallowCrawler<'c> {
        comm: &'c Communicator,
        crawled: &'c Mutex<Vec<(usize, Option<PathBuf>)>>,
    }

    impl TreeCrawler for ShallowCrawler<'_> {
        fn execute(&mut self, path: Option<&Path>) -> FindResult<Vec<CrawlResult>> {
            self.crawled
                .lock()
                .unwrap()
                .push((self.comm.rank(), path.map(Path::to_path_buf)));

            let mut local = CrawlResult::new();
            if let Some(dir) = path {
                let entries = fs::read_dir(dir).map_err(|e| FindError::listing(dir, e))?;
                for entry in entries {
                    entry.map_err(|e| FindError::listing(dir, e))?;
                    local.record(true);
                }
            }
            self.comm.all_gather(local)
        }
    }

    fn run_loop(
        config: &FindConfig,
        reporter: &CollectingReporter,
        crawled: &Mutex<Vec<(usize, Option<PathBuf>)>>,
    ) -> FindResult<CrawlResult> {
        let pool = ProcessPool::new(config.pool_size())?;
        pool.run(|comm| {
            CoordinationLoop::new(comm, config, reporter)
                .run(|| ShallowCrawler { comm, crawled })
        })
    }

    fn config_for(root: &Path, size: usize) -> FindConfig {
        FindConfig {
            pool_size: NonZeroUsize::new(size),
            ..FindConfig::new(root)
        }
    }

    #[test]
    fn test_zero_directories_still_shuts_down() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lonely.txt"), "x").unwrap();
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        let totals = run_loop(&config_for(dir.path(), 3), &reporter, &crawled).unwrap();

        assert_eq!(totals.to_string(), "0/0");
        assert!(crawled.lock().unwrap().is_empty());
        assert_eq!(reporter.skipped_paths(), vec![dir.path().join("lonely.txt")]);
    }

    #[test]
    fn test_every_member_joins_each_crawl() {
        let dir = tempdir().unwrap();
        for sub in ["one", "two"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
            fs::write(dir.path().join(sub).join("f"), "x").unwrap();
        }
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        let totals = run_loop(&config_for(dir.path(), 3), &reporter, &crawled).unwrap();
        assert_eq!(totals.to_string(), "2/2");

        let crawled = crawled.into_inner().unwrap();
        assert_eq!(crawled.len(), 6);
        for (rank, path) in &crawled {
            assert_eq!(path.is_some(), *rank == COORDINATOR_RANK);
        }
    }

    #[test]
    fn test_single_member_warns() {
        let dir = tempdir().unwrap();
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        run_loop(&config_for(dir.path(), 1), &reporter, &crawled).unwrap();
        assert_eq!(reporter.notices(), NON_PARALLEL_WARNING.to_vec());
    }

    #[test]
    fn test_single_member_warning_silenced() {
        let dir = tempdir().unwrap();
        let mut config = config_for(dir.path(), 1);
        config.criteria.silent = true;
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        run_loop(&config, &reporter, &crawled).unwrap();
        assert!(reporter.notices().is_empty());
    }

    #[test]
    fn test_trailing_separator_is_stripped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();
        let root = format!("{}///", dir.path().display());
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        run_loop(&config_for(Path::new(&root), 2), &reporter, &crawled).unwrap();
        assert_eq!(reporter.skipped_paths(), vec![dir.path().join("file")]);
    }

    #[test]
    fn test_missing_root_aborts_pool() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        let err = run_loop(&config_for(&missing, 2), &reporter, &crawled).unwrap_err();
        match err {
            FindError::Aborted(fatal) => {
                assert_eq!(fatal.rank, COORDINATOR_RANK);
                assert!(fatal.reason.contains("cannot list"));
            }
            other => panic!("expected abort, got {:?}", other),
        }
        assert!(crawled.lock().unwrap().is_empty());
    }

    #[test]
    fn test_single_member_warns_before_listing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let reporter = CollectingReporter::new();
        let crawled = Mutex::new(Vec::new());

        let err = run_loop(&config_for(&missing, 1), &reporter, &crawled).unwrap_err();
        assert!(matches!(err, FindError::Aborted(_)));
        assert_eq!(reporter.notices(), NON_PARALLEL_WARNING.to_vec());
    }
}
