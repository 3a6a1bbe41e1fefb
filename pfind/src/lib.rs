pub mod config;
pub mod coordination;
pub mod crawl;
pub mod errors;
pub mod matcher;
pub mod metrics;
pub mod pool;
pub mod report;
pub mod results;
pub mod stat;

pub use config::{FindConfig, MatchCriteria};
pub use coordination::CoordinationLoop;
pub use crawl::{FileVisitor, MatchCounter, ParallelWalk, TreeCrawler};
pub use errors::{FatalError, FindError, FindResult};
pub use matcher::{FileFacts, FileMatcher};
pub use pool::{AbortHandle, Communicator, ProcessPool, Signal};
pub use report::{CollectingReporter, ConsoleReporter, Reporter};
pub use results::CrawlResult;

use tracing::info;

/// Runs a complete search with a fresh pool of `config.pool_size()` members
pub fn find(config: &FindConfig, reporter: &dyn Reporter) -> FindResult<CrawlResult> {
    let pool = ProcessPool::new(config.pool_size())?;
    find_in(&pool, config, reporter)
}

/// Runs a complete search on an existing pool. Returns the totals, or the pool's
/// `FatalError` if any member aborted it.
pub fn find_in(
    pool: &ProcessPool,
    config: &FindConfig,
    reporter: &dyn Reporter,
) -> FindResult<CrawlResult> {
    info!(
        root = %config.root_path.display(),
        members = pool.size(),
        "Starting search"
    );
    let matcher = FileMatcher::new(config.criteria.clone());

    pool.run(|comm| {
        CoordinationLoop::new(comm, config, reporter)
            .run(|| ParallelWalk::new(comm, MatchCounter::new(&matcher, reporter)))
    })
}
