/// In-process message-passing runtime for a fixed pool of cooperating members.
///
/// A `ProcessPool` of size N runs one closure on each of N dedicated threads. Each thread is
/// a *pool member* identified by its rank; rank 0 is the coordinator. Members never share
/// mutable state directly, they only meet in collective operations on their
/// `Communicator`:
///
/// - `barrier` blocks until every member has arrived
/// - `broadcast` delivers one value from the origin rank to every member
/// - `all_gather` exchanges one `CrawlResult` per member
/// - `abort_all` tears the whole pool down
///
/// ```text
///  rank 0 (coordinator)          rank 1..N (workers)
///      |                               |
///      |---- broadcast(Crawl) -------->|
///      |  execute(Some(dir))           |  execute(None)
///      |<------- all_gather ---------->|
///      |            ...                |
///      |---- broadcast(Shutdown) ----->|
///      |                               x  (member returns)
/// ```
///
/// Correctness relies on every member reaching the same collectives in the same order.
/// When one member fails, `abort_all` records a `FatalError` and every blocked or future
/// collective returns `FindError::Aborted`, so no member is left waiting forever.
mod communicator;
pub(crate) mod queue;
mod rendezvous;

pub use communicator::Communicator;

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

use crate::errors::{error_chain, FatalError, FindError, FindResult, FAILURE_EXIT_CODE};
use crate::metrics::PoolMetrics;
use crate::results::CrawlResult;
use queue::WorkQueue;
use rendezvous::Rendezvous;

/// Rank of the member that enumerates the root and aggregates results
pub const COORDINATOR_RANK: usize = 0;

/// Control messages broadcast by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Every member joins the next crawl
    Crawl,
    /// Every member stops
    Shutdown,
}

/// A member's fixed role, derived from its rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    Coordinator,
    Worker,
}

impl ProcessRole {
    pub fn for_rank(rank: usize) -> Self {
        if rank == COORDINATOR_RANK {
            ProcessRole::Coordinator
        } else {
            ProcessRole::Worker
        }
    }
}

/// State every member of one pool refers to
#[derive(Debug)]
pub(crate) struct PoolShared {
    size: usize,
    rendezvous: Rendezvous,
    signal_slot: Mutex<Option<Signal>>,
    result_slots: Mutex<Vec<CrawlResult>>,
    work: WorkQueue,
    metrics: PoolMetrics,
}

impl PoolShared {
    fn new(size: usize) -> Self {
        Self {
            size,
            rendezvous: Rendezvous::new(size),
            signal_slot: Mutex::new(None),
            result_slots: Mutex::new(vec![CrawlResult::new(); size]),
            work: WorkQueue::new(),
            metrics: PoolMetrics::new(),
        }
    }

    fn abort(&self, fatal: FatalError) -> bool {
        let first = self.rendezvous.abort(fatal.clone());
        if first {
            error!(rank = fatal.rank, exit_code = fatal.exit_code, "{}", fatal);
        }
        first
    }
}

/// Aborts a running pool from outside it, e.g. from a Ctrl-C handler
#[derive(Debug, Clone)]
pub struct AbortHandle {
    shared: Arc<PoolShared>,
}

impl AbortHandle {
    /// Aborts the pool on behalf of `rank`. Returns false if it was already aborted.
    pub fn abort(&self, rank: usize, exit_code: i32, reason: impl Into<String>) -> bool {
        self.shared
            .abort(FatalError::new(rank, exit_code, reason))
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.rendezvous.is_aborted()
    }
}

/// A fixed pool of cooperating members, one thread per rank
pub struct ProcessPool {
    threads: ThreadPool,
    shared: Arc<PoolShared>,
}

impl ProcessPool {
    /// Starts `size` member threads
    pub fn new(size: NonZeroUsize) -> FindResult<Self> {
        let threads = ThreadPoolBuilder::new()
            .num_threads(size.get())
            .thread_name(|rank| format!("pfind-rank-{}", rank))
            .build()?;

        Ok(Self {
            threads,
            shared: Arc::new(PoolShared::new(size.get())),
        })
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.shared.metrics
    }

    /// Runs `member` once on every rank and returns the coordinator's value.
    ///
    /// A member that returns an error (other than `Aborted`) or panics aborts the whole pool;
    /// in that case the `FatalError` is returned and any values are discarded.
    pub fn run<F, R>(&self, member: F) -> FindResult<R>
    where
        F: Fn(&Communicator) -> FindResult<Option<R>> + Sync,
        R: Send,
    {
        let mut outcomes = self.threads.broadcast(|ctx| {
            let comm = Communicator::new(ctx.index(), Arc::clone(&self.shared));
            debug!(rank = comm.rank(), size = comm.size(), "Rank checking in");

            match panic::catch_unwind(AssertUnwindSafe(|| member(&comm))) {
                Ok(Ok(value)) => value,
                Ok(Err(e)) if e.is_abort() => None,
                Ok(Err(e)) => {
                    comm.abort_all(FAILURE_EXIT_CODE, error_chain(&e));
                    None
                }
                Err(payload) => {
                    let reason = format!("panicked: {}", panic_message(payload.as_ref()));
                    comm.abort_all(FAILURE_EXIT_CODE, reason);
                    None
                }
            }
        });

        if let Some(fatal) = self.shared.rendezvous.fatal() {
            return Err(FindError::Aborted(fatal));
        }

        outcomes
            .get_mut(COORDINATOR_RANK)
            .and_then(Option::take)
            .ok_or_else(|| FindError::protocol("coordinator finished without a result"))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock_slot<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(size: usize) -> ProcessPool {
        ProcessPool::new(NonZeroUsize::new(size).unwrap()).unwrap()
    }

    #[test]
    fn test_roles() {
        assert_eq!(ProcessRole::for_rank(0), ProcessRole::Coordinator);
        assert_eq!(ProcessRole::for_rank(1), ProcessRole::Worker);
        assert_eq!(ProcessRole::for_rank(7), ProcessRole::Worker);
    }

    #[test]
    fn test_every_rank_runs_once() {
        let pool = pool(4);
        let seen = Mutex::new(Vec::new());

        let size = pool
            .run(|comm| {
                seen.lock().unwrap().push(comm.rank());
                Ok(comm.is_coordinator().then(|| comm.size()))
            })
            .unwrap();

        assert_eq!(size, 4);
        let mut ranks = seen.into_inner().unwrap();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_broadcast_reaches_every_member() {
        let pool = pool(3);
        let received = AtomicUsize::new(0);

        pool.run(|comm| {
            let outgoing = comm.is_coordinator().then_some(Signal::Crawl);
            let first = comm.broadcast(outgoing, COORDINATOR_RANK)?;
            assert_eq!(first, Signal::Crawl);

            let outgoing = comm.is_coordinator().then_some(Signal::Shutdown);
            let second = comm.broadcast(outgoing, COORDINATOR_RANK)?;
            assert_eq!(second, Signal::Shutdown);

            received.fetch_add(1, Ordering::SeqCst);
            Ok(comm.is_coordinator().then_some(()))
        })
        .unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_all_gather_orders_by_rank() {
        let pool = pool(3);

        let gathered = pool
            .run(|comm| {
                let local = CrawlResult {
                    entries: comm.rank() as u64 + 1,
                    matches: comm.rank() as u64,
                };
                let all = comm.all_gather(local)?;
                assert_eq!(all.len(), 3);
                Ok(comm.is_coordinator().then_some(all))
            })
            .unwrap();

        assert_eq!(
            gathered,
            vec![
                CrawlResult {
                    entries: 1,
                    matches: 0
                },
                CrawlResult {
                    entries: 2,
                    matches: 1
                },
                CrawlResult {
                    entries: 3,
                    matches: 2
                },
            ]
        );
    }

    #[test]
    fn test_member_error_aborts_pool() {
        let pool = pool(3);

        let result: FindResult<()> = pool.run(|comm| {
            if comm.rank() == 2 {
                return Err(FindError::config_error("rank two gave up"));
            }
            // Would block forever without the abort
            comm.barrier()?;
            Ok(Some(()))
        });

        match result {
            Err(FindError::Aborted(fatal)) => {
                assert_eq!(fatal.rank, 2);
                assert_eq!(fatal.exit_code, FAILURE_EXIT_CODE);
                assert!(fatal.reason.contains("rank two gave up"));
            }
            other => panic!("expected abort, got {:?}", other.map(|_| ())),
        }
        assert!(pool.abort_handle().is_aborted());
    }

    #[test]
    fn test_member_panic_aborts_pool() {
        let pool = pool(2);

        let result: FindResult<()> = pool.run(|comm| {
            if comm.rank() == 1 {
                panic!("worker exploded");
            }
            comm.barrier()?;
            Ok(Some(()))
        });

        match result {
            Err(FindError::Aborted(fatal)) => {
                assert_eq!(fatal.rank, 1);
                assert!(fatal.reason.contains("worker exploded"));
            }
            other => panic!("expected abort, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_external_abort_handle() {
        let pool = pool(2);
        let handle = pool.abort_handle();

        let result: FindResult<()> = pool.run(|comm| {
            if comm.is_coordinator() {
                assert!(handle.abort(comm.rank(), 130, "interrupted"));
            }
            comm.barrier()?;
            comm.barrier()?;
            Ok(Some(()))
        });

        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 130);
    }
}
