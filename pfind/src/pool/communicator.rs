use std::sync::Arc;
use tracing::trace;

use super::queue::WorkQueue;
use super::{lock_slot, PoolShared, ProcessRole, Signal, COORDINATOR_RANK};
use crate::errors::{FatalError, FindError, FindResult};
use crate::metrics::PoolMetrics;
use crate::results::CrawlResult;

/// One member's handle on its pool
#[derive(Debug, Clone)]
pub struct Communicator {
    rank: usize,
    shared: Arc<PoolShared>,
}

impl Communicator {
    pub(crate) fn new(rank: usize, shared: Arc<PoolShared>) -> Self {
        Self { rank, shared }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of members in the pool
    pub fn size(&self) -> usize {
        self.shared.size
    }

    pub fn role(&self) -> ProcessRole {
        ProcessRole::for_rank(self.rank)
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR_RANK
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.shared.metrics
    }

    pub(crate) fn work_queue(&self) -> &WorkQueue {
        &self.shared.work
    }

    /// Blocks until every member has called `barrier`
    pub fn barrier(&self) -> FindResult<()> {
        self.shared.rendezvous.wait()
    }

    /// Collective broadcast of `value` from `origin`.
    ///
    /// The origin must pass `Some`; every other member's argument is ignored. No member
    /// returns before all members have read the signal.
    pub fn broadcast(&self, value: Option<Signal>, origin: usize) -> FindResult<Signal> {
        if self.rank == origin {
            let signal = value.ok_or_else(|| {
                FindError::protocol(format!("rank {} must supply the broadcast value", origin))
            })?;
            *lock_slot(&self.shared.signal_slot) = Some(signal);
        }

        // Value is published before the first rendezvous and read before the second,
        // so the origin cannot overwrite it while a member is still reading.
        self.barrier()?;
        let received = *lock_slot(&self.shared.signal_slot);
        self.barrier()?;

        let signal = received
            .ok_or_else(|| FindError::protocol("broadcast completed without a value"))?;
        trace!(rank = self.rank, ?signal, "Broadcast received");
        Ok(signal)
    }

    /// Collective exchange: every member contributes `local` and receives all results
    /// ordered by rank.
    pub fn all_gather(&self, local: CrawlResult) -> FindResult<Vec<CrawlResult>> {
        lock_slot(&self.shared.result_slots)[self.rank] = local;
        self.barrier()?;
        let all = lock_slot(&self.shared.result_slots).clone();
        self.barrier()?;
        Ok(all)
    }

    /// Aborts every member of the pool. Only the first abort is recorded.
    pub fn abort_all(&self, exit_code: i32, reason: impl Into<String>) -> bool {
        self.shared
            .abort(FatalError::new(self.rank, exit_code, reason))
    }

    /// Returns `Err(Aborted)` once the pool has been aborted
    pub fn check_aborted(&self) -> FindResult<()> {
        self.shared.rendezvous.check()
    }
}
