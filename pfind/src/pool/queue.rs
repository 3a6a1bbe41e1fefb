//! Shared directory queue used by `ParallelWalk`.
//!
//! Directories waiting to be read are sent through an unbounded channel. `pending` counts
//! directories that are queued or currently being read, so a crawl is finished exactly when
//! `pending` drops to zero.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct WorkQueue {
    sender: Sender<PathBuf>,
    receiver: Receiver<PathBuf>,
    pending: AtomicUsize,
}

impl WorkQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: AtomicUsize::new(0),
        }
    }

    /// Adds a directory. `pending` is raised before the send so no member can observe a
    /// drained queue while the directory is in flight.
    pub(crate) fn push(&self, dir: PathBuf) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // Both ends live in the same struct, so the channel cannot be disconnected
        let _ = self.sender.send(dir);
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<PathBuf> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// True when no directory is queued or being read
    pub(crate) fn is_drained(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    fn complete(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// RAII guard marking one dequeued directory as finished when dropped
pub(crate) struct WorkGuard<'a> {
    queue: &'a WorkQueue,
}

impl<'a> WorkGuard<'a> {
    pub(crate) fn new(queue: &'a WorkQueue) -> Self {
        Self { queue }
    }
}

impl<'a> Drop for WorkGuard<'a> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}
