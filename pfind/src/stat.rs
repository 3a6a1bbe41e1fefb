//! `lstat` that survives interrupted system calls.
//!
//! Network filesystems occasionally fail a metadata call with `EINTR`. Those failures are
//! retried in place, without limit or backoff; every other failure is returned to the caller.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use tracing::trace;

use crate::errors::{FindError, FindResult};

/// Runs `op` until it either succeeds or fails with something other than `Interrupted`.
pub fn retry_on_interrupt<T, F>(mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("Interrupted system call, retrying");
                continue;
            }
            other => return other,
        }
    }
}

/// Fetches metadata without following symbolic links.
pub fn lstat(path: &Path) -> FindResult<Metadata> {
    retry_on_interrupt(|| fs::symlink_metadata(path)).map_err(|e| FindError::stat(path, e))
}
