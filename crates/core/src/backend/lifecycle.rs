use std::mem;

use super::BackendHandle;

/// The release list of a run.
///
/// Every connection opened for a run is tracked here, and
/// [`close_all`](Self::close_all) closes each distinct connection exactly
/// once. Closing is best-effort: a failure is logged and the remaining
/// connections are still closed.
#[derive(Debug, Default)]
pub struct BackendLifecycle {
    handles: Vec<BackendHandle>,
}

impl BackendLifecycle {
    /// Starts tracking a connection. Tracking the same connection twice has
    /// no effect.
    pub fn track(&mut self, handle: BackendHandle) {
        if self.handles.iter().any(|h| h.same_connection(&handle)) {
            return;
        }
        trace!("tracking back-end connection: {}", handle.id());
        self.handles.push(handle);
    }

    /// Returns the number of connections not closed yet.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns whether all tracked connections have been closed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Closes every tracked connection, in the order they were opened.
    ///
    /// Returns the number of connections that failed to close.
    pub async fn close_all(&mut self) -> usize {
        let mut failures = 0;
        for handle in mem::take(&mut self.handles) {
            match handle.close().await {
                Ok(()) => debug!("closed back-end: {}", handle.id()),
                Err(err) => {
                    warn!("failed to close back-end {}: {err}", handle.id());
                    failures += 1;
                }
            }
        }
        failures
    }
}

impl Drop for BackendLifecycle {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            warn!(
                "{} back-end connection(s) dropped without being closed",
                self.handles.len()
            );
        }
    }
}
