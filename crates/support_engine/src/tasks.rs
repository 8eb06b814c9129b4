//! Session-owned scheduled tasks
//!
//! Every timer a session starts (pacing, queue ticks, agent typing, transfer
//! acknowledgement) is spawned through a [`TaskSet`] so teardown can cancel
//! all of them at once.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TaskSet {
    label: String,
    root: CancellationToken,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TaskSet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            root: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Child token that is cancelled together with the set.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Spawn a task that receives its own child token and retain its handle.
    ///
    /// Tasks spawned after cancellation receive an already cancelled token.
    pub fn spawn<F, Fut>(&self, name: &'static str, task: F) -> CancellationToken
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.root.child_token();
        let handle = tokio::spawn(task(token.clone()));
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|(_, handle)| !handle.is_finished());
        handles.push((name, handle));
        log::debug!(
            "[{}] Spawned task {} ({} active)",
            self.label,
            name,
            handles.len()
        );
        token
    }

    /// Number of retained tasks that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Cancel every outstanding task.
    ///
    /// Tokens are cancelled first so tasks observe cancellation at their next
    /// check; handles are then aborted so nothing outlives the session.
    pub fn cancel_all(&self) {
        self.root.cancel();
        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut aborted = 0usize;
        for (name, handle) in handles {
            if !handle.is_finished() {
                log::debug!("[{}] Cancelling task {}", self.label, name);
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            log::info!("[{}] Cancelled {} pending task(s)", self.label, aborted);
        }
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
