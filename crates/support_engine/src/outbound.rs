//! Message queue manager - paced, ordered, single-flight outbound delivery

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use support_core::Message;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Receives messages in delivery order.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: &Message);
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Message>,
    draining: bool,
    closed: bool,
    drain: Option<JoinHandle<()>>,
}

struct QueueInner {
    label: String,
    pacing: Duration,
    sink: Arc<dyn MessageSink>,
    cancel: CancellationToken,
    state: Mutex<QueueState>,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn discard_pending(&self, state: &mut QueueState) {
        let count = state.pending.len();
        state.pending.clear();
        if count > 0 {
            log::warn!(
                "[{}] {}",
                self.label,
                EngineError::DeliveryDiscarded { count }
            );
        }
    }
}

/// FIFO of outbound messages drained by at most one task at a time.
///
/// After each delivery the drain waits `pacing` before delivering the next
/// message, including after the last one, so consecutive deliveries are
/// never closer than `pacing` apart.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<QueueInner>,
}

impl MessageQueue {
    pub fn new(
        label: impl Into<String>,
        pacing: Duration,
        sink: Arc<dyn MessageSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                label: label.into(),
                pacing,
                sink,
                cancel,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Append a message and start a drain if none is running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, message: Message) {
        let mut state = self.inner.lock();
        if state.closed || self.inner.cancel.is_cancelled() {
            state.closed = true;
            log::debug!(
                "[{}] {}",
                self.inner.label,
                EngineError::DeliveryDiscarded { count: 1 }
            );
            return;
        }

        state.pending.push_back(message);
        if !state.draining {
            state.draining = true;
            let inner = Arc::clone(&self.inner);
            state.drain = Some(tokio::spawn(drain(inner)));
        }
    }

    /// Stop draining and drop everything still queued.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut state = self.inner.lock();
        state.closed = true;
        self.inner.discard_pending(&mut state);
        if let Some(handle) = state.drain.take() {
            handle.abort();
        }
        state.draining = false;
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }
}

async fn drain(inner: Arc<QueueInner>) {
    log::debug!("[{}] Drain started", inner.label);
    loop {
        let next = {
            let mut state = inner.lock();
            if inner.cancel.is_cancelled() {
                state.closed = true;
                state.draining = false;
                inner.discard_pending(&mut state);
                return;
            }
            match state.pending.pop_front() {
                Some(message) => message,
                None => {
                    state.draining = false;
                    log::debug!("[{}] Drain finished", inner.label);
                    return;
                }
            }
        };

        inner.sink.deliver(&next);

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => {
                let mut state = inner.lock();
                state.closed = true;
                state.draining = false;
                inner.discard_pending(&mut state);
                return;
            }
            _ = tokio::time::sleep(inner.pacing) => {}
        }
    }
}
