//! Queue simulator - wait-line countdown before an agent is assigned

use std::sync::Arc;
use std::time::Duration;

use support_core::Agent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::collaborators::AgentDirectory;
use crate::error::TransferFailure;
use crate::tasks::TaskSet;

const UPDATE_BUFFER: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum QueueUpdate {
    /// Position after a decrement.
    Position(u32),
    /// Countdown reached zero and the directory returned an agent.
    Assigned(Agent),
    /// The directory could not provide an agent.
    Failed(TransferFailure),
}

impl QueueUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Position(_))
    }
}

pub struct QueueSimulator {
    directory: Arc<dyn AgentDirectory>,
    tick: Duration,
}

impl QueueSimulator {
    pub fn new(directory: Arc<dyn AgentDirectory>, tick: Duration) -> Self {
        Self { directory, tick }
    }

    /// Start counting down from `initial_position`.
    ///
    /// Emits every position after a decrement, then exactly one terminal
    /// update. The countdown runs on `tasks`; once the set is cancelled the
    /// stream ends without further updates.
    pub fn start(&self, initial_position: u32, tasks: &TaskSet) -> ReceiverStream<QueueUpdate> {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let directory = Arc::clone(&self.directory);
        let tick = self.tick;

        tasks.spawn("queue_countdown", move |token| async move {
            let mut position = initial_position;
            while position > 0 {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(tick) => {}
                }
                position -= 1;
                if token.is_cancelled() || tx.send(QueueUpdate::Position(position)).await.is_err() {
                    return;
                }
            }

            let update = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = directory.assign_agent() => match result {
                    Ok(agent) => QueueUpdate::Assigned(agent),
                    Err(e) => QueueUpdate::Failed(TransferFailure::NoAgent(e.to_string())),
                },
            };
            if !token.is_cancelled() {
                let _ = tx.send(update).await;
            }
        });

        ReceiverStream::new(rx)
    }
}
