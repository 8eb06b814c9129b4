//! Support engine - session handles, scheduled tasks and event delivery
//!
//! A [`SessionHandle`] serializes every mutation through one mutex around the
//! [`ChatSession`]. The lock is never held across an `.await`: timers run as
//! tasks in the session's [`TaskSet`] and re-check their cancellation token
//! under the lock before touching the session, so a timer firing after
//! teardown is a no-op. Outbound messages are enqueued while the lock is held,
//! which keeps delivery order equal to transcript order. Subscriber callbacks
//! run without the session lock but inside the session's dispatch gate, which
//! teardown also holds: nothing reaches a subscriber after the closing message.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};

use futures::StreamExt;
use support_core::{Attachment, EngineConfig, Message, TimingConfig};
use support_state::{SessionState, StateTransition};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::{Collaborators, Notice, NoticeKind};
use crate::error::{EngineError, Result, TransferFailure};
use crate::outbound::{MessageQueue, MessageSink};
use crate::queue_simulator::{QueueSimulator, QueueUpdate};
use crate::session::{ChatSession, FollowUp, Playbook, SessionSnapshot, Step};
use crate::tasks::TaskSet;

pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(&StateTransition) + Send + Sync>;
pub type PositionCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Visitor input for [`SessionHandle::send_message`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

#[derive(Default)]
struct Subscribers {
    messages: RwLock<Vec<MessageCallback>>,
    states: RwLock<Vec<StateCallback>>,
    positions: RwLock<Vec<PositionCallback>>,
}

fn snapshot_of<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Re-entrant gate serializing subscriber dispatch against teardown.
///
/// Re-entrant per thread so a callback may call back into its own handle.
#[derive(Default)]
struct DispatchGate {
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

struct GateGuard<'a> {
    gate: &'a DispatchGate,
}

impl DispatchGate {
    fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match owner.as_mut() {
                None => {
                    *owner = Some((me, 1));
                    break;
                }
                Some((id, depth)) if *id == me => {
                    *depth += 1;
                    break;
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        GateGuard { gate: self }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self.gate.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, depth)) = owner.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *owner = None;
                self.gate.released.notify_one();
            }
        }
    }
}

struct SessionShared {
    id: Uuid,
    session: Mutex<ChatSession>,
    gate: DispatchGate,
    tasks: TaskSet,
    outbound: MessageQueue,
    subscribers: Subscribers,
    collaborators: Collaborators,
    timing: TimingConfig,
}

/// Delivers drained messages back into the session that queued them.
struct SessionSink {
    shared: Weak<SessionShared>,
}

impl MessageSink for SessionSink {
    fn deliver(&self, message: &Message) {
        if let Some(shared) = self.shared.upgrade() {
            shared.deliver(message);
        }
    }
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, ChatSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a session operation, enqueue its messages under the lock, then
    /// notify subscribers and schedule follow-up work.
    ///
    /// With a `guard` token the operation is skipped once the token is
    /// cancelled; timers pass their own token here.
    fn apply<F>(self: &Arc<Self>, guard: Option<&CancellationToken>, operation: F) -> Result<()>
    where
        F: FnOnce(&mut ChatSession) -> Result<Step>,
    {
        let step = {
            let mut session = self.lock();
            if guard.is_some_and(CancellationToken::is_cancelled) {
                log::debug!("[{}] Skipping update from a cancelled task", self.id);
                return Ok(());
            }
            let step = operation(&mut session)?;
            for message in &step.messages {
                self.outbound.enqueue(message.clone());
            }
            step
        };

        let _gate = self.gate.enter();
        if self.tasks.is_cancelled() {
            log::debug!("[{}] Session torn down, dropping notifications", self.id);
            return Ok(());
        }
        self.publish(&step);
        if let Some(follow_up) = step.follow_up {
            self.schedule(follow_up);
        }
        Ok(())
    }

    /// Hand a drained message to subscribers unless the session was torn down.
    fn deliver(&self, message: &Message) {
        let _gate = self.gate.enter();
        if self.tasks.is_cancelled() {
            log::debug!(
                "[{}] {}",
                self.id,
                EngineError::DeliveryDiscarded { count: 1 }
            );
            return;
        }

        let mut delivered = message.clone();
        if delivered.delivery_status.is_some() {
            delivered.advance_delivery(support_core::DeliveryStatus::Delivered);
            self.lock().mark_delivered(message.id);
        }
        self.dispatch(&delivered, true);
    }

    /// Call the presentation layer and message subscribers. Callers hold the gate.
    fn dispatch(&self, message: &Message, stop_on_teardown: bool) {
        self.collaborators.presentation.message_delivered(message);
        for callback in snapshot_of(&self.subscribers.messages) {
            if stop_on_teardown && self.tasks.is_cancelled() {
                return;
            }
            callback(message);
        }
    }

    fn publish(&self, step: &Step) {
        if !step.transitions.is_empty() {
            let callbacks = snapshot_of(&self.subscribers.states);
            for transition in &step.transitions {
                for callback in &callbacks {
                    callback(transition);
                }
            }
        }
        if let Some(position) = step.queue_position {
            for callback in snapshot_of(&self.subscribers.positions) {
                callback(position);
            }
        }
    }

    fn schedule(self: &Arc<Self>, follow_up: FollowUp) {
        match follow_up {
            FollowUp::AwaitTransferAck => self.schedule_transfer_ack(),
            FollowUp::StartQueue { position } => self.schedule_queue(position),
            FollowUp::AgentReply => self.schedule_agent_reply(),
        }
    }

    fn schedule_transfer_ack(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let desk = Arc::clone(&self.collaborators.transfer_desk);
        let delay = self.timing.transfer_ack();
        let id = self.id;

        self.tasks.spawn("transfer_ack", move |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = desk.acknowledge(id) => result,
            };
            let Some(shared) = weak.upgrade() else { return };
            match result {
                Ok(position) => {
                    if let Err(e) = shared.apply(Some(&token), |s| s.acknowledge_transfer(position)) {
                        log::debug!("[{}] Transfer acknowledgement ignored: {}", id, e);
                    }
                }
                Err(failure) => shared.fail_transfer(&token, failure),
            }
        });
    }

    fn schedule_queue(self: &Arc<Self>, position: u32) {
        let simulator = QueueSimulator::new(
            Arc::clone(&self.collaborators.directory),
            self.timing.queue_tick(),
        );
        let mut updates = simulator.start(position, &self.tasks);
        let weak = Arc::downgrade(self);
        let id = self.id;

        self.tasks.spawn("queue_watch", move |token| async move {
            loop {
                let update = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    update = updates.next() => update,
                };
                let Some(update) = update else { return };
                let Some(shared) = weak.upgrade() else { return };
                let terminal = update.is_terminal();
                let result = match update {
                    QueueUpdate::Position(position) => {
                        shared.apply(Some(&token), |s| s.advance_queue(position))
                    }
                    QueueUpdate::Assigned(agent) => {
                        shared.apply(Some(&token), |s| s.assign_agent(agent))
                    }
                    QueueUpdate::Failed(failure) => {
                        shared.fail_transfer(&token, failure);
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    log::debug!("[{}] Queue update ignored: {}", id, e);
                    return;
                }
                if terminal {
                    return;
                }
            }
        });
    }

    fn schedule_agent_reply(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let delay = self.timing.agent_typing();
        let id = self.id;

        self.tasks.spawn("agent_reply", move |token| async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let Some(shared) = weak.upgrade() else { return };
            if let Err(e) = shared.apply(Some(&token), ChatSession::agent_reply) {
                log::debug!("[{}] Agent reply dropped: {}", id, e);
            }
        });
    }

    /// Roll back to bot triage and tell the visitor.
    fn fail_transfer(self: &Arc<Self>, token: &CancellationToken, failure: TransferFailure) {
        if token.is_cancelled() {
            return;
        }
        log::warn!("[{}] {}", self.id, EngineError::from(failure.clone()));
        let error = failure.to_string();
        match self.apply(Some(token), |s| s.fail_transfer(&error)) {
            Ok(()) => self.collaborators.notifier.notify(Notice::new(
                self.id,
                NoticeKind::TransferFailed,
                error,
            )),
            Err(e) => log::debug!("[{}] Transfer rollback ignored: {}", self.id, e),
        }
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        log::debug!("[{}] Session dropped", self.id);
    }
}

/// Handle to one visitor's support session.
///
/// Cloning is cheap; dropping the last clone tears the session down and
/// cancels every pending task. All operations must run inside a Tokio runtime.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Called for every delivered message, in transcript order.
    ///
    /// Callbacks run on the delivering task and may call back into the handle.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.shared
            .subscribers
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.shared
            .subscribers
            .states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn on_queue_position<F>(&self, callback: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.shared
            .subscribers
            .positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// INITIAL -> BOT. Register subscribers before calling this to see the welcome message.
    pub fn open(&self) -> Result<()> {
        self.shared.apply(None, ChatSession::open)
    }

    /// Submit a visitor message. Rejected with `InvalidState` once the session ended.
    pub fn send_message(&self, message: impl Into<OutgoingMessage>) -> Result<()> {
        let OutgoingMessage { text, attachments } = message.into();
        let now = Instant::now();
        let result = self
            .shared
            .apply(None, |s| s.receive_user_message(&text, attachments, now));
        if let Err(e) = &result {
            log::warn!("[{}] Message rejected: {}", self.shared.id, e);
            self.shared.collaborators.notifier.notify(Notice::new(
                self.shared.id,
                NoticeKind::SendFailed,
                e.to_string(),
            ));
        }
        result
    }

    /// Ask for a live agent. Repeated requests while escalating are no-ops.
    pub fn request_transfer(&self) -> Result<()> {
        self.shared.apply(None, ChatSession::request_transfer)
    }

    /// End the session: cancel every pending task, drop queued deliveries,
    /// then append and deliver the closing message.
    pub fn end_session(&self) -> Result<()> {
        let shared = &self.shared;
        let _gate = shared.gate.enter();
        let step = {
            let mut session = shared.lock();
            if session.state().is_terminal() {
                return Ok(());
            }
            shared.tasks.cancel_all();
            shared.outbound.shutdown();
            session.end()?
        };

        for message in &step.messages {
            shared.dispatch(message, false);
        }
        shared.publish(&step);
        log::info!("[{}] Session ended", shared.id);
        Ok(())
    }

    /// Number of scheduled tasks still pending.
    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.active_count()
    }
}

/// Creates support sessions sharing one configuration and set of collaborators.
pub struct SupportEngine {
    playbook: Arc<Playbook>,
    timing: TimingConfig,
    collaborators: Collaborators,
}

impl SupportEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        Self {
            playbook: Arc::new(Playbook::from_config(&config)),
            timing: config.timing,
            collaborators,
        }
    }

    /// Engine with default collaborators for `config`.
    pub fn from_config(config: EngineConfig) -> Self {
        let collaborators = Collaborators::with_queue_position(config.initial_queue_position);
        Self::new(config, collaborators)
    }

    /// Create a session in INITIAL state without opening it.
    pub fn create_session(&self) -> SessionHandle {
        let id = Uuid::new_v4();
        let label = id.to_string();
        let tasks = TaskSet::new(label.clone());
        let queue_token = tasks.child_token();

        let shared = Arc::new_cyclic(|weak: &Weak<SessionShared>| {
            let sink: Arc<dyn MessageSink> = Arc::new(SessionSink {
                shared: weak.clone(),
            });
            SessionShared {
                id,
                session: Mutex::new(ChatSession::new(id, Arc::clone(&self.playbook))),
                gate: DispatchGate::default(),
                outbound: MessageQueue::new(label, self.timing.pacing(), sink, queue_token),
                tasks,
                subscribers: Subscribers::default(),
                collaborators: self.collaborators.clone(),
                timing: self.timing.clone(),
            }
        });

        log::info!("[{}] Session created", id);
        SessionHandle { shared }
    }

    /// Create a session and move it to bot triage.
    pub fn open_session(&self) -> Result<SessionHandle> {
        let handle = self.create_session();
        handle.open()?;
        Ok(handle)
    }
}

impl Default for SupportEngine {
    fn default() -> Self {
        Self::from_config(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use support_core::Author;

    fn engine() -> SupportEngine {
        SupportEngine::default()
    }

    fn record_messages(handle: &SessionHandle) -> Arc<Mutex<Vec<Message>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle.on_message(move |message| sink.lock().unwrap().push(message.clone()));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_welcome_delivered_to_early_subscriber() {
        let handle = engine().create_session();
        let seen = record_messages(&handle);
        handle.open().unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].author, Author::Bot);
        assert_eq!(handle.state(), SessionState::Bot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_before_open_is_rejected() {
        let handle = engine().create_session();
        let err = handle.send_message("hello").unwrap_err();
        assert!(err.is_invalid_state());
        assert!(handle.snapshot().transcript.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_tasks() {
        let handle = engine().open_session().unwrap();
        handle.request_transfer().unwrap();
        assert!(handle.pending_tasks() > 0);

        let weak = Arc::downgrade(&handle.shared);
        drop(handle);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_session_is_idempotent() {
        let handle = engine().open_session().unwrap();
        handle.end_session().unwrap();
        handle.end_session().unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Ended);
        assert_eq!(
            snapshot
                .transcript
                .iter()
                .filter(|m| m.author == Author::System)
                .count(),
            1
        );
    }
}
