//! Chat session - the aggregate root of one visitor's conversation
//!
//! `ChatSession` is synchronous: every operation validates the current state,
//! appends at most one system/bot/agent message, advances the FSM and reports
//! what the caller has to schedule next in a [`Step`]. Timers and delivery
//! live in [`crate::engine`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use support_core::{Agent, Attachment, Category, DeliveryStatus, EngineConfig, Message, SessionTexts};
use support_state::{SessionEvent, SessionState, StateMachine, StateTransition};
use tokio::time::Instant;
use uuid::Uuid;

use crate::catalog::ResponseCatalog;
use crate::error::{EngineError, Result};
use crate::scorer::{EscalationScorer, ScoreContext, Verdict};

/// Catalog, scoring rule and texts shared by every session of an engine.
#[derive(Debug, Clone, Default)]
pub struct Playbook {
    pub catalog: ResponseCatalog,
    pub scorer: EscalationScorer,
    pub texts: SessionTexts,
}

impl Playbook {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            catalog: ResponseCatalog::from_config(config),
            scorer: EscalationScorer::new(config.escalation.clone()),
            texts: config.texts.clone(),
        }
    }

    fn welcome(&self) -> Message {
        let mut options = self.catalog.menu_options();
        options.push(self.texts.human_option.clone());
        Message::bot_menu(self.texts.welcome.clone(), options)
    }
}

/// Work the engine has to schedule after a session operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    /// Ask the transfer desk to accept the visitor.
    AwaitTransferAck,
    /// Start the queue countdown.
    StartQueue { position: u32 },
    /// Let the live agent answer after the typing delay.
    AgentReply,
}

/// Outcome of one session operation.
#[derive(Debug, Clone, Default)]
pub struct Step {
    /// Messages appended to the transcript, in order.
    pub messages: Vec<Message>,
    /// State transitions that changed the state.
    pub transitions: Vec<StateTransition>,
    /// New queue position, if it changed.
    pub queue_position: Option<u32>,
    pub follow_up: Option<FollowUp>,
    /// Keyword category the bot answered, if any.
    pub matched_category: Option<Category>,
}

impl Step {
    pub fn is_noop(&self) -> bool {
        self.messages.is_empty() && self.transitions.is_empty() && self.queue_position.is_none()
    }
}

/// Read-only copy of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: SessionState,
    pub transcript: Vec<Message>,
    pub escalation_score: f64,
    pub queue_position: Option<u32>,
    pub assigned_agent: Option<Agent>,
    pub started_at: DateTime<Utc>,
    pub last_user_message_text: Option<String>,
    pub user_message_count: u32,
    /// Most recent transitions, oldest first.
    pub history: Vec<StateTransition>,
}

pub struct ChatSession {
    id: Uuid,
    playbook: Arc<Playbook>,
    machine: StateMachine,
    transcript: Vec<Message>,
    escalation_score: f64,
    queue_position: Option<u32>,
    assigned_agent: Option<Agent>,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    last_user_message_text: Option<String>,
    user_message_count: u32,
    agent_turns: usize,
}

impl ChatSession {
    pub fn new(id: Uuid, playbook: Arc<Playbook>) -> Self {
        Self {
            id,
            playbook,
            machine: StateMachine::new(),
            transcript: Vec::new(),
            escalation_score: 0.0,
            queue_position: None,
            assigned_agent: None,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            last_user_message_text: None,
            user_message_count: 0,
            agent_turns: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn escalation_score(&self) -> f64 {
        self.escalation_score
    }

    pub fn queue_position(&self) -> Option<u32> {
        self.queue_position
    }

    pub fn assigned_agent(&self) -> Option<&Agent> {
        self.assigned_agent.as_ref()
    }

    pub fn user_message_count(&self) -> u32 {
        self.user_message_count
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state(),
            transcript: self.transcript.clone(),
            escalation_score: self.escalation_score,
            queue_position: self.queue_position,
            assigned_agent: self.assigned_agent.clone(),
            started_at: self.started_at_utc,
            last_user_message_text: self.last_user_message_text.clone(),
            user_message_count: self.user_message_count,
            history: self.machine.history().to_vec(),
        }
    }

    fn append(&mut self, message: Message, step: &mut Step) {
        step.messages.push(message.clone());
        self.transcript.push(message);
    }

    /// Append the transition's message (if any), then advance the FSM.
    fn advance(&mut self, event: SessionEvent, message: Option<Message>, step: &mut Step) -> Result<()> {
        if !self.machine.can_transition(&event) {
            return Err(EngineError::invalid_state(event.name(), self.state()));
        }
        if let Some(message) = message {
            self.append(message, step);
        }
        let transition = self.machine.handle_event(event)?;
        if transition.changed {
            log::info!(
                "[{}] {} -> {} ({})",
                self.id,
                transition.from,
                transition.to,
                transition.event.name()
            );
            step.transitions.push(transition);
        }
        Ok(())
    }

    /// INITIAL -> BOT with the welcome menu.
    pub fn open(&mut self) -> Result<Step> {
        let mut step = Step::default();
        let welcome = self.playbook.welcome();
        self.advance(SessionEvent::SessionOpened, Some(welcome), &mut step)?;
        Ok(step)
    }

    /// Record a visitor message and react according to the current state.
    pub fn receive_user_message(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        now: Instant,
    ) -> Result<Step> {
        let mut step = Step::default();
        if !self.state().accepts_user_input() {
            return Err(EngineError::invalid_state("send a message", self.state()));
        }
        match self.state() {
            SessionState::Bot => self.triage(text, attachments, now, &mut step)?,
            state if state.is_escalating() => {
                // Recorded for the agent; no bot reply while waiting.
                self.user_message_count += 1;
                self.append(Message::user(text, attachments), &mut step);
            }
            _ => {
                self.user_message_count += 1;
                self.append(Message::user(text, attachments).tracked(), &mut step);
                self.advance(SessionEvent::UserMessageRelayed, None, &mut step)?;
                step.follow_up = Some(FollowUp::AgentReply);
            }
        }
        Ok(step)
    }

    fn triage(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        now: Instant,
        step: &mut Step,
    ) -> Result<()> {
        self.user_message_count += 1;
        self.append(Message::user(text, attachments), step);

        let playbook = Arc::clone(&self.playbook);
        let normalized = support_core::normalize(text);

        if playbook.scorer.is_transfer_request(text) {
            log::info!("[{}] Visitor asked for a human agent", self.id);
            self.last_user_message_text = Some(normalized);
            return self.begin_transfer(SessionEvent::TransferRequested, step);
        }

        let verdict = playbook.scorer.evaluate(
            &ScoreContext {
                current_score: self.escalation_score,
                previous_text: self.last_user_message_text.as_deref(),
                user_message_count: self.user_message_count,
                elapsed: now.saturating_duration_since(self.started_at),
            },
            text,
        );
        self.escalation_score += verdict.increment;
        if !normalized.is_empty() {
            self.last_user_message_text = Some(normalized);
        }
        log::debug!(
            "[{}] Scored +{:.2} (total {:.2}, matched {:?}, repeated {})",
            self.id,
            verdict.increment,
            self.escalation_score,
            verdict.matched,
            verdict.repeated
        );

        match verdict.verdict {
            Verdict::Escalate(reason) => {
                log::info!("[{}] Escalating: {:?}", self.id, reason);
                self.begin_transfer(SessionEvent::EscalationTriggered { reason }, step)
            }
            Verdict::Continue => {
                let (category, reply) = playbook.catalog.reply_for(text);
                step.matched_category = category;
                self.advance(SessionEvent::BotReplied, Some(Message::bot(reply)), step)
            }
        }
    }

    fn begin_transfer(&mut self, event: SessionEvent, step: &mut Step) -> Result<()> {
        let message = Message::system(self.playbook.texts.transferring.clone());
        self.advance(event, Some(message), step)?;
        step.follow_up = Some(FollowUp::AwaitTransferAck);
        Ok(())
    }

    /// Explicit request for a live agent. Idempotent once escalation started.
    pub fn request_transfer(&mut self) -> Result<Step> {
        let mut step = Step::default();
        match self.state() {
            SessionState::Bot => self.begin_transfer(SessionEvent::TransferRequested, &mut step)?,
            state if state.is_escalating() || state == SessionState::Connected => {
                log::debug!(
                    "[{}] Transfer already requested (state {})",
                    self.id,
                    self.state()
                );
            }
            state => return Err(EngineError::invalid_state("request a transfer", state)),
        }
        Ok(step)
    }

    /// Transfer desk accepted the visitor: TRANSFERRING -> QUEUING.
    pub fn acknowledge_transfer(&mut self, position: u32) -> Result<Step> {
        let mut step = Step::default();
        self.advance(SessionEvent::TransferAcknowledged { position }, None, &mut step)?;
        self.queue_position = Some(position);
        step.queue_position = Some(position);
        step.follow_up = Some(FollowUp::StartQueue { position });
        Ok(step)
    }

    /// Apply a countdown update. Positions that do not move forward are ignored.
    pub fn advance_queue(&mut self, position: u32) -> Result<Step> {
        let mut step = Step::default();
        if self.state() != SessionState::Queuing {
            return Err(EngineError::invalid_state("advance the queue", self.state()));
        }
        match self.queue_position {
            Some(current) if position >= current => {
                log::debug!(
                    "[{}] Ignoring queue position {} (current {})",
                    self.id,
                    position,
                    current
                );
            }
            _ => {
                self.queue_position = Some(position);
                step.queue_position = Some(position);
            }
        }
        Ok(step)
    }

    /// QUEUING -> CONNECTED with the assigned agent.
    pub fn assign_agent(&mut self, agent: Agent) -> Result<Step> {
        let mut step = Step::default();
        let message = Message::system(self.playbook.texts.connected_to(&agent.name));
        self.advance(
            SessionEvent::AgentAssigned {
                agent_name: agent.name.clone(),
            },
            Some(message),
            &mut step,
        )?;
        self.queue_position = None;
        self.assigned_agent = Some(agent);
        Ok(step)
    }

    /// Live agent answers; visitor messages already delivered count as read.
    pub fn agent_reply(&mut self) -> Result<Step> {
        let mut step = Step::default();
        if self.state() != SessionState::Connected {
            return Err(EngineError::invalid_state("reply as agent", self.state()));
        }
        let reply = Message::agent(self.playbook.texts.agent_reply(self.agent_turns));
        for message in self
            .transcript
            .iter_mut()
            .filter(|m| m.is_from_user() && m.delivery_status == Some(DeliveryStatus::Delivered))
        {
            message.advance_delivery(DeliveryStatus::Read);
        }
        self.advance(SessionEvent::AgentReplied, Some(reply), &mut step)?;
        self.agent_turns += 1;
        Ok(step)
    }

    /// Mark a tracked user message as delivered. Returns `true` when it changed.
    pub fn mark_delivered(&mut self, message_id: Uuid) -> bool {
        self.transcript
            .iter_mut()
            .find(|message| message.id == message_id)
            .is_some_and(|message| message.advance_delivery(DeliveryStatus::Delivered))
    }

    /// TRANSFERRING/QUEUING -> BOT with an error notice.
    pub fn fail_transfer(&mut self, error: &str) -> Result<Step> {
        let mut step = Step::default();
        let message = Message::system(self.playbook.texts.transfer_failed.clone());
        self.advance(
            SessionEvent::TransferFailed {
                error: error.to_string(),
            },
            Some(message),
            &mut step,
        )?;
        self.queue_position = None;
        Ok(step)
    }

    /// Any non-terminal state -> ENDED.
    pub fn end(&mut self) -> Result<Step> {
        let mut step = Step::default();
        if self.state().is_terminal() {
            return Ok(step);
        }
        let message = Message::system(self.playbook.texts.ended.clone());
        self.advance(SessionEvent::SessionEnded, Some(message), &mut step)?;
        self.assigned_agent = None;
        self.queue_position = None;
        self.escalation_score = 0.0;
        Ok(step)
    }
}
