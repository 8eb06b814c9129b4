//! End-to-end session flows on paused Tokio time

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use support_core::{
    Agent, Attachment, Author, DeliveryStatus, EngineConfig, Message, MessageKind, TimingConfig,
};
use support_engine::{
    Collaborators, Notice, NoticeKind, NotificationService, OutgoingMessage, PresentationLayer,
    SessionHandle, SessionState, StateTransition, StaticAgentDirectory, SupportEngine,
    TransferDesk, TransferFailure,
};
use uuid::Uuid;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything a session published to its subscribers.
#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<Message>>,
    transitions: Mutex<Vec<StateTransition>>,
    positions: Mutex<Vec<u32>>,
}

impl Recorder {
    fn attach(handle: &SessionHandle) -> Arc<Self> {
        let recorder = Arc::new(Self::default());

        let r = Arc::clone(&recorder);
        handle.on_message(move |message| r.messages.lock().unwrap().push(message.clone()));
        let r = Arc::clone(&recorder);
        handle.on_state_change(move |transition| {
            r.transitions.lock().unwrap().push(transition.clone())
        });
        let r = Arc::clone(&recorder);
        handle.on_queue_position(move |position| r.positions.lock().unwrap().push(position));

        recorder
    }

    fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    fn positions(&self) -> Vec<u32> {
        self.positions.lock().unwrap().clone()
    }

    fn states(&self) -> Vec<SessionState> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .map(|transition| transition.to)
            .collect()
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.messages.lock().unwrap().len(),
            self.transitions.lock().unwrap().len(),
            self.positions.lock().unwrap().len(),
        )
    }
}

#[derive(Default)]
struct CapturingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl NotificationService for CapturingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
struct CountingPresentation {
    delivered: Mutex<Vec<Message>>,
}

impl PresentationLayer for CountingPresentation {
    fn message_delivered(&self, message: &Message) {
        self.delivered.lock().unwrap().push(message.clone());
    }
}

struct RejectingDesk;

#[async_trait]
impl TransferDesk for RejectingDesk {
    async fn acknowledge(&self, _session_id: Uuid) -> Result<u32, TransferFailure> {
        Err(TransferFailure::NotAcknowledged("desk closed".to_string()))
    }
}

fn session(engine: &SupportEngine) -> (SessionHandle, Arc<Recorder>) {
    let handle = engine.create_session();
    let recorder = Recorder::attach(&handle);
    handle.open().unwrap();
    (handle, recorder)
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(30)).await;
}

async fn connect(handle: &SessionHandle) {
    handle.request_transfer().unwrap();
    settle().await;
    assert_eq!(handle.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_forgot_password_gets_canned_answer() {
    init_logging();
    let config = EngineConfig::default();
    let expected = config.catalog[0].answer.clone();
    let engine = SupportEngine::from_config(config);
    let (handle, recorder) = session(&engine);

    handle.send_message("忘记密码").unwrap();
    settle().await;

    assert_eq!(handle.state(), SessionState::Bot);
    let messages = recorder.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].kind, MessageKind::BotMenu);
    assert_eq!(messages[1].author, Author::User);
    assert_eq!(messages[2].author, Author::Bot);
    assert_eq!(messages[2].text, expected);
}

#[tokio::test(start_paused = true)]
async fn test_complex_keyword_bypasses_score() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, recorder) = session(&engine);
    assert_eq!(handle.snapshot().escalation_score, 0.0);

    handle.send_message("我要退款").unwrap();
    assert_eq!(handle.state(), SessionState::Transferring);

    settle().await;
    assert_eq!(
        recorder.states(),
        vec![
            SessionState::Bot,
            SessionState::Transferring,
            SessionState::Queuing,
            SessionState::Connected,
        ]
    );
    assert!(!recorder
        .messages()
        .iter()
        .any(|m| m.author == Author::Bot && m.kind == MessageKind::Text));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_unmatched_messages_escalate_on_threshold() {
    init_logging();
    let mut config = EngineConfig::default();
    config.escalation.repeat_question_count = 1;
    let engine = SupportEngine::from_config(config);
    let (handle, _recorder) = session(&engine);

    for _ in 0..3 {
        handle.send_message("hello?").unwrap();
        assert_eq!(handle.state(), SessionState::Bot);
    }
    assert!((handle.snapshot().escalation_score - 0.7).abs() < 1e-9);

    handle.send_message("hello?").unwrap();
    assert_eq!(handle.state(), SessionState::Transferring);
}

#[tokio::test(start_paused = true)]
async fn test_queue_countdown_connects_agent() {
    init_logging();
    let engine = SupportEngine::new(
        EngineConfig::default(),
        Collaborators::with_queue_position(3)
            .directory(Arc::new(StaticAgentDirectory::new(vec![Agent::new("Dana")]))),
    );
    let (handle, recorder) = session(&engine);

    handle.request_transfer().unwrap();
    // Acknowledgement at 800ms, then three 2s ticks.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(handle.state(), SessionState::Queuing);
    assert_eq!(handle.snapshot().queue_position, Some(3));

    tokio::time::sleep(Duration::from_millis(6_000)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Connected);
    assert_eq!(snapshot.assigned_agent.unwrap().name, "Dana");
    assert!(snapshot.queue_position.is_none());
    assert!(snapshot
        .transcript
        .iter()
        .any(|m| m.author == Author::System && m.text.contains("Dana")));
    assert_eq!(recorder.positions(), vec![3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_end_while_connected_silences_timers() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, recorder) = session(&engine);
    connect(&handle).await;

    // Agent reply is pending for 1.5s when the session ends.
    handle.send_message("are you there?").unwrap();
    handle.end_session().unwrap();
    let (messages, transitions, positions) = recorder.counts();

    settle().await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Ended);
    assert!(snapshot.assigned_agent.is_none());
    assert_eq!(recorder.counts(), (messages, transitions, positions));
    assert_eq!(
        recorder.messages().last().unwrap().text,
        EngineConfig::default().texts.ended
    );
    assert!(!snapshot.transcript.iter().any(|m| m.author == Author::Agent));
    assert_eq!(handle.pending_tasks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_transfer_requests_start_one_queue() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, recorder) = session(&engine);

    handle.request_transfer().unwrap();
    handle.request_transfer().unwrap();
    handle.send_message("转人工").unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;
    handle.request_transfer().unwrap();
    settle().await;

    assert_eq!(handle.state(), SessionState::Connected);
    assert_eq!(recorder.positions(), vec![3, 2, 1, 0]);
    let states = recorder.states();
    assert_eq!(
        states.iter().filter(|s| **s == SessionState::Queuing).count(),
        1
    );
    let system = recorder
        .messages()
        .iter()
        .filter(|m| m.author == Author::System)
        .count();
    // "transferring" and "connected".
    assert_eq!(system, 2);

    handle.request_transfer().unwrap();
    assert_eq!(handle.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_ended_session_rejects_input() {
    init_logging();
    let notifier = Arc::new(CapturingNotifier::default());
    let engine = SupportEngine::new(
        EngineConfig::default(),
        Collaborators::default().notifier(notifier.clone()),
    );
    let (handle, _recorder) = session(&engine);
    handle.end_session().unwrap();
    let before = handle.snapshot().transcript.len();

    let err = handle
        .send_message(OutgoingMessage::text("hello"))
        .unwrap_err();
    assert!(err.is_invalid_state());
    assert!(handle.request_transfer().unwrap_err().is_invalid_state());
    assert_eq!(handle.snapshot().transcript.len(), before);

    let notices = notifier.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::SendFailed);
}

#[tokio::test(start_paused = true)]
async fn test_score_never_decreases_during_triage() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, _recorder) = session(&engine);

    let mut last = 0.0;
    for text in ["hi", "my order", "hi", "", "payment", "hmm"] {
        handle.send_message(text).unwrap();
        let snapshot = handle.snapshot();
        assert!(snapshot.escalation_score >= last);
        last = snapshot.escalation_score;
        if snapshot.state != SessionState::Bot {
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_transfer_rolls_back_to_bot() {
    init_logging();
    let notifier = Arc::new(CapturingNotifier::default());
    let engine = SupportEngine::new(
        EngineConfig::default(),
        Collaborators::default()
            .transfer_desk(Arc::new(RejectingDesk))
            .notifier(notifier.clone()),
    );
    let (handle, recorder) = session(&engine);

    handle.request_transfer().unwrap();
    settle().await;

    assert_eq!(handle.state(), SessionState::Bot);
    assert_eq!(
        recorder.states(),
        vec![SessionState::Bot, SessionState::Transferring, SessionState::Bot]
    );
    let notices = notifier.notices.lock().unwrap().clone();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::TransferFailed);
    assert_eq!(notices[0].session_id, handle.id());

    // Triage keeps working after the rollback.
    handle.send_message("where is my order").unwrap();
    assert_eq!(handle.state(), SessionState::Bot);
}

#[tokio::test(start_paused = true)]
async fn test_empty_directory_rolls_back_from_queue() {
    init_logging();
    let notifier = Arc::new(CapturingNotifier::default());
    let engine = SupportEngine::new(
        EngineConfig::default(),
        Collaborators::with_queue_position(1)
            .directory(Arc::new(StaticAgentDirectory::new(Vec::new())))
            .notifier(notifier.clone()),
    );
    let (handle, recorder) = session(&engine);

    handle.request_transfer().unwrap();
    settle().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Bot);
    assert!(snapshot.queue_position.is_none());
    assert!(snapshot.assigned_agent.is_none());
    assert_eq!(recorder.positions(), vec![1, 0]);
    assert_eq!(
        snapshot.transcript.last().unwrap().text,
        EngineConfig::default().texts.transfer_failed
    );
    assert_eq!(notifier.notices.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_presentation_sees_every_delivery() {
    init_logging();
    let presentation = Arc::new(CountingPresentation::default());
    let engine = SupportEngine::new(
        EngineConfig::default(),
        Collaborators::default().presentation(presentation.clone()),
    );
    let (handle, recorder) = session(&engine);
    connect(&handle).await;

    handle.send_message("thanks").unwrap();
    settle().await;

    let delivered = presentation.delivered.lock().unwrap().clone();
    assert_eq!(delivered, recorder.messages());

    let user = delivered.iter().find(|m| m.text == "thanks").unwrap();
    assert_eq!(user.delivery_status, Some(DeliveryStatus::Delivered));
    assert_eq!(delivered.last().unwrap().author, Author::Agent);

    // The agent reply marks the visitor's message as read.
    let snapshot = handle.snapshot();
    let stored = snapshot.transcript.iter().find(|m| m.id == user.id).unwrap();
    assert_eq!(stored.delivery_status, Some(DeliveryStatus::Read));
}

#[tokio::test(start_paused = true)]
async fn test_deliveries_are_paced() {
    init_logging();
    let engine = SupportEngine::default();
    let handle = engine.create_session();
    let times = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&times);
    handle.on_message(move |_| t.lock().unwrap().push(tokio::time::Instant::now()));
    handle.open().unwrap();

    handle.send_message("忘记密码").unwrap();
    handle.send_message("订单").unwrap();
    settle().await;

    let times = times.lock().unwrap();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(600));
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_tears_down() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, recorder) = session(&engine);
    handle.request_transfer().unwrap();
    let counts = recorder.counts();

    drop(handle);
    settle().await;

    assert_eq!(recorder.counts(), counts);
}

#[tokio::test(start_paused = true)]
async fn test_end_during_countdown_stops_queue() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, recorder) = session(&engine);

    handle.request_transfer().unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(handle.state(), SessionState::Queuing);

    // First tick lands at 2.8s.
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(recorder.positions(), vec![3, 2]);
    handle.end_session().unwrap();
    settle().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Ended);
    assert!(snapshot.assigned_agent.is_none());
    assert!(snapshot.queue_position.is_none());
    assert_eq!(recorder.positions(), vec![3, 2]);
    assert!(!recorder
        .messages()
        .iter()
        .any(|m| m.text.contains("connected to")));
    assert_eq!(recorder.states().last(), Some(&SessionState::Ended));
}

#[tokio::test(start_paused = true)]
async fn test_attachment_reaches_transcript_and_subscribers() {
    init_logging();
    let engine = SupportEngine::default();
    let (handle, recorder) = session(&engine);
    let screenshot = Attachment::new("error.png", "image/png", 2_048);

    handle
        .send_message(OutgoingMessage::text("the app shows this").with_attachment(screenshot.clone()))
        .unwrap();
    settle().await;

    let snapshot = handle.snapshot();
    let stored = snapshot
        .transcript
        .iter()
        .find(|m| m.author == Author::User)
        .unwrap();
    assert_eq!(stored.attachments, vec![screenshot.clone()]);

    let delivered = recorder
        .messages()
        .into_iter()
        .find(|m| m.id == stored.id)
        .unwrap();
    assert_eq!(delivered.attachments, vec![screenshot]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nothing_delivered_after_session_ended() {
    init_logging();
    let mut config = EngineConfig::default();
    config.timing = TimingConfig {
        pacing_ms: 0,
        queue_tick_ms: 1,
        agent_typing_ms: 1,
        transfer_ack_ms: 1,
    };
    let ended_text = config.texts.ended.clone();
    let engine = SupportEngine::from_config(config);

    for _ in 0..200 {
        let (handle, recorder) = session(&engine);
        handle.request_transfer().unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.state() != SessionState::Connected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        handle.send_message("late arrival").unwrap();
        handle.end_session().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let messages = recorder.messages();
        let ended = messages.iter().position(|m| m.text == ended_text).unwrap();
        assert_eq!(ended, messages.len() - 1);
        assert_eq!(recorder.states().last(), Some(&SessionState::Ended));
    }
}

#[tokio::test(start_paused = true)]
async fn test_callback_may_end_its_own_session() {
    init_logging();
    let engine = SupportEngine::default();
    let handle = engine.create_session();
    let recorder = Recorder::attach(&handle);
    let inner = handle.clone();
    handle.on_message(move |message| {
        if message.author == Author::User {
            inner.end_session().unwrap();
        }
    });
    handle.open().unwrap();

    handle.send_message("bye").unwrap();
    settle().await;

    assert_eq!(handle.state(), SessionState::Ended);
    let messages = recorder.messages();
    assert_eq!(messages.last().unwrap().text, EngineConfig::default().texts.ended);
}
