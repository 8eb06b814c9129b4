use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keywords::{Category, KeywordSet};

const CONFIG_FILE_PATH: &str = "support_chat.toml";
const CONFIG_ENV: &str = "SUPPORT_CHAT_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Delays used by the engine's scheduled tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Minimum gap between two outbound message deliveries.
    pub pacing_ms: u64,
    /// Interval between two queue position decrements.
    pub queue_tick_ms: u64,
    /// Simulated agent typing latency before a reply.
    pub agent_typing_ms: u64,
    /// Delay before the transfer desk is asked to acknowledge.
    pub transfer_ack_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 600,
            queue_tick_ms: 2_000,
            agent_typing_ms: 1_500,
            transfer_ack_ms: 800,
        }
    }
}

impl TimingConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn queue_tick(&self) -> Duration {
        Duration::from_millis(self.queue_tick_ms)
    }

    pub fn agent_typing(&self) -> Duration {
        Duration::from_millis(self.agent_typing_ms)
    }

    pub fn transfer_ack(&self) -> Duration {
        Duration::from_millis(self.transfer_ack_ms)
    }
}

/// Score contributions of each escalation signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    /// Added once per distinct keyword category matched.
    pub keyword: f64,
    /// Added when the visitor repeats their previous message.
    pub repeat: f64,
    /// Added when the conversation has run longer than `conversation_time_ms`.
    pub duration: f64,
    /// Added once the visitor has sent `repeat_question_count` messages.
    pub frequency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 0.3,
            repeat: 0.2,
            duration: 0.2,
            frequency: 0.1,
        }
    }
}

/// Keyword tables and thresholds that decide when triage hands over to a human.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EscalationRule {
    pub keyword_sets: Vec<KeywordSet>,
    /// Phrases that count as an explicit request for a human agent.
    pub transfer_phrases: Vec<String>,
    pub conversation_time_ms: u64,
    pub repeat_question_count: u32,
    pub transfer_score_threshold: f64,
    pub weights: ScoreWeights,
}

impl Default for EscalationRule {
    fn default() -> Self {
        Self {
            keyword_sets: default_keyword_sets(),
            transfer_phrases: vec![
                "转人工".to_string(),
                "人工客服".to_string(),
                "客服专员".to_string(),
                "human agent".to_string(),
                "real person".to_string(),
                "talk to a human".to_string(),
            ],
            conversation_time_ms: 300_000,
            repeat_question_count: 3,
            transfer_score_threshold: 1.0,
            weights: ScoreWeights::default(),
        }
    }
}

impl EscalationRule {
    pub fn conversation_time(&self) -> Duration {
        Duration::from_millis(self.conversation_time_ms)
    }
}

/// One row of the response catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub category: Category,
    /// Quick-reply label shown in the welcome menu.
    pub label: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub answer: String,
}

impl CatalogEntry {
    pub fn new<I, S>(category: Category, label: &str, keywords: I, answer: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            label: label.to_string(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            answer: answer.to_string(),
        }
    }
}

/// Keywords shared by the default escalation rule and the default catalog.
pub fn default_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Account => &[
            "忘记密码", "密码", "账号", "登录", "forgot password", "password", "account", "login",
            "sign in",
        ],
        Category::Payment => &[
            "支付", "付款", "扣款", "发票", "充值", "payment", "pay", "charge", "invoice", "billing",
        ],
        Category::Order => &[
            "订单", "物流", "发货", "快递", "order", "shipping", "delivery", "tracking",
        ],
        Category::Technical => &[
            "报错", "无法", "打不开", "闪退", "technical", "error", "crash", "bug", "not working",
        ],
        Category::Complex => &[
            "退款", "投诉", "被盗", "盗号", "律师", "refund", "complaint", "hacked", "chargeback",
            "lawyer",
        ],
    }
}

/// One keyword set per category, in catalog order.
pub fn default_keyword_sets() -> Vec<KeywordSet> {
    Category::ALL
        .iter()
        .map(|&category| KeywordSet::new(category, default_keywords(category).iter().copied()))
        .collect()
}

pub fn default_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(
            Category::Account,
            "Account & password",
            default_keywords(Category::Account).to_vec(),
            "To reset your password, choose \"Forgot password\" on the sign-in page and follow the link we email you. The link is valid for 30 minutes.",
        ),
        CatalogEntry::new(
            Category::Payment,
            "Payments & invoices",
            default_keywords(Category::Payment).to_vec(),
            "We accept major cards and bank transfers. Invoices are available under Account > Billing once a payment has cleared.",
        ),
        CatalogEntry::new(
            Category::Order,
            "Orders & shipping",
            default_keywords(Category::Order).to_vec(),
            "You can follow your order under My Orders. Tracking numbers appear within 24 hours of dispatch.",
        ),
        CatalogEntry::new(
            Category::Technical,
            "Technical problems",
            default_keywords(Category::Technical).to_vec(),
            "Please try clearing your browser cache and signing in again. If the problem persists, send us a screenshot of the error.",
        ),
        CatalogEntry::new(
            Category::Complex,
            "Refunds & complaints",
            default_keywords(Category::Complex).to_vec(),
            "Refunds and complaints are handled by our support specialists. Let me connect you with one.",
        ),
    ]
}

/// Fixed texts the engine appends to the transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionTexts {
    pub welcome: String,
    /// Label of the "talk to a human" quick reply in the welcome menu.
    pub human_option: String,
    pub fallback: String,
    pub transferring: String,
    /// `{agent}` is replaced with the assigned agent's name.
    pub connected: String,
    pub ended: String,
    pub transfer_failed: String,
    /// Replies cycled through by the simulated live agent.
    pub agent_replies: Vec<String>,
}

impl Default for SessionTexts {
    fn default() -> Self {
        Self {
            welcome: "Hi! I'm the support assistant. What can I help you with today?".to_string(),
            human_option: "Talk to a human".to_string(),
            fallback: "I may not have understood fully — please rephrase or request a human agent."
                .to_string(),
            transferring: "Transferring you to a human agent, one moment please…".to_string(),
            connected: "You are now connected to {agent}.".to_string(),
            ended: "This chat session has ended. Thank you for contacting us!".to_string(),
            transfer_failed:
                "Sorry, we could not reach an agent right now. The assistant will keep helping you."
                    .to_string(),
            agent_replies: vec![
                "Thanks for the details, let me check that for you.".to_string(),
                "I'm looking into it now, one moment please.".to_string(),
                "Got it. Is there anything else I should know?".to_string(),
            ],
        }
    }
}

impl SessionTexts {
    pub fn connected_to(&self, agent_name: &str) -> String {
        self.connected.replace("{agent}", agent_name)
    }

    /// Reply for the `index`-th agent turn, cycling through `agent_replies`.
    pub fn agent_reply(&self, index: usize) -> &str {
        if self.agent_replies.is_empty() {
            return "";
        }
        &self.agent_replies[index % self.agent_replies.len()]
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub timing: TimingConfig,
    pub escalation: EscalationRule,
    pub catalog: Vec<CatalogEntry>,
    pub texts: SessionTexts,
    /// Queue position reported by the default transfer desk.
    pub initial_queue_position: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            escalation: EscalationRule::default(),
            catalog: default_catalog(),
            texts: SessionTexts::default(),
            initial_queue_position: 3,
        }
    }
}

fn parse_u64_env(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn parse_f64_env(name: &str) -> Option<f64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

impl EngineConfig {
    /// Load configuration from `SUPPORT_CHAT_CONFIG` or `support_chat.toml`,
    /// falling back to defaults, then apply environment overrides.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                let local = PathBuf::from(CONFIG_FILE_PATH);
                local.exists().then_some(local)
            });

        let mut config = match path {
            Some(path) => Self::from_path(&path).unwrap_or_else(|e| {
                log::warn!(
                    "Failed to load support chat config from {}: {}; using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env_overrides();
        config
    }

    /// Read a JSON (`.json`) or TOML (anything else) configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = parse_u64_env("SUPPORT_CHAT_PACING_MS") {
            self.timing.pacing_ms = ms;
        }
        if let Some(ms) = parse_u64_env("SUPPORT_CHAT_QUEUE_TICK_MS") {
            self.timing.queue_tick_ms = ms;
        }
        if let Some(ms) = parse_u64_env("SUPPORT_CHAT_AGENT_TYPING_MS") {
            self.timing.agent_typing_ms = ms;
        }
        if let Some(threshold) = parse_f64_env("SUPPORT_CHAT_TRANSFER_THRESHOLD") {
            if threshold > 0.0 {
                self.escalation.transfer_score_threshold = threshold;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rule = &self.escalation;
        if !rule.transfer_score_threshold.is_finite() || rule.transfer_score_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "transfer_score_threshold must be a positive number, got {}",
                rule.transfer_score_threshold
            )));
        }
        let weights = &rule.weights;
        for (name, value) in [
            ("keyword", weights.keyword),
            ("repeat", weights.repeat),
            ("duration", weights.duration),
            ("frequency", weights.frequency),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.timing.queue_tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "queue_tick_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
