//! Escalation scorer - decides when automated triage should hand over

use std::time::Duration;

use support_core::{normalize, Category, EscalationRule};
use support_state::EscalationReason;

/// Absorbs float accumulation error when comparing against the threshold.
const SCORE_EPSILON: f64 = 1e-9;

/// Session facts the scorer needs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    /// Cumulative score before this message.
    pub current_score: f64,
    /// Normalized text of the previous user message.
    pub previous_text: Option<&'a str>,
    /// User messages sent so far, including the one being evaluated.
    pub user_message_count: u32,
    /// Time since the session started.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Escalate(EscalationReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVerdict {
    pub increment: f64,
    pub matched: Vec<Category>,
    pub repeated: bool,
    pub verdict: Verdict,
}

impl ScoreVerdict {
    fn empty() -> Self {
        Self {
            increment: 0.0,
            matched: Vec::new(),
            repeated: false,
            verdict: Verdict::Continue,
        }
    }
}

/// Computes the running escalation score from message content, repetition
/// and elapsed time.
#[derive(Debug, Clone, Default)]
pub struct EscalationScorer {
    rule: EscalationRule,
}

impl EscalationScorer {
    pub fn new(rule: EscalationRule) -> Self {
        Self { rule }
    }

    /// Evaluate one user message. Never fails; empty text scores nothing.
    pub fn evaluate(&self, context: &ScoreContext<'_>, text: &str) -> ScoreVerdict {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return ScoreVerdict::empty();
        }

        let weights = &self.rule.weights;
        let mut increment = 0.0;

        let mut matched: Vec<Category> = Vec::new();
        for set in &self.rule.keyword_sets {
            if !matched.contains(&set.category) && set.matches_normalized(&normalized) {
                matched.push(set.category);
            }
        }
        increment += weights.keyword * matched.len() as f64;

        let repeated = context.previous_text == Some(normalized.as_str());
        if repeated {
            increment += weights.repeat;
        }

        if context.elapsed > self.rule.conversation_time() {
            increment += weights.duration;
        }

        if context.user_message_count >= self.rule.repeat_question_count {
            increment += weights.frequency;
        }

        let verdict = if matched.contains(&Category::Complex) {
            Verdict::Escalate(EscalationReason::Bypass)
        } else if context.current_score + increment + SCORE_EPSILON
            >= self.rule.transfer_score_threshold
        {
            Verdict::Escalate(EscalationReason::Threshold)
        } else {
            Verdict::Continue
        };

        ScoreVerdict {
            increment,
            matched,
            repeated,
            verdict,
        }
    }

    /// Whether the text explicitly asks for a human agent.
    pub fn is_transfer_request(&self, text: &str) -> bool {
        let normalized = normalize(text);
        !normalized.is_empty()
            && self
                .rule
                .transfer_phrases
                .iter()
                .map(|phrase| normalize(phrase))
                .any(|phrase| !phrase.is_empty() && normalized.contains(&phrase))
    }
}
