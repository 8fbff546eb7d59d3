use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Names of the pipeline stages, used to scope progress events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Generate,
    Cleanup,
    Fix,
    Render,
    Critique,
    Improve,
}

impl Stage {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Cleanup => "cleanup",
            Stage::Fix => "fix",
            Stage::Render => "render",
            Stage::Critique => "critique",
            Stage::Improve => "improve",
        }
    }
}

/// Progress event emitted by pipeline stages.
///
/// Events are observational only: they stream to sinks for display or
/// capture, and nothing in the pipeline blocks on their delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A stage started, finished, or reached a notable point.
    Stage {
        stage: Stage,
        round: Option<u32>,
        attempt: Option<u32>,
        message: String,
        when: DateTime<Utc>,
    },
    /// Token-count tick while a model stream is being drained.
    Tokens { stage: Stage, count: u64 },
    /// A renderer invocation completed with the given classification.
    Render {
        id: String,
        outcome: String,
        elapsed_ms: u64,
    },
    /// Free-form diagnostic (run start/end, journal location, errors).
    Diagnostic { scope: String, message: String },
}

impl Event {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Event::Stage {
            stage,
            round: None,
            attempt: None,
            message: message.into(),
            when: Utc::now(),
        }
    }

    pub fn stage_in_round(stage: Stage, round: u32, message: impl Into<String>) -> Self {
        Event::Stage {
            stage,
            round: Some(round),
            attempt: None,
            message: message.into(),
            when: Utc::now(),
        }
    }

    pub fn fix_attempt(round: u32, attempt: u32, message: impl Into<String>) -> Self {
        Event::Stage {
            stage: Stage::Fix,
            round: Some(round),
            attempt: Some(attempt),
            message: message.into(),
            when: Utc::now(),
        }
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Stage {
                stage,
                round,
                attempt,
                message,
                ..
            } => match (round, attempt) {
                (Some(r), Some(a)) => {
                    write!(f, "[{} r{r} try {a}] {message}", stage.label())
                }
                (Some(r), None) => write!(f, "[{} r{r}] {message}", stage.label()),
                _ => write!(f, "[{}] {message}", stage.label()),
            },
            Event::Tokens { stage, count } => {
                write!(f, "[{}] {count} tokens", stage.label())
            }
            Event::Render {
                id,
                outcome,
                elapsed_ms,
            } => write!(f, "[render {id}] {outcome} in {elapsed_ms}ms"),
            Event::Diagnostic { scope, message } => write!(f, "[{scope}] {message}"),
        }
    }
}
