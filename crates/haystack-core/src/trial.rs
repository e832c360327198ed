use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{GenerateResponse, ServerStats};
use crate::error::BenchError;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Where the needle goes inside the haystack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// No needle at all; measures false positives.
    Control,
    Start,
    Middle,
    End,
}

impl Position {
    pub const ALL: [Position; 4] = [Self::Control, Self::Start, Self::Middle, Self::End];
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Start => write!(f, "start"),
            Self::Middle => write!(f, "middle"),
            Self::End => write!(f, "end"),
        }
    }
}

impl std::str::FromStr for Position {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "control" => Ok(Self::Control),
            "start" => Ok(Self::Start),
            "middle" => Ok(Self::Middle),
            "end" => Ok(Self::End),
            _ => Err(BenchError::InvalidPosition(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TrialSpec
// ---------------------------------------------------------------------------

/// One unit of a needle sweep. Built by the scheduler, consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSpec {
    pub target_length: usize,
    pub position: Position,
    pub secret: String,
    pub expected_answer: String,
    pub question: String,
    pub source: PathBuf,
}

impl TrialSpec {
    pub fn include_secret(&self) -> bool {
        self.position != Position::Control
    }

    pub fn trial_id(&self, model: &str, at: DateTime<Utc>) -> String {
        format!(
            "{model}_{}_{}_{}",
            self.target_length,
            self.position,
            at.timestamp()
        )
    }
}

// ---------------------------------------------------------------------------
// TrialResult
// ---------------------------------------------------------------------------

/// Outcome of one executed trial, in the on-disk result format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub experiment_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub prompt_length_chars: usize,
    pub target_prompt_length: usize,
    pub message_position: Position,
    pub secret_message: Option<String>,
    pub include_secret: bool,
    pub found_secret: bool,
    pub token_count: u64,
    pub query_time_seconds: f64,
    pub response: Option<String>,
    pub ollama_metadata: Option<ServerStats>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TrialResult {
    /// Record for a trial whose query completed.
    pub fn completed(
        spec: &TrialSpec,
        model: &str,
        mode: Option<&str>,
        prompt_length_chars: usize,
        response: &GenerateResponse,
        found_secret: bool,
        query_time_seconds: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            experiment_id: spec.trial_id(model, now),
            timestamp: now,
            model: model.to_string(),
            mode: mode.map(str::to_string),
            prompt_length_chars,
            target_prompt_length: spec.target_length,
            message_position: spec.position,
            secret_message: spec.include_secret().then(|| spec.secret.clone()),
            include_secret: spec.include_secret(),
            found_secret,
            token_count: response.prompt_eval_count,
            query_time_seconds,
            response: Some(response.response.clone()),
            ollama_metadata: Some(response.stats()),
            error: None,
        }
    }

    /// Record for a trial whose query failed.
    pub fn failed(
        spec: &TrialSpec,
        model: &str,
        mode: Option<&str>,
        query_time_seconds: f64,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            experiment_id: format!("{}_error", spec.trial_id(model, now)),
            timestamp: now,
            model: model.to_string(),
            mode: mode.map(str::to_string),
            prompt_length_chars: spec.target_length,
            target_prompt_length: spec.target_length,
            message_position: spec.position,
            secret_message: spec.include_secret().then(|| spec.secret.clone()),
            include_secret: spec.include_secret(),
            found_secret: false,
            token_count: 0,
            query_time_seconds,
            response: None,
            ollama_metadata: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
