//! Session, step and replay result records
//!
//! These are the JSON documents written by the [`SessionStore`](crate::store::SessionStore).
//! Field names are camelCase on disk so that records stay readable by the
//! dashboard that consumes them.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RecplayError, RecplayResult};

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Kind of user action a step represents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Click,
    Input,
    Navigation,
    /// Type string not understood by this build; kept verbatim so the
    /// record round-trips, and reported as a failure on replay.
    Other(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Click => "click",
            StepKind::Input => "input",
            StepKind::Navigation => "navigation",
            StepKind::Other(kind) => kind,
        }
    }

    /// Suffix used in capture-time screenshot names
    fn screenshot_suffix(&self) -> &str {
        match self {
            StepKind::Navigation => "nav",
            other => other.as_str(),
        }
    }
}

impl From<String> for StepKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "click" => StepKind::Click,
            "input" => StepKind::Input,
            "navigation" => StepKind::Navigation,
            _ => StepKind::Other(value),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,

    /// CSS locator (click and input)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Visible text of the clicked element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Value written into an input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Target of a navigation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Capture time, epoch milliseconds
    pub timestamp: i64,

    /// Screenshot artifact filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl Step {
    /// Short human-readable label, e.g. `click:#login`
    pub fn label(&self) -> String {
        let target = match self.kind {
            StepKind::Navigation => self.url.as_deref(),
            _ => self.selector.as_deref(),
        };
        format!("{}:{}", self.kind, target.unwrap_or("-"))
    }
}

/// Action payload sent over the page bridge (and by external reporters)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CapturedAction {
    Click {
        selector: String,
        #[serde(default)]
        text: Option<String>,
    },
    Input {
        selector: String,
        #[serde(default)]
        value: String,
    },
    Navigation {
        url: String,
    },
}

impl CapturedAction {
    pub fn kind(&self) -> StepKind {
        match self {
            CapturedAction::Click { .. } => StepKind::Click,
            CapturedAction::Input { .. } => StepKind::Input,
            CapturedAction::Navigation { .. } => StepKind::Navigation,
        }
    }

    /// Turn the action into the `index`-th (1-based) step of a session
    pub fn into_step(self, session_id: &str, index: usize, timestamp: i64) -> Step {
        let kind = self.kind();
        let screenshot = Some(format!(
            "{}_step{}_{}.png",
            session_id,
            index,
            kind.screenshot_suffix()
        ));

        let mut step = Step {
            kind,
            selector: None,
            text: None,
            value: None,
            url: None,
            timestamp,
            screenshot,
        };

        match self {
            CapturedAction::Click { selector, text } => {
                step.selector = Some(selector);
                step.text = text;
            }
            CapturedAction::Input { selector, value } => {
                step.selector = Some(selector);
                step.value = Some(value);
            }
            CapturedAction::Navigation { url } => {
                step.url = Some(url);
            }
        }

        step
    }
}

/// One recorded interaction sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,

    #[serde(default)]
    pub start_url: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Capture order is replay order
    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub is_recording: bool,

    /// Last step timestamp minus first, in milliseconds
    #[serde(default)]
    pub duration: i64,

    #[serde(default)]
    pub total_steps: usize,
}

impl Session {
    /// Create an empty session shell in the recording state
    pub fn new(session_id: impl Into<String>, start_url: impl Into<String>, test_name: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            test_name,
            start_url: start_url.into(),
            created_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
            is_recording: true,
            duration: 0,
            total_steps: 0,
        }
    }

    /// Stamp the stop transition with the captured steps
    pub fn finish(&mut self, steps: Vec<Step>) {
        self.duration = compute_duration(&steps);
        self.total_steps = steps.len();
        self.steps = steps;
        self.completed_at = Some(Utc::now());
        self.is_recording = false;
    }
}

/// Span between the first and last step; 0 with fewer than two steps
pub fn compute_duration(steps: &[Step]) -> i64 {
    match (steps.first(), steps.last()) {
        (Some(first), Some(last)) if steps.len() > 1 => last.timestamp - first.timestamp,
        _ => 0,
    }
}

/// Generate a time-based session id
pub fn generate_session_id() -> String {
    format!("session_{}", now_millis())
}

/// Session ids double as file stems, so they must not contain path syntax
pub fn validate_session_id(id: &str) -> RecplayResult<()> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed != id
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.contains('\0')
    {
        return Err(RecplayError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

/// Options accepted by the replay executor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayOptions {
    /// Pause after every step, in milliseconds
    pub step_delay: Option<u64>,

    /// Capture a screenshot after every step
    pub take_screenshots: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayStatus::Running => "running",
            ReplayStatus::Completed => "completed",
            ReplayStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of replaying a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    #[serde(flatten)]
    pub step: Step,

    pub executed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the step began, epoch milliseconds
    pub execution_time: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
}

impl StepResult {
    pub fn passed(step: Step, execution_time: i64) -> Self {
        Self {
            step,
            executed: true,
            error: None,
            execution_time,
            screenshot_path: None,
        }
    }

    pub fn failed(step: Step, execution_time: i64, error: impl Into<String>) -> Self {
        Self {
            step,
            executed: false,
            error: Some(error.into()),
            execution_time,
            screenshot_path: None,
        }
    }
}

/// Outcome of one replay invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    pub session_id: String,
    pub start_time: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    pub status: ReplayStatus,

    /// One entry per session step, in session order
    pub steps: Vec<StepResult>,

    /// Executor-level failure; per-step failures live on the steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayResult {
    pub fn start(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time: now_millis(),
            end_time: None,
            duration: None,
            status: ReplayStatus::Running,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Move to a terminal status and stamp the end time
    pub fn finish(&mut self, status: ReplayStatus) {
        let end = now_millis().max(self.start_time);
        self.status = status;
        self.end_time = Some(end);
        self.duration = Some(end - self.start_time);
    }

    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|s| s.executed).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.len() - self.passed()
    }
}
