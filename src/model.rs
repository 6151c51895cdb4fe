use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of the managed system process.
///
/// Owned exclusively by the reconciler. The dispatcher and poller propose
/// evidence for a transition and never assign state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Offline,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProcessState {
    /// Whether a start request is allowed from this state.
    pub fn can_start(self) -> bool {
        matches!(self, ProcessState::Offline | ProcessState::Error)
    }

    /// Whether a stop request is allowed from this state.
    pub fn can_stop(self) -> bool {
        matches!(self, ProcessState::Running)
    }

    /// True while a start or stop resolution is outstanding.
    pub fn is_transient(self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Stopping)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Offline => "offline",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Identifies a running instance for display. Live only while the state is
/// `Running`; in every other state it is absent or stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure,
}

/// Immediate response to a start/stop/job request. Consumed once by the
/// reconciler and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub outcome: ActionOutcome,
    pub message: String,
    pub pid: Option<u32>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            outcome: ActionOutcome::Success,
            message: message.into(),
            pid,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            outcome: ActionOutcome::Failure,
            message: message.into(),
            pid: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ActionOutcome::Success
    }
}

/// The server's ground truth for the tracked long-running process, sampled
/// per poll and superseded by the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoritativeStatus {
    pub system_running: bool,
}

/// One-shot background tasks. Jobs have no status polling; their state is
/// driven solely by the immediate request/response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Capture,
    Label,
    ManualLabel,
    Train,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Capture,
        JobKind::Label,
        JobKind::ManualLabel,
        JobKind::Train,
    ];

    /// Path of the control-surface endpoint for this job.
    pub fn endpoint(self) -> &'static str {
        match self {
            JobKind::Capture => "capture",
            JobKind::Label => "label",
            JobKind::ManualLabel => "manual-label",
            JobKind::Train => "train",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Requested,
    Reported(String),
}

/// Parameters forwarded to the control surface when starting the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartConfig {
    pub source: String,
    pub model: String,
    pub conf: f64,
}

/// What to do when a status poll fails at the transport level. A failed poll
/// never causes a state transition either way; the next cycle retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPolicy {
    /// Drop the sample silently.
    Ignore,
    /// Emit an advisory event for the presentation layer.
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub poll_policy: PollPolicy,
    pub user_agent: String,
    pub start: StartConfig,
}

/// Events emitted for presentation layers. Rendering subscribes to these and
/// never co-owns lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    ProcessChanged {
        state: ProcessState,
        handle: Option<ProcessHandle>,
    },
    /// An action was refused by the local state guard; no request was sent.
    ActionRejected { reason: String },
    /// A start/stop request failed and the state rolled back.
    ActionFailed { message: String },
    JobChanged { kind: JobKind, state: JobState },
    Info(String),
}
