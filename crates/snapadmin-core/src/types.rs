use crate::config::MainConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// HostSpec
// ---------------------------------------------------------------------------

/// One resolved target device. Immutable once resolved.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    pub hostname: String,
    /// `None` until the orchestrator asks the credential provider.
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    pub port: Option<u16>,
    /// Connection keys other than `device`, `username`, `passwd` and `port`.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Group the host came from, `None` for inline or CLI hosts.
    pub group: Option<String>,
}

impl HostSpec {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: None,
            password: None,
            port: None,
            extra: BTreeMap::new(),
            group: None,
        }
    }
}

impl fmt::Debug for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSpec")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("extra", &self.extra)
            .field("group", &self.group)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Capture replies for every test definition.
    Snapshot,
    /// Compare two stored snapshots.
    Check,
    /// Capture now, then evaluate the capture.
    SnapCheck,
    /// Show the difference between two stored snapshots.
    Diff,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Snapshot => "snap",
            ActionKind::Check => "check",
            ActionKind::SnapCheck => "snapcheck",
            ActionKind::Diff => "diff",
        }
    }

    /// Actions that talk to the device. Check and Diff work on stored
    /// snapshots only.
    pub fn needs_session(self) -> bool {
        matches!(self, ActionKind::Snapshot | ActionKind::SnapCheck)
    }

    pub fn captures(self) -> bool {
        self.needs_session()
    }

    /// Check and Diff compare a pre and a post snapshot.
    pub fn requires_both_labels(self) -> bool {
        matches!(self, ActionKind::Check | ActionKind::Diff)
    }

    pub fn notifies(self) -> bool {
        matches!(self, ActionKind::Check | ActionKind::SnapCheck)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

/// What to do, created once per top-level invocation.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub pre_label: Option<String>,
    pub post_label: Option<String>,
    pub config: Arc<MainConfig>,
}

impl ActionRequest {
    pub fn new(
        kind: ActionKind,
        pre_label: Option<String>,
        post_label: Option<String>,
        config: MainConfig,
    ) -> Self {
        Self {
            kind,
            pre_label,
            post_label,
            config: Arc::new(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Capture payloads
// ---------------------------------------------------------------------------

/// The stored reply to one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub command: String,
    pub output: String,
    /// Snapshot file the reply was written to.
    pub path: Option<PathBuf>,
    /// Row id when the reply was also stored in SQLite.
    pub snapshot_id: Option<i64>,
}

/// What one capture of one test definition produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureHandle {
    pub hostname: String,
    pub test_definition: String,
    pub label: String,
    pub replies: Vec<CommandReply>,
}

// ---------------------------------------------------------------------------
// Test results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_definition: String,
    pub command: String,
    pub passed: bool,
    /// Human-readable differences or failure reasons; empty when passed.
    #[serde(default)]
    pub details: Vec<String>,
}

/// All comparison outcomes for one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultSet {
    pub hostname: String,
    pub action: ActionKind,
    pub outcomes: Vec<TestOutcome>,
}

impl TestResultSet {
    pub fn new(hostname: impl Into<String>, action: ActionKind) -> Self {
        Self {
            hostname: hostname.into(),
            action,
            outcomes: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Number of reported differences across all outcomes.
    pub fn differences(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.details.len().max(1))
            .sum()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

// ---------------------------------------------------------------------------
// SessionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Succeeded,
    AuthFailed,
    ConnectionFailed,
    ActionFailed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Succeeded => "succeeded",
            SessionStatus::AuthFailed => "auth_failed",
            SessionStatus::ConnectionFailed => "connection_failed",
            SessionStatus::ActionFailed => "action_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionPayload {
    /// Snapshot: the last test definition's capture (last-wins).
    Captured { capture: Option<CaptureHandle> },
    /// Check / SnapCheck / Diff.
    Tested { results: TestResultSet },
    Empty,
}

/// Exactly one per targeted host per dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub hostname: String,
    pub status: SessionStatus,
    pub payload: SessionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionResult {
    pub fn succeeded(hostname: impl Into<String>, payload: SessionPayload) -> Self {
        Self {
            hostname: hostname.into(),
            status: SessionStatus::Succeeded,
            payload,
            error: None,
        }
    }

    pub fn failed(
        hostname: impl Into<String>,
        status: SessionStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            status,
            payload: SessionPayload::Empty,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Succeeded
    }

    pub fn test_results(&self) -> Option<&TestResultSet> {
        match &self.payload {
            SessionPayload::Tested { results } => Some(results),
            _ => None,
        }
    }

    pub fn capture(&self) -> Option<&CaptureHandle> {
        match &self.payload {
            SessionPayload::Captured { capture } => capture.as_ref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestrationResult
// ---------------------------------------------------------------------------

/// Results in completion order. Completion order says nothing about which
/// host finished first in the host list; use [`OrchestrationResult::by_host`]
/// to correlate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub results: Vec<SessionResult>,
}

impl OrchestrationResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionResult> {
        self.results.iter()
    }

    pub fn by_host(&self) -> HashMap<&str, &SessionResult> {
        self.results
            .iter()
            .map(|r| (r.hostname.as_str(), r))
            .collect()
    }

    pub fn get(&self, hostname: &str) -> Option<&SessionResult> {
        self.results.iter().find(|r| r.hostname == hostname)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.results.len()
    }
}

impl IntoIterator for OrchestrationResult {
    type Item = SessionResult;
    type IntoIter = std::vec::IntoIter<SessionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
