//! Run transcripts.
//!
//! A [`RunRecorder`] is opened when an environment is reset, appended to on
//! every step, and sealed into an immutable [`SimulationRun`] when the run
//! terminates. A sealed run carries the final store snapshot and its
//! fingerprint so that scoring never needs the live store.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::evaluation::RewardInfo;
use crate::message::{Action, Observation};

/// Unique identifier for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The simulated user ended the conversation.
    UserStop,
    /// The step budget ran out.
    MaxSteps,
    /// The agent made too many failing tool calls.
    TooManyErrors,
    /// The agent's reply could not be decoded, or broke the session rules.
    ProtocolViolation {
        /// What went wrong.
        message: String,
    },
    /// The agent could not be reached, or did not reply in time.
    TransportFailure {
        /// What went wrong.
        message: String,
    },
    /// The environment for the task could not be built or reset; the agent
    /// never saw the task.
    SetupFailure {
        /// What went wrong.
        message: String,
    },
}

impl TerminationReason {
    /// Returns true for runs aborted by a protocol or transport failure.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. } | Self::TransportFailure { .. }
        )
    }

    /// Returns true when the run never reached the agent.
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(self, Self::SetupFailure { .. })
    }

    /// Returns true when the run ended because the step budget ran out.
    #[must_use]
    pub const fn is_truncation(&self) -> bool {
        matches!(self, Self::MaxSteps)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserStop => f.write_str("user_stop"),
            Self::MaxSteps => f.write_str("max_steps"),
            Self::TooManyErrors => f.write_str("too_many_errors"),
            Self::ProtocolViolation { message } => write!(f, "protocol_violation: {message}"),
            Self::TransportFailure { message } => write!(f, "transport_failure: {message}"),
            Self::SetupFailure { message } => write!(f, "setup_failure: {message}"),
        }
    }
}

/// One turn: the observation shown to the agent and the action it chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Zero-based turn index.
    pub turn: usize,
    /// Wall-clock time the observation was produced.
    pub at: DateTime<Utc>,
    /// What the agent saw.
    pub observation: Observation,
    /// What the agent did; absent for the final observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

/// A sealed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    /// Run id.
    pub id: RunId,
    /// Task this run executed.
    pub task_id: String,
    /// Domain name.
    pub domain: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// Elapsed wall-clock time.
    pub duration_ms: u64,
    /// Why the run ended.
    pub termination: TerminationReason,
    /// Observation/action pairs in order.
    pub transcript: Vec<TranscriptEntry>,
    /// Snapshot of the store at termination.
    pub final_state: Value,
    /// Fingerprint of the store at termination.
    pub final_state_hash: String,
    /// Score, once computed.
    #[serde(default)]
    pub reward_info: Option<RewardInfo>,
}

impl SimulationRun {
    /// Every action taken, in order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.transcript.iter().filter_map(|e| e.action.as_ref())
    }

    /// Free-text replies the agent sent to the user.
    pub fn agent_messages(&self) -> impl Iterator<Item = &str> {
        self.actions().filter_map(|a| match a {
            Action::Respond { content } => Some(content.as_str()),
            Action::ToolCall(_) => None,
        })
    }

    /// The reward scalar, or 0 when none was computed.
    #[must_use]
    pub fn reward(&self) -> f64 {
        self.reward_info.as_ref().map_or(0.0, |r| r.reward)
    }
}

/// Appends to an open run.
#[derive(Debug)]
pub struct RunRecorder {
    id: RunId,
    task_id: String,
    domain: String,
    started_at: DateTime<Utc>,
    started: Instant,
    transcript: Vec<TranscriptEntry>,
}

impl RunRecorder {
    /// Opens a run.
    #[must_use]
    pub fn open(task_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            task_id: task_id.into(),
            domain: domain.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            transcript: Vec::new(),
        }
    }

    /// The run id.
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    /// Number of recorded turns.
    #[must_use]
    pub fn turns(&self) -> usize {
        self.transcript.len()
    }

    /// Records an observation shown to the agent; it starts a new turn.
    pub fn observe(&mut self, observation: Observation) {
        self.transcript.push(TranscriptEntry {
            turn: self.transcript.len(),
            at: Utc::now(),
            observation,
            action: None,
        });
    }

    /// Records the action answering the latest observation.
    ///
    /// Returns false if there is no observation awaiting an action.
    pub fn act(&mut self, action: Action) -> bool {
        match self.transcript.last_mut() {
            Some(entry) if entry.action.is_none() => {
                entry.action = Some(action);
                true
            }
            _ => false,
        }
    }

    /// Seals the run.
    #[must_use]
    pub fn seal(
        self,
        termination: TerminationReason,
        final_state: Value,
        final_state_hash: String,
    ) -> SimulationRun {
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        SimulationRun {
            id: self.id,
            task_id: self.task_id,
            domain: self.domain,
            started_at: self.started_at,
            ended_at: Utc::now(),
            duration_ms,
            termination,
            transcript: self.transcript,
            final_state,
            final_state_hash,
            reward_info: None,
        }
    }
}
