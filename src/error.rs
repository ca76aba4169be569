//! Error types for agentbench.
//!
//! All errors are strongly typed using thiserror. The split mirrors the
//! failure semantics of an evaluation run:
//! - [`ToolError`]: a precondition violation raised by a toolkit operation.
//!   Recoverable; fed back to the agent as a tool-error observation.
//! - [`ProtocolError`] / [`TransportError`]: fatal to the current run.
//! - [`EnvironmentError`]: misuse of the session state machine.
//! - [`ValidationError`]: invalid configuration, registries or tasks.

use thiserror::Error;

use crate::money::Money;

/// Validation errors raised while building configuration, registries and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Tool '{name}' is registered more than once")]
    DuplicateTool {
        name: String,
    },

    #[error("Tool name '{name}' is reserved")]
    ReservedToolName {
        name: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid task '{task_id}': {reason}")]
    InvalidTask {
        task_id: String,
        reason: String,
    },
}

/// Precondition violations raised by toolkit operations.
///
/// A WRITE operation raises these before its mutation phase starts, so the
/// state store is untouched whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("{kind} not found: {id}")]
    NotFound {
        kind: &'static str,
        id: String,
    },

    #[error("{kind} {id} does not belong to {owner}")]
    NotOwned {
        kind: &'static str,
        id: String,
        owner: String,
    },

    #[error("{kind} {id} is {state}: {reason}")]
    WrongState {
        kind: &'static str,
        id: String,
        state: String,
        reason: String,
    },

    #[error("{kind} {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Insufficient available balance in {account_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        account_id: String,
        available: Money,
        requested: Money,
    },

    #[error("Limit exceeded: {limit} (max: {max}, requested: {requested})")]
    LimitExceeded {
        limit: String,
        max: String,
        requested: String,
    },

    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        reason: String,
    },

    #[error("Unknown tool: {name}")]
    UnknownTool {
        name: String,
    },

    #[error("Identifier space exhausted for {kind} (prefix '{prefix}')")]
    IdSpaceExhausted {
        kind: &'static str,
        prefix: String,
    },

    #[error("Ledger entries for {event} do not net to zero (net {net})")]
    LedgerImbalance {
        event: String,
        net: Money,
    },
}

impl ToolError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Creates an ownership error.
    #[must_use]
    pub fn not_owned(kind: &'static str, id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::NotOwned {
            kind,
            id: id.into(),
            owner: owner.into(),
        }
    }

    /// Creates an invalid-arguments error.
    #[must_use]
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for this violation.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::NotOwned { .. } => "not_owned",
            Self::WrongState { .. } => "not_active",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::IdSpaceExhausted { .. } => "id_space_exhausted",
            Self::LedgerImbalance { .. } => "ledger_imbalance",
        }
    }
}

/// Violations of the action/observation protocol by the agent under test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Reply does not contain a <{tag}>...</{tag}> action payload")]
    MissingPayload {
        tag: &'static str,
    },

    #[error("Reply contains {count} action payloads, expected exactly one")]
    MultiplePayloads {
        count: usize,
    },

    #[error("Malformed action payload: {reason}")]
    MalformedPayload {
        reason: String,
    },

    #[error("Reply contains {count} text parts, expected exactly one")]
    UnexpectedParts {
        count: usize,
    },

    #[error("Session mismatch: expected '{expected}', got '{actual}'")]
    SessionMismatch {
        expected: String,
        actual: String,
    },
}

/// Transport errors for the agent channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("No reply within {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Malformed response envelope: {message}")]
    MalformedEnvelope {
        message: String,
    },

    #[error("Agent channel closed")]
    Closed,
}

/// Misuse of the environment session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    #[error("Environment has not been reset")]
    NotReset,

    #[error("Environment run has already terminated")]
    Terminated,

    #[error("A step is already in progress")]
    StepInProgress,

    #[error("Invalid state snapshot: {message}")]
    InvalidSnapshot {
        message: String,
    },
}

/// Top-level error type for agentbench.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("I/O error: {message}")]
    Io {
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl BenchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Returns true if this error can be reported back to the agent and the
    /// conversation continued.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Tool(_))
    }

    /// Returns true if this error must end the current run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Transport(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for agentbench operations.
pub type BenchResult<T> = Result<T, BenchError>;
