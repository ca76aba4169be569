//! # agentbench - Transactional environments for evaluating tool-using agents
//!
//! agentbench simulates transactional domains (a retail bank, a travel agency)
//! behind a bounded set of typed operations, and drives an external agent
//! through them turn by turn until the task ends with a reward.
//!
//! ## Core Concepts
//!
//! - **State store**: one domain's in-memory tables for a single run
//! - **Toolkit**: the READ/WRITE/GENERIC operations that may touch the store;
//!   WRITE operations check every precondition before mutating anything
//! - **Environment**: the reset/step session state machine around a toolkit
//! - **Orchestrator**: the strictly alternating exchange with the agent
//! - **Evaluator**: scores a sealed run against the task's expected outcome
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agentbench::domains::bank::BankDomain;
//! use agentbench::{HarnessConfig, InProcessTransport, Orchestrator};
//!
//! let domain = Arc::new(BankDomain::sample()?);
//! let tasks = agentbench::task::load_tasks("data/bank/tasks.json")?;
//! let transport = Arc::new(InProcessTransport::new(|| Box::new(MyAgent::default())));
//! let orchestrator = Orchestrator::new(transport, HarnessConfig::default())?;
//! for outcome in orchestrator.evaluate_all(domain, tasks).await? {
//!     println!("{}: {}", outcome.summary.task_id, outcome.summary.reward);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Foundations
pub mod clock;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod store;

// Operations and sessions
pub mod config;
pub mod environment;
pub mod evaluation;
pub mod message;
pub mod recorder;
pub mod task;
pub mod toolkit;

// Driving agents
pub mod orchestrator;
pub mod results;

// Reference domains
pub mod domains;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EnvironmentLimits, HarnessConfig, OrchestratorConfig};
pub use domains::Domain;
pub use environment::{Environment, ResetOutcome, ScriptedUser, SessionState, StepOutcome, UserSimulator};
pub use error::{
	BenchError, BenchResult, EnvironmentError, ProtocolError, ToolError, TransportError,
	ValidationError,
};
pub use evaluation::{Evaluator, OutcomeCheck, RewardBasis, RewardInfo};
pub use ledger::{LedgerEntry, Reversible};
pub use lifecycle::Lifecycle;
pub use message::{Action, Observation, ToolCall, RESPOND_ACTION_NAME};
pub use money::Money;
pub use orchestrator::{
	AgentReply, AgentRequest, AgentTransport, ContextId, EvaluationOutcome, EvaluationSummary,
	InProcessTransport, LocalAgent, Orchestrator,
};
pub use recorder::{RunId, SimulationRun, TerminationReason};
pub use results::ResultsDir;
pub use store::{Database, IdAllocator, Table};
pub use task::Task;
pub use toolkit::{Commit, ToolContext, ToolRegistry, ToolSpec, ToolType, Toolkit};
