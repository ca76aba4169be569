//! Tasks: immutable scenario definitions.
//!
//! A task names the initial store snapshot (inline, or the domain default),
//! the simulated user's intent and scripted turns, and the expected outcome
//! that the evaluator scores a run against.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BenchError, BenchResult, ValidationError};
use crate::evaluation::{OutcomeCheck, RewardBasis};
use crate::message::RESPOND_ACTION_NAME;

/// One evaluation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id within a task set.
    pub id: String,
    /// Free-form description for reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What the simulated user wants and says.
    pub user_scenario: UserScenario,
    /// Inline store snapshot; the domain's default store is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<Value>,
    /// Instant the simulation clock is frozen at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_time: Option<DateTime<Utc>>,
    /// Expected outcome.
    #[serde(default)]
    pub evaluation_criteria: EvaluationCriteria,
}

/// The simulated user's side of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserScenario {
    /// Hidden instructions describing the user's goal.
    #[serde(default)]
    pub instructions: String,
    /// First message the user sends.
    pub opening_message: String,
    /// Replies sent, in order, each time the agent responds in free text.
    #[serde(default)]
    pub replies: Vec<String>,
}

/// A tool call the agent is expected to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedAction {
    /// Operation name.
    pub name: String,
    /// Arguments; when replayed these are passed verbatim.
    #[serde(default = "empty_object")]
    pub arguments: Value,
    /// Argument keys compared when matching the transcript. All keys when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_args: Option<Vec<String>>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// The expected outcome of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriteria {
    /// Tool calls the agent should make, in order.
    #[serde(default)]
    pub actions: Vec<ExpectedAction>,
    /// Assertions over the final store.
    #[serde(default)]
    pub checks: Vec<OutcomeCheck>,
    /// Strings the agent must tell the user.
    #[serde(default)]
    pub communicate_info: Vec<String>,
    /// Bases multiplied into the reward. Inferred from the populated criteria
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_basis: Option<Vec<RewardBasis>>,
}

impl EvaluationCriteria {
    /// The bases this task is scored on.
    #[must_use]
    pub fn reward_basis(&self) -> Vec<RewardBasis> {
        if let Some(basis) = &self.reward_basis {
            return basis.clone();
        }
        let mut basis = Vec::new();
        if !self.actions.is_empty() {
            basis.push(RewardBasis::Db);
        }
        if !self.checks.is_empty() {
            basis.push(RewardBasis::State);
        }
        if !self.communicate_info.is_empty() {
            basis.push(RewardBasis::Communicate);
        }
        basis
    }
}

impl Task {
    /// Validate a task.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidTask {
            task_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "id".to_string(),
            });
        }
        if self.user_scenario.opening_message.trim().is_empty() {
            return Err(invalid("user_scenario.opening_message is empty"));
        }
        if let Some(state) = &self.initial_state {
            if !state.is_object() {
                return Err(invalid("initial_state must be a JSON object"));
            }
        }
        for action in &self.evaluation_criteria.actions {
            if action.name.trim().is_empty() || action.name == RESPOND_ACTION_NAME {
                return Err(invalid("expected actions must name a tool"));
            }
            if !action.arguments.is_object() {
                return Err(invalid("expected action arguments must be a JSON object"));
            }
        }
        let basis = self.evaluation_criteria.reward_basis();
        let unique: HashSet<_> = basis.iter().collect();
        if unique.len() != basis.len() {
            return Err(invalid("reward_basis lists a basis twice"));
        }
        Ok(())
    }
}

/// Parses and validates a JSON array of tasks.
pub fn parse_tasks(json: &str) -> BenchResult<Vec<Task>> {
    let tasks: Vec<Task> = serde_json::from_str(json).map_err(|e| ValidationError::InvalidTask {
        task_id: "<set>".to_string(),
        reason: e.to_string(),
    })?;
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in &tasks {
        task.validate()?;
        if !seen.insert(task.id.as_str()) {
            return Err(ValidationError::InvalidTask {
                task_id: task.id.clone(),
                reason: "duplicate task id".to_string(),
            }
            .into());
        }
    }
    Ok(tasks)
}

/// Reads a task set file.
pub fn load_tasks(path: impl AsRef<Path>) -> BenchResult<Vec<Task>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| BenchError::io(format!("read tasks {}: {e}", path.display())))?;
    let tasks = parse_tasks(&text)?;
    tracing::info!(path = %path.display(), count = tasks.len(), "loaded task set");
    Ok(tasks)
}

/// Tasks whose id is not in `completed`, in their original order.
#[must_use]
pub fn pending(tasks: Vec<Task>, completed: &BTreeSet<String>) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|t| !completed.contains(&t.id))
        .collect()
}
