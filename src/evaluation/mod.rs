//! Reward computation for sealed runs.
//!
//! Scoring is a pure function of the task, the sealed run and a replay of
//! the task's expected actions on a fresh store. Each selected
//! [`RewardBasis`] yields a score in `[0, 1]`; the reward is their product.
//! Runs aborted by a protocol or transport failure score 0, with the basis
//! still reported.

mod checks;

pub use checks::{CheckResult, OutcomeCheck};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::error::BenchResult;
use crate::message::Action;
use crate::recorder::SimulationRun;
use crate::store::Database;
use crate::task::{ExpectedAction, Task};
use crate::toolkit::{ToolRegistry, Toolkit};

use checks::values_equal;

/// A component of the reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardBasis {
    /// Final store matches a replay of the expected actions.
    Db,
    /// Outcome checks over the final store; partial credit.
    State,
    /// Expected tool calls appear in the transcript.
    Action,
    /// Required information reached the user.
    Communicate,
}

/// Result of the store replay comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCheck {
    /// Whether the fingerprints matched.
    pub db_match: bool,
    /// Fingerprint after replaying the expected actions.
    pub expected_hash: String,
    /// Fingerprint at run end.
    pub actual_hash: String,
    /// Expected actions that failed during replay.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replay_errors: Vec<String>,
}

/// Whether one expected tool call was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCheck {
    /// The expected call.
    pub action: ExpectedAction,
    /// Whether the transcript contains it.
    pub matched: bool,
}

/// Whether one required string reached the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicateCheck {
    /// The required string.
    pub info: String,
    /// Whether an agent reply contained it.
    pub met: bool,
}

/// The scored outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardInfo {
    /// Scalar reward in `[0, 1]`.
    pub reward: f64,
    /// Bases that were multiplied into the reward.
    pub reward_basis: Vec<RewardBasis>,
    /// Score per basis.
    pub reward_breakdown: BTreeMap<RewardBasis, f64>,
    /// Replay comparison, when the `db` basis is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_check: Option<DbCheck>,
    /// Outcome checks, when the `state` basis is selected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_checks: Vec<CheckResult>,
    /// Tool-call checks, when the `action` basis is selected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_checks: Vec<ActionCheck>,
    /// Communication checks, when the `communicate` basis is selected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communicate_checks: Vec<CommunicateCheck>,
    /// Why the reward was forced, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RewardInfo {
    /// Returns true for a full-credit run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (self.reward - 1.0).abs() < f64::EPSILON
    }
}

/// Scores runs of one task.
#[derive(Debug)]
pub struct Evaluator<'a, D: Database> {
    task: &'a Task,
    registry: &'a Arc<ToolRegistry<D>>,
    initial: &'a D,
    clock: Arc<dyn Clock>,
}

impl<'a, D: Database> Evaluator<'a, D> {
    /// Creates an evaluator. `initial` is the store the run started from and
    /// `clock` the clock it ran under.
    #[must_use]
    pub fn new(
        task: &'a Task,
        registry: &'a Arc<ToolRegistry<D>>,
        initial: &'a D,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            task,
            registry,
            initial,
            clock,
        }
    }

    /// Scores a sealed run.
    pub fn evaluate(&self, run: &SimulationRun) -> BenchResult<RewardInfo> {
        let criteria = &self.task.evaluation_criteria;
        let basis = criteria.reward_basis();
        let mut info = RewardInfo {
            reward: 1.0,
            reward_basis: basis.clone(),
            reward_breakdown: BTreeMap::new(),
            db_check: None,
            state_checks: Vec::new(),
            action_checks: Vec::new(),
            communicate_checks: Vec::new(),
            note: None,
        };

        for b in &basis {
            let score = match b {
                RewardBasis::Db => {
                    let check = self.replay(run)?;
                    let score = if check.db_match { 1.0 } else { 0.0 };
                    info.db_check = Some(check);
                    score
                }
                RewardBasis::State => {
                    info.state_checks = criteria
                        .checks
                        .iter()
                        .map(|c| c.evaluate(&run.final_state))
                        .collect();
                    fraction(info.state_checks.iter().filter(|c| c.passed).count(), info.state_checks.len())
                }
                RewardBasis::Action => {
                    info.action_checks = criteria
                        .actions
                        .iter()
                        .map(|expected| ActionCheck {
                            matched: run.actions().any(|a| action_matches(expected, a)),
                            action: expected.clone(),
                        })
                        .collect();
                    binary(info.action_checks.iter().all(|c| c.matched))
                }
                RewardBasis::Communicate => {
                    info.communicate_checks = criteria
                        .communicate_info
                        .iter()
                        .map(|required| CommunicateCheck {
                            met: run.agent_messages().any(|m| communicates(m, required)),
                            info: required.clone(),
                        })
                        .collect();
                    binary(info.communicate_checks.iter().all(|c| c.met))
                }
            };
            info.reward_breakdown.insert(*b, score);
            info.reward *= score;
        }

        if run.termination.is_abort() {
            info.reward = 0.0;
            info.note = Some(format!("run aborted: {}", run.termination));
        }
        tracing::info!(
            task_id = %self.task.id,
            run_id = %run.id,
            reward = info.reward,
            breakdown = ?info.reward_breakdown,
            "run scored"
        );
        Ok(info)
    }

    /// Replays the expected actions on a fresh store and compares fingerprints.
    fn replay(&self, run: &SimulationRun) -> BenchResult<DbCheck> {
        let mut toolkit =
            Toolkit::with_clock(Arc::clone(self.registry), self.initial.clone(), Arc::clone(&self.clock));
        let mut replay_errors = Vec::new();
        for action in &self.task.evaluation_criteria.actions {
            if let Err(e) = toolkit.use_tool(&action.name, action.arguments.clone()) {
                replay_errors.push(format!("{}: {e}", action.name));
            }
        }
        let expected_hash = toolkit.fingerprint()?;
        Ok(DbCheck {
            db_match: expected_hash == run.final_state_hash,
            expected_hash,
            actual_hash: run.final_state_hash.clone(),
            replay_errors,
        })
    }
}

fn fraction(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let score = passed as f64 / total as f64;
    score
}

const fn binary(ok: bool) -> f64 {
    if ok {
        1.0
    } else {
        0.0
    }
}

fn action_matches(expected: &ExpectedAction, action: &Action) -> bool {
    let Action::ToolCall(call) = action else {
        return false;
    };
    if call.name != expected.name {
        return false;
    }
    let Some(expected_args) = expected.arguments.as_object() else {
        return true;
    };
    let keys: Vec<&String> = match &expected.compare_args {
        Some(keys) => keys.iter().collect(),
        None => expected_args.keys().collect(),
    };
    keys.into_iter().all(|k| {
        match (expected_args.get(k), call.arguments.get(k)) {
            (Some(e), Some(a)) => values_equal(e, a),
            (None, None) | (Some(Value::Null), None) => true,
            _ => false,
        }
    })
}

/// Case-insensitive containment, ignoring thousands separators.
fn communicates(message: &str, required: &str) -> bool {
    message
        .to_lowercase()
        .replace(',', "")
        .contains(&required.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::message::Observation;
    use crate::recorder::{RunRecorder, TerminationReason};
    use crate::store::{Statistics, Table};
    use crate::toolkit::Commit;
    use schemars::JsonSchema;
    use serde_json::json;

    #[test]
    fn action_matching_uses_argument_subset() {
        let expected = ExpectedAction {
            name: "freeze_card".to_string(),
            arguments: json!({"card_id": "card_1", "reason": "lost"}),
            compare_args: Some(vec!["card_id".to_string()]),
        };
        let call = Action::tool_call("freeze_card", json!({"card_id": "card_1", "reason": "stolen"}));
        assert!(action_matches(&expected, &call));
        let other = Action::tool_call("freeze_card", json!({"card_id": "card_2"}));
        assert!(!action_matches(&expected, &other));
        assert!(!action_matches(&expected, &Action::respond("freeze_card")));
    }

    #[test]
    fn communicate_ignores_case_and_commas() {
        assert!(communicates("Your balance is 1,250.50 USD", "1250.50"));
        assert!(communicates("The booking is CANCELLED.", "cancelled"));
        assert!(!communicates("Done.", "1250.50"));
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Flags {
        flags: Table<bool>,
    }

    impl Database for Flags {
        fn statistics(&self) -> Statistics {
            Statistics::new()
        }
    }

    #[derive(Deserialize, JsonSchema)]
    struct FlagArgs {
        id: String,
    }

    struct Raise(String);

    impl Commit<Flags> for Raise {
        type Output = bool;

        fn commit(self, db: &mut Flags) -> bool {
            db.flags.insert_fresh(self.0, true)
        }
    }

    fn registry() -> Arc<ToolRegistry<Flags>> {
        ToolRegistry::builder()
            .write("raise_flag", "Raise a flag.", |_db: &Flags, _ctx, a: FlagArgs| Ok(Raise(a.id)))
            .build_shared()
            .unwrap()
    }

    fn task(basis: serde_json::Value) -> Task {
        serde_json::from_value(json!({
            "id": "t1",
            "user_scenario": {"opening_message": "raise f1 please"},
            "evaluation_criteria": {
                "actions": [{"name": "raise_flag", "arguments": {"id": "f1"}}],
                "checks": [
                    {"kind": "field_equals", "table": "flags", "id": "f1", "path": "", "expected": true},
                    {"kind": "field_equals", "table": "flags", "id": "f2", "path": "", "expected": true}
                ],
                "communicate_info": ["raised"],
                "reward_basis": basis
            }
        }))
        .unwrap()
    }

    fn run_with(termination: TerminationReason, actions: &[Action]) -> SimulationRun {
        let registry = registry();
        let mut toolkit = Toolkit::new(Arc::clone(&registry), Flags::default());
        let mut rec = RunRecorder::open("t1", "flags");
        rec.observe(Observation::user("raise f1 please"));
        for action in actions {
            rec.act(action.clone());
            if let Action::ToolCall(call) = action {
                let _ = toolkit.use_tool(&call.name, call.arguments.clone());
            }
            rec.observe(Observation::user("ok"));
        }
        let state = crate::store::to_snapshot(toolkit.db()).unwrap();
        let hash = toolkit.fingerprint().unwrap();
        rec.seal(termination, state, hash)
    }

    #[test]
    fn scores_each_basis_and_multiplies() {
        let registry = registry();
        let initial = Flags::default();
        let task = task(json!(["db", "state", "action", "communicate"]));
        let evaluator =
            Evaluator::new(&task, &registry, &initial, Arc::new(FixedClock::default()));

        let run = run_with(
            TerminationReason::UserStop,
            &[
                Action::tool_call("raise_flag", json!({"id": "f1"})),
                Action::respond("The flag is RAISED."),
            ],
        );
        let info = evaluator.evaluate(&run).unwrap();
        assert_eq!(info.reward_breakdown[&RewardBasis::Db], 1.0);
        assert_eq!(info.reward_breakdown[&RewardBasis::State], 0.5);
        assert_eq!(info.reward_breakdown[&RewardBasis::Action], 1.0);
        assert_eq!(info.reward_breakdown[&RewardBasis::Communicate], 1.0);
        assert_eq!(info.reward, 0.5);
        assert!(info.db_check.unwrap().db_match);
    }

    #[test]
    fn wrong_final_store_fails_db_basis() {
        let registry = registry();
        let initial = Flags::default();
        let task = task(json!(["db"]));
        let evaluator =
            Evaluator::new(&task, &registry, &initial, Arc::new(FixedClock::default()));
        let run = run_with(
            TerminationReason::UserStop,
            &[Action::tool_call("raise_flag", json!({"id": "f9"}))],
        );
        let info = evaluator.evaluate(&run).unwrap();
        assert_eq!(info.reward, 0.0);
        assert!(!info.is_success());
    }

    #[test]
    fn aborted_run_scores_zero_but_keeps_basis() {
        let registry = registry();
        let initial = Flags::default();
        let task = task(json!(["db"]));
        let evaluator =
            Evaluator::new(&task, &registry, &initial, Arc::new(FixedClock::default()));
        let run = run_with(
            TerminationReason::ProtocolViolation {
                message: "two payloads".to_string(),
            },
            &[Action::tool_call("raise_flag", json!({"id": "f1"}))],
        );
        let info = evaluator.evaluate(&run).unwrap();
        assert_eq!(info.reward_breakdown[&RewardBasis::Db], 1.0);
        assert_eq!(info.reward, 0.0);
        assert!(info.note.unwrap().contains("protocol_violation"));
    }

    #[test]
    fn scoring_is_deterministic() {
        let registry = registry();
        let initial = Flags::default();
        let task = task(json!(["db", "state", "communicate"]));
        let evaluator =
            Evaluator::new(&task, &registry, &initial, Arc::new(FixedClock::default()));
        let run = run_with(
            TerminationReason::UserStop,
            &[Action::tool_call("raise_flag", json!({"id": "f1"}))],
        );
        let a = evaluator.evaluate(&run).unwrap();
        let b = evaluator.evaluate(&run).unwrap();
        assert_eq!(a, b);
    }
}
