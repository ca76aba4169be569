//! The session state machine around one task.
//!
//! ```text
//! Initialized --reset--> AwaitingAction --step--> Stepped --+--> AwaitingAction
//!                              ^                            |
//!                              +----------------------------+--> Terminated
//! ```
//!
//! `reset` binds a fresh store built from the task snapshot and returns the
//! opening observation. `step` accepts one decoded action, dispatches it to
//! the toolkit or to the simulated user, and returns the next observation.
//! When a run ends, the environment seals the transcript, scores it, and
//! hands both back in the step info.

mod user;

pub use user::{ScriptedUser, UserSimulator, STOP_TOKEN};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, FixedClock};
use crate::config::EnvironmentLimits;
use crate::error::{BenchResult, EnvironmentError, ValidationError};
use crate::evaluation::{Evaluator, RewardInfo};
use crate::message::{Action, Observation};
use crate::recorder::{RunRecorder, SimulationRun, TerminationReason};
use crate::store::{self, Database};
use crate::task::Task;
use crate::toolkit::{ToolRegistry, ToolSpec, ToolType, Toolkit};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, not yet reset.
    Initialized,
    /// Waiting for the agent's next action.
    AwaitingAction,
    /// Dispatching an action.
    Stepped,
    /// The run has ended.
    Terminated,
}

/// Context returned by [`Environment::reset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Domain name.
    pub domain: String,
    /// Task id.
    pub task_id: String,
    /// Natural-language policy the agent must follow.
    pub policy: String,
    /// Operation schema, generated from the registry.
    pub tools: Vec<ToolSpec>,
}

/// First observation of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetOutcome {
    /// The simulated user's opening message.
    pub observation: Observation,
    /// Policy and tool schema.
    pub info: ResetInfo,
}

/// Context returned by [`Environment::step`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    /// One-based index of this step.
    pub step: usize,
    /// Capability class of the invoked tool, for tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<ToolType>,
    /// Why the run ended, on the final step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
    /// The sealed run, on the final step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_run: Option<Arc<SimulationRun>>,
    /// The score, on the final step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_info: Option<RewardInfo>,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    /// What the agent sees next.
    pub observation: Observation,
    /// Reward earned by this step; non-zero only on the final step.
    pub reward: f64,
    /// The run ended before the step budget ran out.
    pub terminated: bool,
    /// The step budget ran out.
    pub truncated: bool,
    /// Step context.
    pub info: StepInfo,
}

impl StepOutcome {
    /// Returns true once the run has ended either way.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

type UserFactory = Box<dyn Fn(&Task) -> Box<dyn UserSimulator> + Send + Sync>;

struct Session<D: Database> {
    toolkit: Toolkit<D>,
    initial: D,
    clock: Arc<dyn Clock>,
    recorder: RunRecorder,
    user: Box<dyn UserSimulator>,
    steps: usize,
    errors: usize,
}

/// A domain bound to one task.
pub struct Environment<D: Database> {
    domain: String,
    policy: String,
    registry: Arc<ToolRegistry<D>>,
    base_db: D,
    task: Arc<Task>,
    limits: EnvironmentLimits,
    clock: Arc<dyn Clock>,
    user_factory: UserFactory,
    state: SessionState,
    session: Option<Session<D>>,
    last_run: Option<Arc<SimulationRun>>,
}

impl<D: Database> fmt::Debug for Environment<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("domain", &self.domain)
            .field("task_id", &self.task.id)
            .field("limits", &self.limits)
            .field("state", &self.state)
            .field("steps", &self.session.as_ref().map(|s| s.steps))
            .finish_non_exhaustive()
    }
}

impl<D: Database> Environment<D> {
    /// Creates an environment.
    ///
    /// `base_db` is the store used when the task carries no inline snapshot.
    pub fn new(
        domain: impl Into<String>,
        policy: impl Into<String>,
        registry: Arc<ToolRegistry<D>>,
        base_db: D,
        task: Arc<Task>,
        limits: EnvironmentLimits,
    ) -> Result<Self, ValidationError> {
        limits.validate()?;
        task.validate()?;
        Ok(Self {
            domain: domain.into(),
            policy: policy.into(),
            registry,
            base_db,
            task,
            limits,
            clock: Arc::new(FixedClock::default()),
            user_factory: Box::new(|task: &Task| -> Box<dyn UserSimulator> {
                Box::new(ScriptedUser::from_scenario(&task.user_scenario))
            }),
            state: SessionState::Initialized,
            session: None,
            last_run: None,
        })
    }

    /// Uses `clock` for tasks that do not pin a simulation time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the scripted user with another simulator.
    #[must_use]
    pub fn with_user<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Task) -> Box<dyn UserSimulator> + Send + Sync + 'static,
    {
        self.user_factory = Box::new(factory);
        self
    }

    /// Domain name.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The bound task.
    #[must_use]
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The live store, while a run is in progress.
    #[must_use]
    pub fn db(&self) -> Option<&D> {
        self.session.as_ref().map(|s| s.toolkit.db())
    }

    /// The most recently sealed run.
    #[must_use]
    pub fn last_run(&self) -> Option<&Arc<SimulationRun>> {
        self.last_run.as_ref()
    }

    /// Starts (or restarts) the run with a fresh store.
    pub fn reset(&mut self) -> BenchResult<ResetOutcome> {
        let initial: D = match &self.task.initial_state {
            Some(snapshot) => store::from_snapshot(snapshot)?,
            None => self.base_db.clone(),
        };
        let clock: Arc<dyn Clock> = match self.task.simulation_time {
            Some(at) => Arc::new(FixedClock::new(at)),
            None => Arc::clone(&self.clock),
        };
        let toolkit = Toolkit::with_clock(Arc::clone(&self.registry), initial.clone(), Arc::clone(&clock));
        let mut user = (self.user_factory)(&self.task);
        let observation = Observation::user(user.opening_message());
        let mut recorder = RunRecorder::open(self.task.id.clone(), self.domain.clone());
        recorder.observe(observation.clone());

        tracing::info!(
            domain = %self.domain,
            task_id = %self.task.id,
            run_id = %recorder.id(),
            restarted = self.state != SessionState::Initialized,
            "environment reset"
        );

        self.session = Some(Session {
            toolkit,
            initial,
            clock,
            recorder,
            user,
            steps: 0,
            errors: 0,
        });
        self.state = SessionState::AwaitingAction;
        Ok(ResetOutcome {
            observation,
            info: ResetInfo {
                domain: self.domain.clone(),
                task_id: self.task.id.clone(),
                policy: self.policy.clone(),
                tools: self.registry.specs().to_vec(),
            },
        })
    }

    /// Applies one agent action.
    pub fn step(&mut self, action: Action) -> BenchResult<StepOutcome> {
        self.ensure_awaiting()?;
        let Some(session) = self.session.as_mut() else {
            return Err(EnvironmentError::NotReset.into());
        };
        self.state = SessionState::Stepped;
        session.steps += 1;
        session.recorder.act(action.clone());

        let mut termination = None;
        let mut tool_type = None;
        let observation = match &action {
            Action::ToolCall(call) => {
                tool_type = session.toolkit.tool_type(&call.name);
                match session.toolkit.use_tool(&call.name, call.arguments.clone()) {
                    Ok(value) => Observation::tool_result(&call.name, render(&value)),
                    Err(e) => {
                        session.errors += 1;
                        tracing::debug!(
                            tool = %call.name,
                            code = e.code(),
                            errors = session.errors,
                            "tool error returned to agent"
                        );
                        if session.errors >= self.limits.max_errors {
                            termination = Some(TerminationReason::TooManyErrors);
                        }
                        Observation::tool_error(&call.name, format!("Error: {e}"))
                    }
                }
            }
            Action::Respond { content } => {
                let reply = session.user.reply(content);
                if session.user.is_stop(&reply) {
                    termination = Some(TerminationReason::UserStop);
                }
                Observation::user(reply)
            }
        };
        session.recorder.observe(observation.clone());
        if termination.is_none() && session.steps >= self.limits.max_steps {
            termination = Some(TerminationReason::MaxSteps);
        }
        let step = session.steps;

        let Some(reason) = termination else {
            self.state = SessionState::AwaitingAction;
            return Ok(StepOutcome {
                observation,
                reward: 0.0,
                terminated: false,
                truncated: false,
                info: StepInfo {
                    step,
                    tool_type,
                    termination: None,
                    simulation_run: None,
                    reward_info: None,
                },
            });
        };

        let truncated = reason.is_truncation();
        let run = self.finish(reason.clone())?;
        let reward_info = run.reward_info.clone();
        Ok(StepOutcome {
            observation,
            reward: run.reward(),
            terminated: !truncated,
            truncated,
            info: StepInfo {
                step,
                tool_type,
                termination: Some(reason),
                simulation_run: Some(run),
                reward_info,
            },
        })
    }

    /// Ends the run at the current step boundary and scores whatever store
    /// exists at that point.
    pub fn abort(&mut self, reason: TerminationReason) -> BenchResult<Arc<SimulationRun>> {
        self.ensure_awaiting()?;
        tracing::warn!(task_id = %self.task.id, %reason, "run aborted");
        self.finish(reason)
    }

    fn ensure_awaiting(&self) -> Result<(), EnvironmentError> {
        match self.state {
            SessionState::AwaitingAction => Ok(()),
            SessionState::Initialized => Err(EnvironmentError::NotReset),
            SessionState::Stepped => Err(EnvironmentError::StepInProgress),
            SessionState::Terminated => Err(EnvironmentError::Terminated),
        }
    }

    fn finish(&mut self, reason: TerminationReason) -> BenchResult<Arc<SimulationRun>> {
        let Some(session) = self.session.take() else {
            return Err(EnvironmentError::NotReset.into());
        };
        self.state = SessionState::Terminated;
        let final_state = store::to_snapshot(session.toolkit.db())?;
        let final_hash = session.toolkit.fingerprint()?;
        let mut run = session.recorder.seal(reason, final_state, final_hash);
        let evaluator = Evaluator::new(&self.task, &self.registry, &session.initial, session.clock);
        run.reward_info = Some(evaluator.evaluate(&run)?);
        tracing::info!(
            task_id = %run.task_id,
            run_id = %run.id,
            termination = %run.termination,
            steps = session.steps,
            reward = run.reward(),
            "run terminated"
        );
        let run = Arc::new(run);
        self.last_run = Some(Arc::clone(&run));
        Ok(run)
    }
}

/// Renders a tool result as observation text.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::store::{Statistics, Table};
    use crate::toolkit::Commit;
    use schemars::JsonSchema;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Lamps {
        lamps: Table<bool>,
    }

    impl Database for Lamps {
        fn statistics(&self) -> Statistics {
            Statistics::new()
        }
    }

    #[derive(Deserialize, JsonSchema)]
    struct LampArgs {
        lamp_id: String,
    }

    struct SwitchOn(String);

    impl Commit<Lamps> for SwitchOn {
        type Output = String;

        fn commit(self, db: &mut Lamps) -> String {
            if let Some(on) = db.lamps.get_mut(&self.0) {
                *on = true;
            }
            format!("{} is on", self.0)
        }
    }

    fn registry() -> Arc<ToolRegistry<Lamps>> {
        ToolRegistry::builder()
            .write("switch_on", "Switch a lamp on.", |db: &Lamps, _ctx, a: LampArgs| {
                db.lamps.require("Lamp", &a.lamp_id)?;
                Ok(SwitchOn(a.lamp_id))
            })
            .build_shared()
            .unwrap()
    }

    fn task() -> Arc<Task> {
        Arc::new(
            serde_json::from_value(json!({
                "id": "lamp-1",
                "user_scenario": {"opening_message": "Turn on l1.", "replies": ["Thanks!"]},
                "initial_state": {"lamps": {"l1": false}},
                "evaluation_criteria": {
                    "checks": [{"kind": "field_equals", "table": "lamps", "id": "l1",
                                "path": "", "expected": true}]
                }
            }))
            .unwrap(),
        )
    }

    fn env(limits: EnvironmentLimits) -> Environment<Lamps> {
        Environment::new("lamps", "Be bright.", registry(), Lamps::default(), task(), limits).unwrap()
    }

    #[test]
    fn step_before_reset_is_rejected() {
        let mut env = env(EnvironmentLimits::default());
        let err = env.step(Action::respond("hi")).unwrap_err();
        assert!(matches!(err, BenchError::Environment(EnvironmentError::NotReset)));
    }

    #[test]
    fn full_run_scores_final_state() {
        let mut env = env(EnvironmentLimits::default());
        let reset = env.reset().unwrap();
        assert_eq!(reset.observation.content, "Turn on l1.");
        assert_eq!(reset.info.tools.len(), 1);
        assert_eq!(reset.info.policy, "Be bright.");

        let out = env.step(Action::tool_call("switch_on", json!({"lamp_id": "l1"}))).unwrap();
        assert!(!out.is_done());
        assert_eq!(out.observation.content, "l1 is on");
        assert_eq!(out.info.tool_type, Some(ToolType::Write));
        assert_eq!(env.state(), SessionState::AwaitingAction);

        let out = env.step(Action::respond("Done, anything else?")).unwrap();
        assert!(!out.is_done());
        assert_eq!(out.observation.content, "Thanks!");

        let out = env.step(Action::respond("Bye.")).unwrap();
        assert!(out.terminated);
        assert!(!out.truncated);
        assert_eq!(out.reward, 1.0);
        assert_eq!(out.info.termination, Some(TerminationReason::UserStop));
        let run = out.info.simulation_run.unwrap();
        assert_eq!(run.actions().count(), 3);
        assert_eq!(env.state(), SessionState::Terminated);

        let err = env.step(Action::respond("again")).unwrap_err();
        assert!(matches!(err, BenchError::Environment(EnvironmentError::Terminated)));
    }

    #[test]
    fn tool_errors_are_observations_until_limit() {
        let mut env = env(EnvironmentLimits {
            max_steps: 100,
            max_errors: 2,
        });
        env.reset().unwrap();
        let out = env.step(Action::tool_call("switch_on", json!({"lamp_id": "l9"}))).unwrap();
        assert!(out.observation.is_tool_error());
        assert!(out.observation.content.starts_with("Error: Lamp not found"));
        assert!(!out.is_done());

        let out = env.step(Action::tool_call("no_such_tool", json!({}))).unwrap();
        assert!(out.terminated);
        assert_eq!(out.info.termination, Some(TerminationReason::TooManyErrors));
        assert_eq!(out.reward, 0.0);
    }

    #[test]
    fn step_budget_truncates_and_still_scores() {
        let mut env = env(EnvironmentLimits {
            max_steps: 1,
            max_errors: 10,
        });
        env.reset().unwrap();
        let out = env.step(Action::tool_call("switch_on", json!({"lamp_id": "l1"}))).unwrap();
        assert!(out.truncated);
        assert!(!out.terminated);
        assert_eq!(out.info.termination, Some(TerminationReason::MaxSteps));
        assert_eq!(out.reward, 1.0);
    }

    #[test]
    fn reset_restarts_with_fresh_store() {
        let mut env = env(EnvironmentLimits::default());
        env.reset().unwrap();
        env.step(Action::tool_call("switch_on", json!({"lamp_id": "l1"}))).unwrap();
        assert_eq!(env.db().unwrap().lamps.get("l1"), Some(&true));

        env.reset().unwrap();
        assert_eq!(env.db().unwrap().lamps.get("l1"), Some(&false));
    }

    #[test]
    fn abort_scores_zero_against_current_store() {
        let mut env = env(EnvironmentLimits::default());
        env.reset().unwrap();
        env.step(Action::tool_call("switch_on", json!({"lamp_id": "l1"}))).unwrap();
        let run = env
            .abort(TerminationReason::TransportFailure {
                message: "timeout".to_string(),
            })
            .unwrap();
        assert_eq!(run.final_state["lamps"]["l1"], true);
        assert_eq!(run.reward(), 0.0);
        assert!(run.reward_info.as_ref().unwrap().state_checks[0].passed);
        assert!(env.abort(TerminationReason::MaxSteps).is_err());
    }
}
