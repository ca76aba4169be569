//! The dual-party evaluation loop.
//!
//! The orchestrator resets an [`Environment`], sends the task briefing to the
//! agent under test, and then alternates strictly: one reply, one decoded
//! action, one environment step, one observation back to the agent. A reply
//! that cannot be decoded, arrives late, or names a different session ends
//! the run as a failure.

pub mod briefing;
pub mod codec;
pub mod transport;

pub use briefing::task_briefing;
pub use codec::{decode_action, encode_action, PAYLOAD_TAG};
pub use transport::{
    AgentReply, AgentRequest, AgentTransport, ContextId, InProcessTransport, LocalAgent, ReplyPart,
};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::HarnessConfig;
use crate::domains::Domain;
use crate::environment::Environment;
use crate::error::{BenchError, BenchResult, ProtocolError, TransportError, ValidationError};
use crate::message::Action;
use crate::recorder::{RunRecorder, SimulationRun, TerminationReason};
use crate::results::ResultsDir;
use crate::store::Database;
use crate::task::{self, Task};

/// The externally reported result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Task id.
    pub task_id: String,
    /// True when the run earned the full reward.
    pub success: bool,
    /// Reward scalar.
    pub reward: f64,
    /// Wall-clock time from reset to termination.
    pub elapsed_ms: u64,
    /// Why the run ended.
    pub termination: TerminationReason,
}

/// A summary together with the sealed run it was derived from.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Reportable summary.
    pub summary: EvaluationSummary,
    /// The sealed run.
    pub run: Arc<SimulationRun>,
}

/// Drives agents through environments.
pub struct Orchestrator<T: AgentTransport> {
    transport: Arc<T>,
    config: HarnessConfig,
}

impl<T: AgentTransport> fmt::Debug for Orchestrator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: AgentTransport> Clone for Orchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config,
        }
    }
}

impl<T: AgentTransport + 'static> Orchestrator<T> {
    /// Creates an orchestrator. The configuration is validated here.
    pub fn new(transport: Arc<T>, config: HarnessConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs one task to termination.
    ///
    /// The agent session is closed on every path out of the loop.
    pub async fn run<D: Database>(&self, env: &mut Environment<D>) -> BenchResult<EvaluationOutcome> {
        let started = Instant::now();
        let mut session: Option<ContextId> = None;
        let driven = self.drive(env, &mut session).await;
        if let Some(context_id) = &session {
            self.transport.close(context_id).await;
        }
        let (task_id, run) = driven?;

        let summary = EvaluationSummary {
            task_id,
            success: run.reward_info.as_ref().is_some_and(|r| r.is_success()),
            reward: run.reward(),
            elapsed_ms: elapsed_ms(started),
            termination: run.termination.clone(),
        };
        tracing::info!(
            task_id = %summary.task_id,
            success = summary.success,
            reward = summary.reward,
            elapsed_ms = summary.elapsed_ms,
            termination = %summary.termination,
            "evaluation finished"
        );
        Ok(EvaluationOutcome { summary, run })
    }

    async fn drive<D: Database>(
        &self,
        env: &mut Environment<D>,
        session: &mut Option<ContextId>,
    ) -> BenchResult<(String, Arc<SimulationRun>)> {
        let reset = env.reset()?;
        let task_id = reset.info.task_id.clone();
        let mut outbound = task_briefing(&reset);

        let run = loop {
            let action = match self.exchange(session, outbound).await {
                Ok(action) => action,
                Err(reason) => break env.abort(reason)?,
            };
            tracing::debug!(task_id = %task_id, action = action.name(), "agent action decoded");
            let step = env.step(action)?;
            if step.is_done() {
                break step
                    .info
                    .simulation_run
                    .ok_or_else(|| BenchError::internal("final step carried no sealed run"))?;
            }
            outbound = step.observation.content;
        };
        Ok((task_id, run))
    }

    /// Sends one message and decodes the reply into an action.
    ///
    /// Any failure is returned as the reason the run must end.
    async fn exchange(
        &self,
        session: &mut Option<ContextId>,
        text: String,
    ) -> Result<Action, TerminationReason> {
        let request = AgentRequest {
            context_id: session.clone(),
            text,
        };
        tracing::trace!(context_id = ?request.context_id, bytes = request.text.len(), "sending to agent");

        let deadline_ms = self.config.orchestrator.reply_timeout_ms;
        let reply = match tokio::time::timeout(
            Duration::from_millis(deadline_ms),
            self.transport.send(request),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(transport_failure(&e)),
            Err(_) => {
                return Err(transport_failure(&TransportError::Timeout {
                    duration_ms: deadline_ms,
                }))
            }
        };

        match session {
            Some(expected) if *expected != reply.context_id => {
                return Err(protocol_violation(&ProtocolError::SessionMismatch {
                    expected: expected.to_string(),
                    actual: reply.context_id.to_string(),
                }));
            }
            Some(_) => {}
            None => {
                tracing::debug!(context_id = %reply.context_id, "agent session established");
                *session = Some(reply.context_id.clone());
            }
        }

        let text = reply.single_text().map_err(|e| protocol_violation(&e))?;
        decode_action(text).map_err(|e| protocol_violation(&e))
    }

    /// Evaluates `tasks` against fresh environments of `domain`, at most
    /// `max_concurrency` at a time. Outcomes come back in task order, one per
    /// task: a task whose environment cannot be set up yields a failed
    /// outcome instead of stopping the batch.
    pub async fn evaluate_all<Dm: Domain>(
        &self,
        domain: Arc<Dm>,
        tasks: Vec<Task>,
    ) -> BenchResult<Vec<EvaluationOutcome>> {
        Ok(self.evaluate_batch(domain, tasks, None).await)
    }

    /// Evaluates the tasks with no saved run in `results`. Each run is saved
    /// as soon as it finishes, so an interrupted batch resumes where it
    /// stopped. Setup failures are reported but not saved, and are retried
    /// on the next call. Returns the outcomes of the runs performed.
    pub async fn evaluate_pending<Dm: Domain>(
        &self,
        domain: Arc<Dm>,
        tasks: Vec<Task>,
        results: &ResultsDir,
    ) -> BenchResult<Vec<EvaluationOutcome>> {
        let completed = results.completed_task_ids()?;
        let todo = task::pending(tasks, &completed);
        tracing::info!(skipped = completed.len(), remaining = todo.len(), "resuming evaluation");
        Ok(self.evaluate_batch(domain, todo, Some(results.clone())).await)
    }

    async fn evaluate_batch<Dm: Domain>(
        &self,
        domain: Arc<Dm>,
        tasks: Vec<Task>,
        results: Option<ResultsDir>,
    ) -> Vec<EvaluationOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.orchestrator.max_concurrency));
        let mut set = JoinSet::new();
        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let total = tasks.len();
        tracing::info!(domain = Dm::NAME, tasks = total, "batch evaluation started");

        for (index, task) in tasks.into_iter().enumerate() {
            let orchestrator = self.clone();
            let domain = Arc::clone(&domain);
            let permits = Arc::clone(&permits);
            let results = results.clone();
            set.spawn(async move {
                let started = Instant::now();
                let task_id = task.id.clone();
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => orchestrator.evaluate_one(domain.as_ref(), task).await,
                    Err(e) => failed_outcome(Dm::NAME, task_id, &format!("batch semaphore closed: {e}"), started),
                };
                if let Some(results) = &results {
                    if !outcome.run.termination.is_setup_failure() {
                        if let Err(e) = results.save(&outcome.run) {
                            tracing::error!(task_id = %outcome.summary.task_id, error = %e, "failed to save run");
                        }
                    }
                }
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<EvaluationOutcome>> = vec![None; total];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "evaluation task did not complete"),
            }
        }
        let started = Instant::now();
        let outcomes: Vec<EvaluationOutcome> = outcomes
            .into_iter()
            .zip(task_ids)
            .map(|(outcome, task_id)| {
                outcome.unwrap_or_else(|| {
                    failed_outcome(Dm::NAME, task_id, "evaluation task did not complete", started)
                })
            })
            .collect();
        let passed = outcomes.iter().filter(|o| o.summary.success).count();
        tracing::info!(domain = Dm::NAME, tasks = total, passed, "batch evaluation finished");
        outcomes
    }

    /// Runs `task`, turning any setup or environment error into a failed
    /// outcome for that task alone.
    async fn evaluate_one<Dm: Domain>(&self, domain: &Dm, task: Task) -> EvaluationOutcome {
        let started = Instant::now();
        let task_id = task.id.clone();
        let result = match domain.environment(Arc::new(task), self.config.environment) {
            Ok(mut env) => self.run(&mut env).await,
            Err(e) => Err(e.into()),
        };
        result.unwrap_or_else(|e| failed_outcome(Dm::NAME, task_id, &e.to_string(), started))
    }
}

fn failed_outcome(domain: &str, task_id: String, message: &str, started: Instant) -> EvaluationOutcome {
    tracing::error!(domain, task_id = %task_id, error = message, "task could not be evaluated");
    let termination = TerminationReason::SetupFailure {
        message: message.to_string(),
    };
    let run = RunRecorder::open(task_id.clone(), domain).seal(termination.clone(), Value::Null, String::new());
    EvaluationOutcome {
        summary: EvaluationSummary {
            task_id,
            success: false,
            reward: 0.0,
            elapsed_ms: elapsed_ms(started),
            termination,
        },
        run: Arc::new(run),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn transport_failure(e: &TransportError) -> TerminationReason {
    TerminationReason::TransportFailure {
        message: e.to_string(),
    }
}

fn protocol_violation(e: &ProtocolError) -> TerminationReason {
    TerminationReason::ProtocolViolation {
        message: e.to_string(),
    }
}
