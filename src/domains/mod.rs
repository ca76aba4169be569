//! Reference domains.
//!
//! A domain bundles a store type, the registry of operations over it, a
//! default snapshot and the policy text the agent must follow. Each domain
//! keeps its own schema; what they share is the ledger convention and the
//! lifecycle tables.

pub mod bank;
pub mod travel;

use std::sync::Arc;

use crate::config::EnvironmentLimits;
use crate::environment::Environment;
use crate::error::ValidationError;
use crate::store::Database;
use crate::task::Task;
use crate::toolkit::ToolRegistry;

/// A complete simulated domain.
pub trait Domain: Send + Sync + 'static {
    /// Store type.
    type Db: Database;

    /// Domain name used in transcripts and results.
    const NAME: &'static str;

    /// Policy text shown to the agent.
    fn policy(&self) -> &str;

    /// The shared operation registry.
    fn registry(&self) -> Arc<ToolRegistry<Self::Db>>;

    /// Store used by tasks that carry no inline snapshot.
    fn initial_db(&self) -> &Self::Db;

    /// A fresh environment bound to `task`.
    fn environment(
        &self,
        task: Arc<Task>,
        limits: EnvironmentLimits,
    ) -> Result<Environment<Self::Db>, ValidationError> {
        Environment::new(
            Self::NAME,
            self.policy(),
            self.registry(),
            self.initial_db().clone(),
            task,
            limits,
        )
    }
}
