//! Retail banking: clients, accounts, cards, a signed transaction ledger,
//! loans and transfer beneficiaries.

mod model;
mod tools;

pub use model::*;
pub use tools::registry;

use std::path::Path;
use std::sync::Arc;

use crate::error::{BenchResult, EnvironmentError};
use crate::store;
use crate::toolkit::ToolRegistry;

use super::Domain;

/// Policy text shown to the agent.
pub const POLICY: &str = "\
# Bank agent policy

You are a customer service agent for a retail bank. You help clients look up \
their accounts, cards, loans and transactions, move money, and manage \
beneficiaries.

- Before touching any client data, identify the client by email with \
  `find_client_id_by_email` and only act on records that belong to that client.
- Before any action that changes data (transfers, reversals, freezing or \
  unfreezing, closing an account, loan payments, adding or verifying \
  beneficiaries), list the exact details of the action and obtain an explicit \
  user confirmation (yes) to proceed.
- Make at most one tool call at a time. If you make a tool call, do not respond \
  to the user in the same turn.
- Internal transfers are only allowed between active accounts of the same \
  client in the same currency. Credit accounts cannot be the source of a transfer.
- Transfers to beneficiaries require an active, verified beneficiary, a source \
  account the beneficiary authorizes, and an amount within the per-transfer limit.
- Only posted transfers can be reversed. Reversing an already reversed transfer \
  returns the earlier reversal.
- An account can only be closed when its balance is zero.
- Do not make up information or give subjective recommendations. Transfer the \
  user to a human agent only when the request cannot be handled with the \
  available tools.
";

const SAMPLE_DB: &str = include_str!("../../../data/bank/db.json");

/// The bundled sample bank.
pub fn sample_db() -> Result<BankDb, EnvironmentError> {
    store::from_snapshot_str(SAMPLE_DB)
}

/// The bank domain.
#[derive(Debug, Clone)]
pub struct BankDomain {
    registry: Arc<ToolRegistry<BankDb>>,
    db: BankDb,
}

impl BankDomain {
    /// Creates the domain over `db`.
    pub fn new(db: BankDb) -> BenchResult<Self> {
        Ok(Self {
            registry: registry()?,
            db,
        })
    }

    /// Creates the domain over the bundled sample bank.
    pub fn sample() -> BenchResult<Self> {
        Self::new(sample_db()?)
    }

    /// Creates the domain over a snapshot file.
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> BenchResult<Self> {
        Self::new(store::from_snapshot_file(path)?)
    }
}

impl Domain for BankDomain {
    type Db = BankDb;

    const NAME: &'static str = "bank";

    fn policy(&self) -> &str {
        POLICY
    }

    fn registry(&self) -> Arc<ToolRegistry<BankDb>> {
        Arc::clone(&self.registry)
    }

    fn initial_db(&self) -> &BankDb {
        &self.db
    }
}
