//! Travel agency: packages with dated departures, travelers with saved
//! payment methods, agents, and bookings with an append-only payment history.

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
# Travel agency policy

You are a travel agent assistant. You help travelers find and book packages, \
change or cancel their bookings, and meet with a human travel agent.

- Identify the traveler by traveler id before looking at or changing any booking, \
  and only act on that traveler's bookings.
- Before booking, cancelling or changing a booking, list the exact details \
  (package, departure date, travelers, add-ons, insurance, total price and payment \
  split) and obtain an explicit user confirmation (yes) to proceed.
- Make at most one tool call at a time. If you make a tool call, do not respond \
  to the user in the same turn.
- The total price is the departure's base price per traveler, plus the add-ons, \
  plus insurance (standard 50 or premium 100 per traveler). Payments must use the \
  traveler's saved payment methods and add up exactly to the total.
- Cancelling refunds every recorded payment to the method it was charged to. \
  Cancelled bookings cannot be changed.
- Price differences from add-on or date changes are charged or refunded to a \
  saved payment method the traveler chooses.
- Do not make up information. Transfer the user to a human agent only when the \
  request cannot be handled with the available tools.
";

const SAMPLE_DB: &str = include_str!("../../../data/travel/db.json");

/// The bundled sample agency.
pub fn sample_db() -> Result<TravelDb, EnvironmentError> {
    store::from_snapshot_str(SAMPLE_DB)
}

/// The travel domain.
#[derive(Debug, Clone)]
pub struct TravelDomain {
    registry: Arc<ToolRegistry<TravelDb>>,
    db: TravelDb,
}

impl TravelDomain {
    /// Creates the domain over `db`.
    pub fn new(db: TravelDb) -> BenchResult<Self> {
        Ok(Self {
            registry: registry()?,
            db,
        })
    }

    /// Creates the domain over the bundled sample agency.
    pub fn sample() -> BenchResult<Self> {
        Self::new(sample_db()?)
    }

    /// Creates the domain over a snapshot file.
    pub fn from_snapshot_file(path: impl AsRef<Path>) -> BenchResult<Self> {
        Self::new(store::from_snapshot_file(path)?)
    }
}

impl Domain for TravelDomain {
    type Db = TravelDb;

    const NAME: &'static str = "travel";

    fn policy(&self) -> &str {
        POLICY
    }

    fn registry(&self) -> Arc<ToolRegistry<TravelDb>> {
        Arc::clone(&self.registry)
    }

    fn initial_db(&self) -> &TravelDb {
        &self.db
    }
}
