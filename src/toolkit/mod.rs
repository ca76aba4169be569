//! The toolkit: the only component allowed to mutate a state store.
//!
//! A [`Toolkit`] owns one run's store and dispatches operations through a
//! shared [`ToolRegistry`]. Dispatch is by capability class:
//! READ handlers borrow the store immutably, WRITE handlers run their
//! precondition phase against an immutable borrow and only then receive a
//! mutable one, GENERIC handlers never see the store.

pub mod generic;
mod registry;

pub use registry::{Commit, ToolContext, ToolRegistry, ToolRegistryBuilder};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::{Clock, FixedClock};
use crate::error::{BenchResult, ToolError};
use crate::store::{self, Database, Statistics};

use registry::Handler;

/// Capability class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// Observes the store, never mutates it.
    Read,
    /// May mutate the store.
    Write,
    /// Touches no simulated state.
    Generic,
}

/// Name, description, capability and argument schema of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Operation name.
    pub name: String,
    /// Natural-language description shown to the agent.
    pub description: String,
    /// Capability class.
    pub tool_type: ToolType,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    /// This tool in OpenAI function-calling format.
    #[must_use]
    pub fn openai_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One run's store plus the operations that may touch it.
#[derive(Debug)]
pub struct Toolkit<D: Database> {
    registry: Arc<ToolRegistry<D>>,
    db: D,
    clock: Arc<dyn Clock>,
}

impl<D: Database> Toolkit<D> {
    /// Binds `db` to `registry` with the default fixed clock.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry<D>>, db: D) -> Self {
        Self::with_clock(registry, db, Arc::new(FixedClock::default()))
    }

    /// Binds `db` to `registry` with an explicit clock.
    #[must_use]
    pub fn with_clock(registry: Arc<ToolRegistry<D>>, db: D, clock: Arc<dyn Clock>) -> Self {
        Self { registry, db, clock }
    }

    /// Read-only view of the store.
    #[must_use]
    pub fn db(&self) -> &D {
        &self.db
    }

    /// Consumes the toolkit, returning the store.
    #[must_use]
    pub fn into_db(self) -> D {
        self.db
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry<D>> {
        &self.registry
    }

    /// Operation specs in registration order.
    #[must_use]
    pub fn tools(&self) -> &[ToolSpec] {
        self.registry.specs()
    }

    /// Operation specs in OpenAI function-calling format.
    #[must_use]
    pub fn openai_schemas(&self) -> Vec<Value> {
        self.tools().iter().map(ToolSpec::openai_schema).collect()
    }

    /// Capability class of `name`, if registered.
    #[must_use]
    pub fn tool_type(&self, name: &str) -> Option<ToolType> {
        self.registry.spec(name).map(|s| s.tool_type)
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.spec(name).is_some()
    }

    /// Store statistics.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.db.statistics()
    }

    /// Fingerprint of the current store contents.
    pub fn fingerprint(&self) -> BenchResult<String> {
        store::fingerprint(&self.db)
    }

    /// Invokes `name` with `arguments`.
    ///
    /// On error the store is unchanged.
    pub fn use_tool(&mut self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let Some(handler) = self.registry.handler(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return Err(ToolError::UnknownTool {
                name: name.to_string(),
            });
        };
        let ctx = ToolContext::new(self.clock.as_ref());
        let result = match handler {
            Handler::Read(read) => read(&self.db, &ctx, arguments),
            Handler::Write(prepare) => {
                prepare(&self.db, &ctx, arguments).map(|mutation| mutation(&mut self.db))
            }
            Handler::Generic(run) => run(arguments),
        };
        match &result {
            Ok(_) => tracing::debug!(tool = name, "tool call succeeded"),
            Err(e) => tracing::debug!(tool = name, code = e.code(), error = %e, "tool call rejected"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::store::Table;
    use schemars::JsonSchema;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Wallets {
        wallets: Table<Money>,
    }

    impl Database for Wallets {
        fn statistics(&self) -> Statistics {
            let mut stats = Statistics::new();
            stats.insert("num_wallets".to_string(), self.wallets.len().into());
            stats
        }
    }

    #[derive(Deserialize, JsonSchema)]
    struct WalletArgs {
        wallet_id: String,
    }

    #[derive(Deserialize, JsonSchema)]
    struct MoveArgs {
        from: String,
        to: String,
        amount: Money,
    }

    struct Move {
        from: String,
        to: String,
        from_after: Money,
        to_after: Money,
    }

    impl Commit<Wallets> for Move {
        type Output = Value;

        fn commit(self, db: &mut Wallets) -> Value {
            if let Some(w) = db.wallets.get_mut(&self.from) {
                *w = self.from_after;
            }
            if let Some(w) = db.wallets.get_mut(&self.to) {
                *w = self.to_after;
            }
            json!({"from": self.from_after, "to": self.to_after})
        }
    }

    fn toolkit() -> Toolkit<Wallets> {
        let registry = ToolRegistry::builder()
            .read("get_wallet", "Balance of a wallet.", |db: &Wallets, _ctx, a: WalletArgs| {
                db.wallets.require("Wallet", &a.wallet_id).copied()
            })
            .write("move_funds", "Move funds.", |db: &Wallets, _ctx, a: MoveArgs| {
                let from = *db.wallets.require("Wallet", &a.from)?;
                let to = *db.wallets.require("Wallet", &a.to)?;
                if from < a.amount {
                    return Err(ToolError::InsufficientBalance {
                        account_id: a.from,
                        available: from,
                        requested: a.amount,
                    });
                }
                Ok(Move {
                    from: a.from,
                    to: a.to,
                    from_after: from - a.amount,
                    to_after: to + a.amount,
                })
            })
            .generic("echo", "Echo text.", |a: WalletArgs| Ok(a.wallet_id))
            .build_shared()
            .unwrap();
        let db = Wallets {
            wallets: [
                ("w1".to_string(), Money::from_minor(10_000)),
                ("w2".to_string(), Money::from_minor(0)),
            ]
            .into_iter()
            .collect(),
        };
        Toolkit::new(registry, db)
    }

    #[test]
    fn dispatches_by_capability() {
        let mut kit = toolkit();
        assert_eq!(kit.tool_type("get_wallet"), Some(ToolType::Read));
        assert_eq!(kit.tool_type("move_funds"), Some(ToolType::Write));
        assert_eq!(kit.tool_type("echo"), Some(ToolType::Generic));

        let out = kit
            .use_tool("move_funds", json!({"from": "w1", "to": "w2", "amount": 25.5}))
            .unwrap();
        assert_eq!(out, json!({"from": 74.5, "to": 25.5}));
        assert_eq!(kit.use_tool("get_wallet", json!({"wallet_id": "w2"})).unwrap(), json!(25.5));
        assert_eq!(kit.use_tool("echo", json!({"wallet_id": "hi"})).unwrap(), json!("hi"));
    }

    #[test]
    fn failed_precondition_leaves_store_untouched() {
        let mut kit = toolkit();
        let before = kit.fingerprint().unwrap();
        let err = kit
            .use_tool("move_funds", json!({"from": "w1", "to": "w2", "amount": 1000.0}))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
        let err = kit
            .use_tool("move_funds", json!({"from": "w1", "to": "w9", "amount": 1.0}))
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(before, kit.fingerprint().unwrap());
    }

    #[test]
    fn unknown_tool_is_a_tool_error() {
        let mut kit = toolkit();
        let err = kit.use_tool("drop_tables", json!({})).unwrap_err();
        assert_eq!(err, ToolError::UnknownTool { name: "drop_tables".to_string() });
    }

    #[test]
    fn openai_schema_shape() {
        let kit = toolkit();
        let schemas = kit.openai_schemas();
        assert_eq!(schemas.len(), 3);
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "get_wallet");
        assert_eq!(
            schemas[0]["function"]["parameters"]["properties"]["wallet_id"]["type"],
            "string"
        );
        assert_eq!(kit.statistics()["num_wallets"], 2);
    }
}
