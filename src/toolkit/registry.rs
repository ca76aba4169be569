//! Typed operation registry.
//!
//! The registry is built once, when a domain constructs its toolkit, and maps
//! each operation name to its capability class, argument schema and handler.
//! The capability class is carried by the handler's signature:
//! - READ handlers receive `&D` and cannot mutate the store.
//! - WRITE handlers are split into a prepare phase that receives `&D` and
//!   either fails or returns a [`Commit`] plan, and an infallible commit
//!   phase that receives `&mut D`. All precondition checks live in prepare,
//!   so a failing operation never reaches the store.
//! - GENERIC handlers receive no store at all.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::clock::{self, Clock};
use crate::error::{ToolError, ValidationError};
use crate::message::RESPOND_ACTION_NAME;
use crate::store::Database;

use super::{ToolSpec, ToolType};

/// Per-call context handed to READ and WRITE handlers.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    clock: &'a dyn Clock,
}

impl<'a> ToolContext<'a> {
    /// Creates a context over `clock`.
    #[must_use]
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    /// Current simulated instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current simulated instant as a ledger timestamp.
    #[must_use]
    pub fn timestamp(&self) -> String {
        clock::timestamp(self.clock.now())
    }

    /// Current simulated date as `YYYY-MM-DD`.
    #[must_use]
    pub fn today(&self) -> String {
        self.clock.today()
    }
}

/// The mutation phase of a WRITE operation.
///
/// A plan is produced only after every precondition has passed. Applying it
/// cannot fail.
pub trait Commit<D>: Send {
    /// Value returned to the agent.
    type Output: Serialize;

    /// Applies the plan.
    fn commit(self, db: &mut D) -> Self::Output;
}

pub(crate) type Mutation<D> = Box<dyn FnOnce(&mut D) -> Value + Send>;

type ReadFn<D> = Box<dyn Fn(&D, &ToolContext<'_>, Value) -> Result<Value, ToolError> + Send + Sync>;
type WriteFn<D> =
    Box<dyn Fn(&D, &ToolContext<'_>, Value) -> Result<Mutation<D>, ToolError> + Send + Sync>;
type GenericFn = Box<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

pub(crate) enum Handler<D> {
    Read(ReadFn<D>),
    Write(WriteFn<D>),
    Generic(GenericFn),
}

impl<D> Handler<D> {
    const fn tool_type(&self) -> ToolType {
        match self {
            Self::Read(_) => ToolType::Read,
            Self::Write(_) => ToolType::Write,
            Self::Generic(_) => ToolType::Generic,
        }
    }
}

/// The registered operations of one domain.
pub struct ToolRegistry<D> {
    specs: Vec<ToolSpec>,
    handlers: Vec<Handler<D>>,
    by_name: HashMap<String, usize>,
}

impl<D> std::fmt::Debug for ToolRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl<D: Database> ToolRegistry<D> {
    /// Starts a registry.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder<D> {
        ToolRegistryBuilder { entries: Vec::new() }
    }

    /// Specs in registration order.
    #[must_use]
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Looks up one spec.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.by_name.get(name).map(|&i| &self.specs[i])
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub(crate) fn handler(&self, name: &str) -> Option<&Handler<D>> {
        self.by_name.get(name).map(|&i| &self.handlers[i])
    }
}

/// Collects registrations; duplicates and reserved names are rejected in
/// [`ToolRegistryBuilder::build`].
pub struct ToolRegistryBuilder<D> {
    entries: Vec<(ToolSpec, Handler<D>)>,
}

impl<D: Database> ToolRegistryBuilder<D> {
    /// Registers a READ operation.
    #[must_use]
    pub fn read<A, R, F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        F: Fn(&D, &ToolContext<'_>, A) -> Result<R, ToolError> + Send + Sync + 'static,
    {
        let handler = Handler::Read(Box::new(move |db: &D, ctx: &ToolContext<'_>, args: Value| {
            let args = decode_args::<A>(args)?;
            handler(db, ctx, args).map(|out| encode_output(&out))
        }));
        self.push::<A>(name, description, handler);
        self
    }

    /// Registers a WRITE operation as a prepare function returning a plan.
    #[must_use]
    pub fn write<A, P, F>(mut self, name: &str, description: &str, prepare: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
        P: Commit<D> + 'static,
        F: Fn(&D, &ToolContext<'_>, A) -> Result<P, ToolError> + Send + Sync + 'static,
    {
        let handler = Handler::Write(Box::new(move |db: &D, ctx: &ToolContext<'_>, args: Value| {
            let args = decode_args::<A>(args)?;
            let plan = prepare(db, ctx, args)?;
            let mutation: Mutation<D> = Box::new(move |db: &mut D| encode_output(&plan.commit(db)));
            Ok(mutation)
        }));
        self.push::<A>(name, description, handler);
        self
    }

    /// Registers a GENERIC operation.
    #[must_use]
    pub fn generic<A, R, F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R, ToolError> + Send + Sync + 'static,
    {
        let handler = Handler::Generic(Box::new(move |args: Value| {
            let args = decode_args::<A>(args)?;
            handler(args).map(|out| encode_output(&out))
        }));
        self.push::<A>(name, description, handler);
        self
    }

    fn push<A: JsonSchema>(&mut self, name: &str, description: &str, handler: Handler<D>) {
        let spec = ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            tool_type: handler.tool_type(),
            parameters: args_schema::<A>(),
        };
        self.entries.push((spec, handler));
    }

    /// Finishes the registry.
    pub fn build(self) -> Result<ToolRegistry<D>, ValidationError> {
        let mut specs = Vec::with_capacity(self.entries.len());
        let mut handlers = Vec::with_capacity(self.entries.len());
        let mut by_name = HashMap::with_capacity(self.entries.len());
        for (spec, handler) in self.entries {
            if spec.name == RESPOND_ACTION_NAME {
                return Err(ValidationError::ReservedToolName { name: spec.name });
            }
            if spec.name.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "tool name".to_string(),
                });
            }
            if by_name.insert(spec.name.clone(), specs.len()).is_some() {
                return Err(ValidationError::DuplicateTool { name: spec.name });
            }
            specs.push(spec);
            handlers.push(handler);
        }
        Ok(ToolRegistry {
            specs,
            handlers,
            by_name,
        })
    }

    /// Finishes the registry behind an `Arc` for sharing across runs.
    pub fn build_shared(self) -> Result<Arc<ToolRegistry<D>>, ValidationError> {
        self.build().map(Arc::new)
    }
}

fn decode_args<A: DeserializeOwned>(args: Value) -> Result<A, ToolError> {
    let args = match args {
        Value::Null => Value::Object(serde_json::Map::new()),
        Value::Object(_) => args,
        other => {
            return Err(ToolError::invalid_arguments(format!(
                "arguments must be a JSON object, got {other}"
            )))
        }
    };
    serde_json::from_value(args).map_err(|e| ToolError::invalid_arguments(e.to_string()))
}

fn encode_output<R: Serialize>(out: &R) -> Value {
    serde_json::to_value(out).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool output is not serializable");
        Value::String(format!("unserializable tool output: {e}"))
    })
}

/// JSON Schema for an argument type, without the `$schema` marker.
fn args_schema<A: JsonSchema>() -> Value {
    let mut v = serde_json::to_value(schemars::schema_for!(A))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    if let Some(obj) = v.as_object_mut() {
        obj.remove("$schema");
    }
    v
}
