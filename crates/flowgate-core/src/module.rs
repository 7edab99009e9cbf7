// flowgate-core/src/module.rs
// ============================================================================
// Module: Module Invocation Contract
// Description: The trait every step and stage-fanout module implements.
// Purpose: Give the engine one dynamic-dispatch seam for all module calls.
// Dependencies: async_trait, tokio::time, crate::outcome
// ============================================================================

//! ## Overview
//! Modules are resolved by type through a [`crate::interfaces::ModuleCatalog`]
//! and invoked through this trait. Arguments and outputs are opaque JSON at
//! this layer (the catalog is responsible for matching a module's declared
//! args/output type identifiers against the plan node or patch entry that
//! names it); the engine itself never interprets their contents.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde_json::Value;
use tokio::time::Instant;

use crate::outcome::Outcome;

/// Read-mostly facade passed to a module invocation.
pub struct ModuleContext<'a> {
    /// The module's bound arguments.
    pub args: &'a Value,
    /// Absolute instant by which the module must return.
    pub deadline: Instant,
    /// Cooperative cancellation flag shared with the owning request.
    pub cancel_flag: Arc<AtomicBool>,
    /// Request-scoped user identifier, when present.
    pub user_id: Option<&'a str>,
    /// Coarse service-level label for the request.
    pub qos_tier: &'a str,
}

/// A registered, invocable unit of work: a step module or a join.
#[async_trait::async_trait]
pub trait Module: Send + Sync {
    /// Executes the module against `ctx`, returning a total [`Outcome`].
    ///
    /// Implementations must respect `ctx.deadline` and `ctx.cancel_flag`;
    /// the engine does not forcibly abort a running module.
    async fn execute(&self, ctx: &ModuleContext<'_>) -> Outcome<Value>;
}

/// A pre-registered pure reduction over previously recorded node outcomes.
#[async_trait::async_trait]
pub trait Join: Send + Sync {
    /// Produces the join's outcome from the context's recorded state.
    async fn reduce(&self, ctx: &crate::context::FlowContext) -> Outcome<Value>;
}
