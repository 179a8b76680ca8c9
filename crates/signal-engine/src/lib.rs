//! Signal execution engine
//!
//! A signal is a named workflow built from [`Action`]s. Its definition is a
//! list of [`Chain`] items: actions run in order, a [`Chain::Parallel`] runs
//! its async members concurrently, and a [`Chain::Paths`] map after an action
//! picks the list to continue with from the output the action took.
//!
//! ```ignore
//! use serde_json::json;
//! use signal_engine::{Action, Chain, Engine, Outcome};
//!
//! let load = Action::sync("load", |args, state| {
//!     state.set("user", args["user"].clone())?;
//!     Ok(Outcome::success(json!({"loaded": true})))
//! })
//! .with_outputs(["success", "error"]);
//!
//! let notify = Action::asynchronous("notify", |_, state| async move {
//!     let user = state.get("user");
//!     Ok(Outcome::next().with("notified", user.is_some()))
//! });
//!
//! let engine = Engine::default();
//! let signal = engine.create(
//!     "login",
//!     &[load.into(), Chain::paths([("success", vec![Chain::parallel([notify.into()])])])],
//! )?;
//! let trace = signal.run(&json!({"user": "ada"})).await?;
//! ```

mod action;
mod analyze;
mod chain;
mod error;
mod executor;
mod signal;
mod state;
mod trace;
mod trace_log;
mod tree;

pub use action::{
    Action, ActionCatalog, Args, AsyncStep, Outcome, StepError, StepFuture, StepResult, SyncStep,
};
pub use analyze::analyze;
pub use chain::{chain_from_json, Chain};
pub use error::{DefinitionError, SignalError, SignalResult};
pub use signal::{Engine, RunMonitor, Signal, SignalRun};
pub use state::{Mutation, MutationKind, StateReader, StateWriter};
pub use trace::{BranchRecord, BranchTrace, SignalTrace, TraceNode};
pub use trace_log::TraceLog;
pub use tree::{format_path, BranchNode, BranchSpec, PathSegment, Tree};

pub use signal_config::{EngineConfig, StepErrorPolicy};
pub use signal_state_store::{SharedStateStore, StatePath, StateStore, StoreError, TreeStore};
