//! Signal factory
//!
//! An [`Engine`] turns definitions into [`Signal`]s. Each signal is checked
//! and compiled once; every run gets its own trace state.

use crate::action::Args;
use crate::analyze::analyze;
use crate::chain::{describe_value, Chain};
use crate::error::{DefinitionError, SignalError, SignalResult};
use crate::executor::RunContext;
use crate::trace::{RunState, SignalTrace};
use crate::trace_log::TraceLog;
use crate::tree::Tree;
use serde::Serialize;
use serde_json::Value;
use signal_config::{EngineConfig, StepErrorPolicy};
use signal_state_store::{SharedStateStore, TreeStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tracing::{debug, info_span, Instrument};
use ulid::Ulid;

type RunFuture = Pin<Box<dyn Future<Output = SignalResult<SignalTrace>> + Send>>;

/// Creates signals bound to one state store
pub struct Engine {
    store: SharedStateStore,
    config: EngineConfig,
    traces: Arc<TraceLog>,
}

impl Engine {
    pub fn new(store: SharedStateStore, config: EngineConfig) -> Self {
        let traces = Arc::new(TraceLog::from_config(&config));
        Self {
            store,
            config,
            traces,
        }
    }

    /// Engine with the default configuration
    pub fn with_store(store: SharedStateStore) -> Self {
        Self::new(store, EngineConfig::default())
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Completed traces of every signal created by this engine
    pub fn traces(&self) -> &Arc<TraceLog> {
        &self.traces
    }

    /// Validate and compile a definition into a runnable signal
    pub fn create(
        &self,
        name: impl Into<String>,
        definition: &[Chain],
    ) -> Result<Signal, DefinitionError> {
        let name = name.into();
        analyze(&name, definition)?;

        let tree = Tree::compile(definition);
        debug!(
            signal = %name,
            branches = tree.len(),
            actions = tree.actions().len(),
            "Compiled signal"
        );

        Ok(Signal {
            name: name.into(),
            tree: Arc::new(tree),
            store: self.store.clone(),
            policy: self.config.on_step_error,
            traces: self.traces.clone(),
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_store(TreeStore::new().shared())
    }
}

/// A compiled, runnable signal
#[derive(Clone)]
pub struct Signal {
    name: Arc<str>,
    tree: Arc<Tree>,
    store: SharedStateStore,
    policy: StepErrorPolicy,
    traces: Arc<TraceLog>,
}

impl Signal {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Start a run
    ///
    /// Arguments are converted to a JSON object up front; anything that does
    /// not serialize to an object (or `null`, meaning no arguments) is
    /// rejected before any step runs. The run makes progress when the
    /// returned [`SignalRun`] is polled.
    pub fn start<T: Serialize + ?Sized>(&self, args: &T) -> SignalResult<SignalRun> {
        let args = self.prepare_args(args)?;
        let id = Ulid::new();
        let state = Arc::new(Mutex::new(RunState::new(
            id,
            self.name.as_ref(),
            args,
            self.tree.len(),
        )));

        let context = RunContext::new(
            self.name.as_ref(),
            id,
            self.tree.clone(),
            self.store.clone(),
            self.policy,
            state.clone(),
        );
        let traces = self.traces.clone();
        let span = info_span!("signal", signal = %self.name, run_id = %id);
        let future = async move {
            let trace = context.execute().await?;
            traces.record(trace.clone());
            Ok(trace)
        }
        .instrument(span);

        Ok(SignalRun {
            id,
            monitor: RunMonitor {
                tree: self.tree.clone(),
                state,
            },
            future: Box::pin(future),
        })
    }

    /// Run to completion
    pub async fn run<T: Serialize + ?Sized>(&self, args: &T) -> SignalResult<SignalTrace> {
        self.start(args)?.await
    }

    fn prepare_args<T: Serialize + ?Sized>(&self, args: &T) -> SignalResult<Args> {
        match serde_json::to_value(args) {
            Ok(Value::Object(args)) => Ok(args),
            Ok(Value::Null) => Ok(Args::new()),
            Ok(other) => Err(SignalError::ArgsNotObject {
                signal: self.name.to_string(),
                found: describe_value(&other).to_string(),
            }),
            Err(source) => Err(SignalError::InvalidArgs {
                signal: self.name.to_string(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("branches", &self.tree.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Live view of a run's trace
#[derive(Clone)]
pub struct RunMonitor {
    tree: Arc<Tree>,
    state: Arc<Mutex<RunState>>,
}

impl RunMonitor {
    pub fn snapshot(&self) -> SignalTrace {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(&self.tree)
    }

    pub fn is_executing(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_executing
    }
}

/// A started run
///
/// Resolves to the completed trace. It can be awaited directly, spawned, or
/// inspected while pending through [`SignalRun::snapshot`].
pub struct SignalRun {
    id: Ulid,
    monitor: RunMonitor,
    future: RunFuture,
}

impl SignalRun {
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn snapshot(&self) -> SignalTrace {
        self.monitor.snapshot()
    }

    pub fn is_executing(&self) -> bool {
        self.monitor.is_executing()
    }

    /// A handle that outlives the run future, e.g. once it is spawned
    pub fn monitor(&self) -> RunMonitor {
        self.monitor.clone()
    }

    pub async fn finish(self) -> SignalResult<SignalTrace> {
        self.await
    }
}

impl Future for SignalRun {
    type Output = SignalResult<SignalTrace>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}
