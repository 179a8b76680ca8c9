//! Branch executor
//!
//! Walks a compiled [`Tree`] for one run. Sync branches run one after another
//! on the run's task. The members of a group are all started before any of
//! them is awaited, then joined; each member merges its payload and follows
//! its nested outputs as soon as it completes. An async action in a sequential
//! list runs as a group of one. A sync action in a group runs its body when
//! the group starts, with read-only state.

use crate::action::{ActionKind, Args, Outcome, StepError, StepFuture, SyncStep};
use crate::error::{SignalError, SignalResult};
use crate::state::{StateReader, StateWriter};
use crate::trace::{BranchTrace, RunState, SignalTrace};
use crate::tree::{format_path, BranchNode, Tree};
use anyhow::anyhow;
use futures::future::{self, try_join_all};
use serde_json::{json, Value};
use signal_config::StepErrorPolicy;
use signal_state_store::SharedStateStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, error, trace, warn};
use ulid::Ulid;

type ListFuture<'a> = Pin<Box<dyn Future<Output = SignalResult<()>> + Send + 'a>>;

/// Everything one run needs, threaded through the walk
pub(crate) struct RunContext {
    signal: String,
    run_id: Ulid,
    tree: Arc<Tree>,
    store: SharedStateStore,
    policy: StepErrorPolicy,
    state: Arc<Mutex<RunState>>,
}

impl RunContext {
    pub(crate) fn new(
        signal: impl Into<String>,
        run_id: Ulid,
        tree: Arc<Tree>,
        store: SharedStateStore,
        policy: StepErrorPolicy,
        state: Arc<Mutex<RunState>>,
    ) -> Self {
        Self {
            signal: signal.into(),
            run_id,
            tree,
            store,
            policy,
            state,
        }
    }

    /// Run the whole tree and return the completed trace
    pub(crate) async fn execute(self) -> SignalResult<SignalTrace> {
        let started = Instant::now();
        debug!(signal = %self.signal, run_id = %self.run_id, "Running signal");

        if let Err(err) = self.run_list(self.tree.branches()).await {
            self.close(started);
            debug!(signal = %self.signal, run_id = %self.run_id, error = %err, "Signal rejected");
            return Err(err);
        }

        let trace = {
            let mut state = self.lock();
            state.is_executing = false;
            state.duration = Some(elapsed_ms(started));
            state.snapshot(&self.tree)
        };

        debug!(
            signal = %self.signal,
            run_id = %self.run_id,
            duration_ms = trace.duration,
            "Signal completed"
        );
        Ok(trace)
    }

    fn run_list<'a>(&'a self, nodes: &'a [BranchNode]) -> ListFuture<'a> {
        Box::pin(async move {
            for node in nodes {
                match node {
                    BranchNode::Branch(id) => match self.tree.action(*id).kind() {
                        ActionKind::Sync(step) => self.run_sync(*id, step.as_ref()).await?,
                        ActionKind::Async(_) => self.run_group(std::slice::from_ref(id)).await?,
                    },
                    BranchNode::Group(ids) => self.run_group(ids).await?,
                }
            }
            Ok(())
        })
    }

    async fn run_sync(&self, id: usize, step: &dyn SyncStep) -> SignalResult<()> {
        let args = self.begin(id);
        let started = Instant::now();

        let mut mutations = Vec::new();
        let result = {
            let mut writer = StateWriter::new(self.store.as_ref(), &mut mutations);
            step.run(&args, &mut writer)
        };
        self.lock().branches[id].mutations = mutations;

        let resolved = result.and_then(|outcome| {
            let output_path = self
                .resolve_output(id, &outcome)
                .map_err(|output| anyhow!("took undeclared output '{}'", output))?;
            Ok((output_path, outcome.payload))
        });

        match resolved {
            Ok((output_path, payload)) => {
                self.finish(id, output_path.clone(), payload, started);
                self.follow(id, output_path.as_deref()).await
            }
            Err(err) => self.step_failed(id, err, started).await,
        }
    }

    async fn step_failed(&self, id: usize, err: StepError, started: Instant) -> SignalResult<()> {
        let spec = self.tree.spec(id);
        let message = format!("{:#}", err);

        match self.policy {
            StepErrorPolicy::Stall => {
                error!(
                    signal = %self.signal,
                    run_id = %self.run_id,
                    step = %spec.name,
                    path = %format_path(&spec.path),
                    error = %message,
                    "Step failed, run will not complete"
                );
                future::pending().await
            }
            StepErrorPolicy::ErrorOutput if self.tree.action(id).declares("error") => {
                warn!(
                    signal = %self.signal,
                    run_id = %self.run_id,
                    step = %spec.name,
                    error = %message,
                    "Step failed, taking error output"
                );
                let outcome = Outcome::error(json!({ "error": message }));
                self.finish(id, outcome.path.clone(), outcome.payload, started);
                self.follow(id, Some("error")).await
            }
            StepErrorPolicy::Reject | StepErrorPolicy::ErrorOutput => {
                warn!(
                    signal = %self.signal,
                    run_id = %self.run_id,
                    step = %spec.name,
                    error = %message,
                    "Step failed, rejecting run"
                );
                self.abandon(id, started);
                Err(SignalError::StepFailed {
                    signal: self.signal.clone(),
                    step: spec.name.clone(),
                    position: format_path(&spec.path),
                    message,
                })
            }
        }
    }

    async fn run_group(&self, ids: &[usize]) -> SignalResult<()> {
        trace!(signal = %self.signal, members = ids.len(), "Starting group");

        let started: Vec<(usize, Instant, StepFuture)> =
            ids.iter().map(|&id| self.start_async(id)).collect();

        try_join_all(
            started
                .into_iter()
                .map(|(id, at, step)| self.settle_async(id, at, step)),
        )
        .await?;
        Ok(())
    }

    fn start_async(&self, id: usize) -> (usize, Instant, StepFuture) {
        let args = self.begin(id);
        let step = match self.tree.action(id).kind() {
            ActionKind::Async(step) => step.run(args, StateReader::new(self.store.clone())),
            ActionKind::Sync(step) => {
                let mut mutations = Vec::new();
                let mut reader = StateWriter::read_only(self.store.as_ref(), &mut mutations);
                Box::pin(future::ready(step.run(&args, &mut reader)))
            }
        };
        (id, Instant::now(), step)
    }

    async fn settle_async(&self, id: usize, started: Instant, step: StepFuture) -> SignalResult<()> {
        let spec = self.tree.spec(id);

        let outcome = match step.await {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = format!("{:#}", err);
                warn!(
                    signal = %self.signal,
                    run_id = %self.run_id,
                    step = %spec.name,
                    error = %message,
                    "Concurrent step failed"
                );
                self.abandon(id, started);
                return Err(SignalError::AsyncStepFailed {
                    signal: self.signal.clone(),
                    step: spec.name.clone(),
                    position: format_path(&spec.path),
                    message,
                });
            }
        };

        let output_path = match self.resolve_output(id, &outcome) {
            Ok(output_path) => output_path,
            Err(output) => {
                self.abandon(id, started);
                return Err(SignalError::UndeclaredOutput {
                    signal: self.signal.clone(),
                    step: spec.name.clone(),
                    position: format_path(&spec.path),
                    output,
                });
            }
        };

        self.finish(id, output_path.clone(), outcome.payload, started);
        self.follow(id, output_path.as_deref()).await
    }

    /// Snapshot the shared args into a fresh trace slot and mark it running
    fn begin(&self, id: usize) -> Args {
        let spec = self.tree.spec(id);
        trace!(
            signal = %self.signal,
            run_id = %self.run_id,
            step = %spec.name,
            path = %format_path(&spec.path),
            "Starting step"
        );

        let mut state = self.lock();
        let args = state.args.clone();
        state.branches[id] = BranchTrace {
            args: Some(args.clone()),
            is_executing: true,
            ..BranchTrace::default()
        };
        args
    }

    /// Output the step continues through, or the undeclared name it tried
    fn resolve_output(&self, id: usize, outcome: &Outcome) -> Result<Option<String>, String> {
        let action = self.tree.action(id);
        let output_path = outcome
            .path
            .clone()
            .or_else(|| action.default_output().map(str::to_string));

        match output_path {
            Some(output) if !action.declares(&output) => Err(output),
            other => Ok(other),
        }
    }

    fn finish(&self, id: usize, output_path: Option<String>, payload: Value, started: Instant) {
        let spec = self.tree.spec(id);
        let duration = elapsed_ms(started);
        let mut state = self.lock();

        match &payload {
            Value::Object(map) => {
                for (key, value) in map {
                    state.args.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => warn!(
                signal = %self.signal,
                step = %spec.name,
                payload = %other,
                "Ignoring payload that is not an object"
            ),
        }

        let branch = &mut state.branches[id];
        branch.output = (!payload.is_null()).then_some(payload);
        branch.output_path = output_path;
        branch.duration = Some(duration);
        branch.is_executing = false;
        branch.has_executed = true;

        debug!(
            signal = %self.signal,
            run_id = %self.run_id,
            step = %spec.name,
            output = branch.output_path.as_deref().unwrap_or("-"),
            duration_ms = duration,
            "Step completed"
        );
    }

    /// Stamp a rejected run as finished, including branches left unsettled
    fn close(&self, started: Instant) {
        let mut state = self.lock();
        state.is_executing = false;
        state.duration = Some(elapsed_ms(started));
        for branch in state.branches.iter_mut().filter(|b| b.is_executing) {
            branch.is_executing = false;
        }
    }

    fn abandon(&self, id: usize, started: Instant) {
        let mut state = self.lock();
        let branch = &mut state.branches[id];
        branch.duration = Some(elapsed_ms(started));
        branch.is_executing = false;
    }

    async fn follow(&self, id: usize, output_path: Option<&str>) -> SignalResult<()> {
        let Some(output) = output_path else {
            return Ok(());
        };
        let spec = self.tree.spec(id);
        let Some(nodes) = spec.outputs.as_ref().and_then(|outputs| outputs.get(output)) else {
            return Ok(());
        };

        trace!(signal = %self.signal, step = %spec.name, output, "Following output");
        self.run_list(nodes).await
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
