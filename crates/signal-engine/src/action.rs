//! Actions and their outcomes
//!
//! An action is one unit of business logic. Sync actions run on the calling
//! control flow, may mutate state and must return before the run continues.
//! Async actions may suspend, run concurrently with their group siblings and
//! only get read access to state.

use crate::state::{StateReader, StateWriter};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Arguments shared by every step of a run
pub type Args = Map<String, Value>;

/// Error returned by a step body
pub type StepError = anyhow::Error;

/// Result of one step invocation
pub type StepResult = Result<Outcome, StepError>;

/// Future returned by an async step
pub type StepFuture = Pin<Box<dyn Future<Output = StepResult> + Send + 'static>>;

/// Body of a sync action
pub trait SyncStep: Send + Sync {
    fn run(&self, args: &Args, state: &mut StateWriter<'_>) -> StepResult;
}

impl<F> SyncStep for F
where
    F: Fn(&Args, &mut StateWriter<'_>) -> StepResult + Send + Sync,
{
    fn run(&self, args: &Args, state: &mut StateWriter<'_>) -> StepResult {
        self(args, state)
    }
}

/// Body of an async action
pub trait AsyncStep: Send + Sync {
    fn run(&self, args: Args, state: StateReader) -> StepFuture;
}

struct AsyncFn<F>(F);

impl<F, Fut> AsyncStep for AsyncFn<F>
where
    F: Fn(Args, StateReader) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn run(&self, args: Args, state: StateReader) -> StepFuture {
        Box::pin((self.0)(args, state))
    }
}

#[derive(Clone)]
pub(crate) enum ActionKind {
    Sync(Arc<dyn SyncStep>),
    Async(Arc<dyn AsyncStep>),
}

#[derive(Clone)]
struct ActionInner {
    name: String,
    outputs: Vec<String>,
    default_output: Option<String>,
    kind: ActionKind,
}

/// A named step that can be placed in signal definitions
///
/// Cloning an action keeps its identity: every clone refers to the same step
/// and shares one slot in a compiled action table.
#[derive(Clone)]
pub struct Action {
    inner: Arc<ActionInner>,
}

impl Action {
    /// Create a sync action from a closure
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Args, &mut StateWriter<'_>) -> StepResult + Send + Sync + 'static,
    {
        Self::from_kind(name, ActionKind::Sync(Arc::new(f)))
    }

    /// Create an async action from a closure returning a future
    pub fn asynchronous<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args, StateReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        Self::from_kind(name, ActionKind::Async(Arc::new(AsyncFn(f))))
    }

    /// Create a sync action from a step implementation
    pub fn from_sync_step(name: impl Into<String>, step: impl SyncStep + 'static) -> Self {
        Self::from_kind(name, ActionKind::Sync(Arc::new(step)))
    }

    /// Create an async action from a step implementation
    pub fn from_async_step(name: impl Into<String>, step: impl AsyncStep + 'static) -> Self {
        Self::from_kind(name, ActionKind::Async(Arc::new(step)))
    }

    fn from_kind(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            inner: Arc::new(ActionInner {
                name: name.into(),
                outputs: Vec::new(),
                default_output: None,
                kind,
            }),
        }
    }

    /// Declare the named outputs this action may take
    ///
    /// Returns a new action; handles cloned before this call are a different
    /// action.
    pub fn with_outputs<I, S>(self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = (*self.inner).clone();
        inner.outputs = outputs.into_iter().map(Into::into).collect();
        if let Some(default) = &inner.default_output {
            if !inner.outputs.contains(default) {
                inner.outputs.push(default.clone());
            }
        }
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Output taken when the step finishes without naming one
    pub fn with_default_output(self, output: impl Into<String>) -> Self {
        let mut inner = (*self.inner).clone();
        let output = output.into();
        if !inner.outputs.is_empty() && !inner.outputs.contains(&output) {
            inner.outputs.push(output.clone());
        }
        inner.default_output = Some(output);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn outputs(&self) -> &[String] {
        &self.inner.outputs
    }

    pub fn default_output(&self) -> Option<&str> {
        self.inner.default_output.as_deref()
    }

    pub fn is_async(&self) -> bool {
        matches!(self.inner.kind, ActionKind::Async(_))
    }

    /// Whether this action may take `output`
    ///
    /// Actions that declare no outputs accept any output name.
    pub fn declares(&self, output: &str) -> bool {
        self.inner.outputs.is_empty() || self.inner.outputs.iter().any(|o| o == output)
    }

    /// Identity comparison
    pub fn same_as(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn kind(&self) -> &ActionKind {
        &self.inner.kind
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.inner.name)
            .field("async", &self.is_async())
            .field("outputs", &self.inner.outputs)
            .field("default_output", &self.inner.default_output)
            .finish()
    }
}

/// What a step hands back when it finishes
///
/// `path` names the output to continue through; `payload` is merged into the
/// run's shared arguments when it is an object.
///
/// ```
/// use serde_json::json;
/// use signal_engine::Outcome;
///
/// let outcome = Outcome::success(json!({"user": "ada"})).with("retries", 0);
/// assert_eq!(outcome.path.as_deref(), Some("success"));
/// assert_eq!(outcome.payload, json!({"user": "ada", "retries": 0}));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub path: Option<String>,
    pub payload: Value,
}

impl Outcome {
    /// Continue without naming an output and without a payload
    pub fn next() -> Self {
        Self::default()
    }

    /// Continue without naming an output
    pub fn with_payload(payload: Value) -> Self {
        Self {
            path: None,
            payload,
        }
    }

    /// Take the named output
    pub fn path(name: impl Into<String>) -> Self {
        Self {
            path: Some(name.into()),
            payload: Value::Null,
        }
    }

    /// Take the named output with a payload
    pub fn path_with(name: impl Into<String>, payload: Value) -> Self {
        Self {
            path: Some(name.into()),
            payload,
        }
    }

    pub fn success(payload: Value) -> Self {
        Self::path_with("success", payload)
    }

    pub fn error(payload: Value) -> Self {
        Self::path_with("error", payload)
    }

    /// Add one key to the payload
    ///
    /// A payload that is not an object is kept under `"value"`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match self.payload.take() {
            Value::Object(map) => self.payload = Value::Object(map),
            Value::Null => self.payload = Value::Object(Map::new()),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                self.payload = Value::Object(map);
            }
        }
        if let Value::Object(map) = &mut self.payload {
            map.insert(key.into(), value.into());
        }
        self
    }
}

/// Actions addressable by name, used to build definitions from data
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: IndexMap<String, Action>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under its own name, replacing any previous one
    pub fn register(&mut self, action: Action) -> &mut Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<Action> for ActionCatalog {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for action in iter {
            catalog.register(action);
        }
        catalog
    }
}
