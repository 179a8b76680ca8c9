//! State access for steps
//!
//! Async steps get a [`StateReader`], which has no mutators at all. Sync
//! steps get a [`StateWriter`], which adds the mutators and records every
//! call in the step's mutation log before handing it to the store. A sync
//! step placed in a concurrent group gets a read-only writer whose mutators
//! fail with [`StoreError::ReadOnly`] and leave the log untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use signal_state_store::{SharedStateStore, StatePath, StateStore, StoreError, StoreResult};

/// Which mutator was called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Set,
    Merge,
    DeepMerge,
    Concat,
    Unset,
    Push,
    Splice,
    Unshift,
    Apply,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Set => "set",
            MutationKind::Merge => "merge",
            MutationKind::DeepMerge => "deep_merge",
            MutationKind::Concat => "concat",
            MutationKind::Unset => "unset",
            MutationKind::Push => "push",
            MutationKind::Splice => "splice",
            MutationKind::Unshift => "unshift",
            MutationKind::Apply => "apply",
        }
    }
}

/// One recorded mutator call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub name: MutationKind,
    pub path: StatePath,
    pub args: Vec<Value>,
}

/// Read-only state view
#[derive(Clone)]
pub struct StateReader {
    store: SharedStateStore,
}

impl StateReader {
    pub(crate) fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    pub fn get(&self, path: impl Into<StatePath>) -> Option<Value> {
        self.store.get(&path.into())
    }

    pub fn exists(&self, path: impl Into<StatePath>) -> bool {
        self.store.exists(&path.into())
    }
}

/// Read-write state view for one sync step
pub struct StateWriter<'a> {
    store: &'a dyn StateStore,
    mutations: &'a mut Vec<Mutation>,
    writable: bool,
}

impl<'a> StateWriter<'a> {
    pub(crate) fn new(store: &'a dyn StateStore, mutations: &'a mut Vec<Mutation>) -> Self {
        Self {
            store,
            mutations,
            writable: true,
        }
    }

    /// Writer for a sync step running inside a concurrent group
    pub(crate) fn read_only(store: &'a dyn StateStore, mutations: &'a mut Vec<Mutation>) -> Self {
        Self {
            store,
            mutations,
            writable: false,
        }
    }

    /// Whether mutators reach the store
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn get(&self, path: impl Into<StatePath>) -> Option<Value> {
        self.store.get(&path.into())
    }

    pub fn exists(&self, path: impl Into<StatePath>) -> bool {
        self.store.exists(&path.into())
    }

    pub fn set(&mut self, path: impl Into<StatePath>, value: impl Into<Value>) -> StoreResult<Value> {
        let path = path.into();
        let value = value.into();
        self.record(MutationKind::Set, &path, vec![value.clone()])?;
        self.store.set(&path, value)
    }

    pub fn merge(
        &mut self,
        path: impl Into<StatePath>,
        value: impl Into<Value>,
    ) -> StoreResult<Value> {
        let path = path.into();
        let value = value.into();
        self.record(MutationKind::Merge, &path, vec![value.clone()])?;
        self.store.merge(&path, value)
    }

    pub fn deep_merge(
        &mut self,
        path: impl Into<StatePath>,
        value: impl Into<Value>,
    ) -> StoreResult<Value> {
        let path = path.into();
        let value = value.into();
        self.record(MutationKind::DeepMerge, &path, vec![value.clone()])?;
        self.store.deep_merge(&path, value)
    }

    pub fn concat<I>(&mut self, path: impl Into<StatePath>, items: I) -> StoreResult<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let path = path.into();
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        self.record(MutationKind::Concat, &path, items.clone())?;
        self.store.concat(&path, items)
    }

    pub fn unset(&mut self, path: impl Into<StatePath>) -> StoreResult<Value> {
        let path = path.into();
        self.record(MutationKind::Unset, &path, Vec::new())?;
        self.store.unset(&path)
    }

    pub fn push(&mut self, path: impl Into<StatePath>, value: impl Into<Value>) -> StoreResult<Value> {
        let path = path.into();
        let value = value.into();
        self.record(MutationKind::Push, &path, vec![value.clone()])?;
        self.store.push(&path, value)
    }

    pub fn splice<I>(
        &mut self,
        path: impl Into<StatePath>,
        start: usize,
        delete_count: usize,
        items: I,
    ) -> StoreResult<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let path = path.into();
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let mut args = vec![Value::from(start), Value::from(delete_count)];
        args.extend(items.iter().cloned());
        self.record(MutationKind::Splice, &path, args)?;
        self.store.splice(&path, start, delete_count, items)
    }

    pub fn unshift(
        &mut self,
        path: impl Into<StatePath>,
        value: impl Into<Value>,
    ) -> StoreResult<Value> {
        let path = path.into();
        let value = value.into();
        self.record(MutationKind::Unshift, &path, vec![value.clone()])?;
        self.store.unshift(&path, value)
    }

    /// Replace the value at `path` with `f(current)`
    ///
    /// The closure itself is not recorded, only the call.
    pub fn apply<F>(&mut self, path: impl Into<StatePath>, f: F) -> StoreResult<Value>
    where
        F: FnOnce(Value) -> Value + Send,
    {
        let path = path.into();
        self.record(MutationKind::Apply, &path, Vec::new())?;
        self.store.apply(&path, Box::new(f))
    }

    /// Mutations recorded so far by this step
    pub fn mutations(&self) -> &[Mutation] {
        self.mutations.as_slice()
    }

    fn record(&mut self, name: MutationKind, path: &StatePath, args: Vec<Value>) -> StoreResult<()> {
        if !self.writable {
            return Err(StoreError::ReadOnly {
                method: name.as_str(),
                path: path.clone(),
            });
        }
        self.mutations.push(Mutation {
            name,
            path: path.clone(),
            args,
        });
        Ok(())
    }
}
