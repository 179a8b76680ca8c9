//! Path-addressable state tree for signal runs
//!
//! This crate provides the [`StateStore`] trait that the signal engine reads
//! and mutates through, and [`TreeStore`], an in-memory implementation over a
//! single JSON tree. Any store honoring the trait can back a signal engine.

mod error;
mod path;

pub use error::{StoreError, StoreResult};
pub use path::StatePath;

use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{instrument, trace};

/// Transformation applied in place by [`StateStore::apply`]
pub type ApplyFn<'a> = Box<dyn FnOnce(Value) -> Value + Send + 'a>;

/// A tree-shaped, path-addressable mutable store
///
/// Readers return owned copies so callers never hold a lock. Mutators return
/// the value now stored at the path, except `unset` and `splice`, which
/// return what was removed.
pub trait StateStore: Send + Sync {
    /// Get a copy of the value at `path`
    fn get(&self, path: &StatePath) -> Option<Value>;

    /// Check whether a value exists at `path`
    fn exists(&self, path: &StatePath) -> bool;

    /// Replace the value at `path`, creating intermediate objects
    fn set(&self, path: &StatePath, value: Value) -> StoreResult<Value>;

    /// Shallow-merge an object into the object at `path`
    fn merge(&self, path: &StatePath, value: Value) -> StoreResult<Value>;

    /// Recursively merge an object into the object at `path`
    fn deep_merge(&self, path: &StatePath, value: Value) -> StoreResult<Value>;

    /// Append all `items` to the array at `path`
    fn concat(&self, path: &StatePath, items: Vec<Value>) -> StoreResult<Value>;

    /// Remove the value at `path`, returning it (or null)
    fn unset(&self, path: &StatePath) -> StoreResult<Value>;

    /// Append one item to the array at `path`
    fn push(&self, path: &StatePath, value: Value) -> StoreResult<Value>;

    /// Remove `delete_count` items at `start` and insert `items` in their place
    fn splice(
        &self,
        path: &StatePath,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> StoreResult<Value>;

    /// Prepend one item to the array at `path`
    fn unshift(&self, path: &StatePath, value: Value) -> StoreResult<Value>;

    /// Replace the value at `path` with `f(current)`
    fn apply(&self, path: &StatePath, f: ApplyFn<'_>) -> StoreResult<Value>;
}

/// Thread-safe handle to any state store
pub type SharedStateStore = Arc<dyn StateStore>;

/// In-memory state store over a single JSON tree
///
/// The root is always an object. All operations take the tree lock for their
/// whole duration, so concurrent runs never observe a half-applied mutation.
pub struct TreeStore {
    root: RwLock<Value>,
}

impl TreeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_state(Value::Object(Map::new()))
    }

    /// Create a store seeded with an initial tree
    ///
    /// A non-object seed is replaced by an empty object.
    pub fn with_state(initial: Value) -> Self {
        let root = if initial.is_object() {
            initial
        } else {
            Value::Object(Map::new())
        };
        Self {
            root: RwLock::new(root),
        }
    }

    /// Wrap in an `Arc` for sharing across signals
    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Value {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for TreeStore {
    fn get(&self, path: &StatePath) -> Option<Value> {
        lookup(&self.read(), path).cloned()
    }

    fn exists(&self, path: &StatePath) -> bool {
        lookup(&self.read(), path).is_some()
    }

    #[instrument(level = "trace", skip(self, value), fields(path = %path))]
    fn set(&self, path: &StatePath, value: Value) -> StoreResult<Value> {
        if path.is_root() && !value.is_object() {
            return Err(StoreError::InvalidArgument {
                method: "set",
                expected: "an object when setting the root",
            });
        }
        let mut root = self.write();
        let slot = slot_mut(&mut root, path)?;
        *slot = value;
        Ok(slot.clone())
    }

    #[instrument(level = "trace", skip(self, value), fields(path = %path))]
    fn merge(&self, path: &StatePath, value: Value) -> StoreResult<Value> {
        let Value::Object(source) = value else {
            return Err(StoreError::InvalidArgument {
                method: "merge",
                expected: "an object",
            });
        };
        let mut root = self.write();
        let slot = object_slot(&mut root, path)?;
        if let Value::Object(target) = &mut *slot {
            target.extend(source);
        }
        Ok(slot.clone())
    }

    #[instrument(level = "trace", skip(self, value), fields(path = %path))]
    fn deep_merge(&self, path: &StatePath, value: Value) -> StoreResult<Value> {
        if !value.is_object() {
            return Err(StoreError::InvalidArgument {
                method: "deep_merge",
                expected: "an object",
            });
        }
        let mut root = self.write();
        let slot = object_slot(&mut root, path)?;
        deep_merge_into(slot, value);
        Ok(slot.clone())
    }

    #[instrument(level = "trace", skip(self, items), fields(path = %path))]
    fn concat(&self, path: &StatePath, items: Vec<Value>) -> StoreResult<Value> {
        let mut root = self.write();
        let slot = array_slot(&mut root, path)?;
        if let Value::Array(target) = &mut *slot {
            target.extend(items);
        }
        Ok(slot.clone())
    }

    #[instrument(level = "trace", skip(self), fields(path = %path))]
    fn unset(&self, path: &StatePath) -> StoreResult<Value> {
        let mut root = self.write();
        let Some((parent, key)) = path.split_last() else {
            return Ok(std::mem::replace(&mut *root, Value::Object(Map::new())));
        };
        let removed = match lookup_mut(&mut root, &parent) {
            Some(Value::Object(map)) => map.remove(key),
            Some(Value::Array(items)) => match key.parse::<usize>() {
                Ok(index) if index < items.len() => Some(items.remove(index)),
                _ => None,
            },
            _ => None,
        };
        trace!(removed = removed.is_some(), "Unset state path");
        Ok(removed.unwrap_or(Value::Null))
    }

    #[instrument(level = "trace", skip(self, value), fields(path = %path))]
    fn push(&self, path: &StatePath, value: Value) -> StoreResult<Value> {
        let mut root = self.write();
        let slot = array_slot(&mut root, path)?;
        if let Value::Array(target) = &mut *slot {
            target.push(value);
        }
        Ok(slot.clone())
    }

    #[instrument(level = "trace", skip(self, items), fields(path = %path))]
    fn splice(
        &self,
        path: &StatePath,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> StoreResult<Value> {
        let mut root = self.write();
        let slot = array_slot(&mut root, path)?;
        let Value::Array(target) = slot else {
            return Ok(Value::Array(Vec::new()));
        };
        let start = start.min(target.len());
        let end = start.saturating_add(delete_count).min(target.len());
        let removed: Vec<Value> = target.splice(start..end, items).collect();
        Ok(Value::Array(removed))
    }

    #[instrument(level = "trace", skip(self, value), fields(path = %path))]
    fn unshift(&self, path: &StatePath, value: Value) -> StoreResult<Value> {
        let mut root = self.write();
        let slot = array_slot(&mut root, path)?;
        if let Value::Array(target) = &mut *slot {
            target.insert(0, value);
        }
        Ok(slot.clone())
    }

    #[instrument(level = "trace", skip(self, f), fields(path = %path))]
    fn apply(&self, path: &StatePath, f: ApplyFn<'_>) -> StoreResult<Value> {
        let mut root = self.write();
        let slot = slot_mut(&mut root, path)?;
        let current = std::mem::take(slot);
        *slot = f(current);
        if path.is_root() && !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        Ok(slot.clone())
    }
}

/// Resolve a path without creating anything
fn lookup<'a>(root: &'a Value, path: &StatePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, key| match current {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn lookup_mut<'a>(root: &'a mut Value, path: &StatePath) -> Option<&'a mut Value> {
    let mut current = root;
    for key in path.segments() {
        current = match current {
            Value::Object(map) => map.get_mut(key)?,
            Value::Array(items) => items.get_mut(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a path for writing, creating objects for missing keys
///
/// An array index equal to the array length appends a new element.
fn slot_mut<'a>(root: &'a mut Value, path: &StatePath) -> StoreResult<&'a mut Value> {
    let mut current = root;
    for (depth, key) in path.segments().iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
            Value::Array(items) => {
                let index = key
                    .parse::<usize>()
                    .ok()
                    .filter(|index| *index <= items.len())
                    .ok_or_else(|| StoreError::InvalidIndex {
                        path: path.prefix(depth),
                        segment: key.clone(),
                    })?;
                if index == items.len() {
                    items.push(Value::Null);
                }
                &mut items[index]
            }
            _ => {
                return Err(StoreError::NotAContainer {
                    path: path.prefix(depth),
                })
            }
        };
    }
    Ok(current)
}

fn object_slot<'a>(root: &'a mut Value, path: &StatePath) -> StoreResult<&'a mut Value> {
    let slot = slot_mut(root, path)?;
    match *slot {
        Value::Null => *slot = Value::Object(Map::new()),
        Value::Object(_) => {}
        _ => {
            return Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: "an object",
            })
        }
    }
    Ok(slot)
}

fn array_slot<'a>(root: &'a mut Value, path: &StatePath) -> StoreResult<&'a mut Value> {
    let slot = slot_mut(root, path)?;
    match *slot {
        Value::Null => *slot = Value::Array(Vec::new()),
        Value::Array(_) => {}
        _ => {
            return Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: "an array",
            })
        }
    }
    Ok(slot)
}

fn deep_merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                let nested = value.is_object() && target.get(&key).is_some_and(Value::is_object);
                match target.get_mut(&key) {
                    Some(existing) if nested => deep_merge_into(existing, value),
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}
