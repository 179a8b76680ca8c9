//! Signal definitions
//!
//! A definition is an ordered list of [`Chain`] items. Items of the top-level
//! list run one after another; the members of a nested [`Chain::Parallel`]
//! run concurrently. An output map ([`Chain::Paths`]) directly after an action
//! says which list runs next for each output the action can take.

use crate::action::{Action, ActionCatalog};
use indexmap::IndexMap;
use serde_json::Value;

/// One item of a signal definition
#[derive(Debug, Clone)]
pub enum Chain {
    /// A step
    Action(Action),

    /// Members that run concurrently with each other
    Parallel(Vec<Chain>),

    /// Output name to the list that runs when the preceding action takes it
    Paths(IndexMap<String, Vec<Chain>>),

    /// A reference to an action name that could not be resolved
    Unresolved(String),

    /// Any other data
    Invalid(Value),
}

impl Chain {
    /// Group members to run concurrently
    pub fn parallel(members: impl IntoIterator<Item = Chain>) -> Self {
        Chain::Parallel(members.into_iter().collect())
    }

    /// Build an output map
    pub fn paths<I, K>(paths: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<Chain>)>,
        K: Into<String>,
    {
        Chain::Paths(paths.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build one item from JSON, resolving action names in `catalog`
    ///
    /// Strings name actions, arrays are concurrent groups and objects whose
    /// values are all arrays are output maps. Everything else is kept as
    /// [`Chain::Invalid`] so validation can report where it is.
    pub fn from_json(value: &Value, catalog: &ActionCatalog) -> Self {
        match value {
            Value::String(name) => match catalog.get(name) {
                Some(action) => Chain::Action(action.clone()),
                None => Chain::Unresolved(name.clone()),
            },
            Value::Array(items) => {
                Chain::Parallel(items.iter().map(|v| Chain::from_json(v, catalog)).collect())
            }
            Value::Object(map) if map.values().all(Value::is_array) => Chain::Paths(
                map.iter()
                    .map(|(key, list)| (key.clone(), chain_from_json(list, catalog)))
                    .collect(),
            ),
            other => Chain::Invalid(other.clone()),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Chain::Action(action) => format!("action '{}'", action.name()),
            Chain::Parallel(_) => "sequence".to_string(),
            Chain::Paths(_) => "output map".to_string(),
            Chain::Unresolved(name) => format!("unresolved '{}'", name),
            Chain::Invalid(value) => describe_value(value).to_string(),
        }
    }
}

impl From<Action> for Chain {
    fn from(action: Action) -> Self {
        Chain::Action(action)
    }
}

impl From<&Action> for Chain {
    fn from(action: &Action) -> Self {
        Chain::Action(action.clone())
    }
}

/// Build a top-level definition from a JSON array
///
/// A non-array value becomes a one-item definition.
pub fn chain_from_json(value: &Value, catalog: &ActionCatalog) -> Vec<Chain> {
    match value {
        Value::Array(items) => items.iter().map(|v| Chain::from_json(v, catalog)).collect(),
        other => vec![Chain::from_json(other, catalog)],
    }
}

pub(crate) fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Outcome;
    use serde_json::json;

    fn catalog() -> ActionCatalog {
        [
            Action::sync("load", |_, _| Ok(Outcome::next())),
            Action::sync("save", |_, _| Ok(Outcome::next())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_from_json() {
        let catalog = catalog();
        let chain = chain_from_json(
            &json!(["load", {"success": ["save"], "error": []}, ["load"], "lod", 4]),
            &catalog,
        );

        assert_eq!(chain.len(), 5);
        assert!(matches!(&chain[0], Chain::Action(a) if a.name() == "load"));
        match &chain[1] {
            Chain::Paths(paths) => {
                assert_eq!(paths.len(), 2);
                assert!(matches!(&paths["success"][0], Chain::Action(a) if a.name() == "save"));
                assert!(paths["error"].is_empty());
            }
            other => panic!("Expected output map, got {:?}", other),
        }
        assert!(matches!(&chain[2], Chain::Parallel(m) if m.len() == 1));
        assert!(matches!(&chain[3], Chain::Unresolved(n) if n == "lod"));
        assert!(matches!(&chain[4], Chain::Invalid(v) if *v == json!(4)));
    }

    #[test]
    fn test_object_with_non_list_value_is_invalid() {
        let chain = Chain::from_json(&json!({"success": "save"}), &catalog());
        assert!(matches!(chain, Chain::Invalid(_)));
    }

    #[test]
    fn test_same_name_resolves_to_same_action() {
        let chain = chain_from_json(&json!(["load", "load"]), &catalog());
        match (&chain[0], &chain[1]) {
            (Chain::Action(a), Chain::Action(b)) => assert!(a.same_as(b)),
            _ => panic!("Expected two actions"),
        }
    }
}
