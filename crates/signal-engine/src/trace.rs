//! Run traces
//!
//! A run keeps one [`BranchTrace`] per compiled branch. A [`SignalTrace`]
//! merges those with the compiled tree into the nested shape callers and
//! tooling inspect.

use crate::action::Args;
use crate::state::Mutation;
use crate::tree::{BranchNode, PathSegment, Tree};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Per-run bookkeeping for one branch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchTrace {
    /// Shared arguments as the step saw them
    pub args: Option<Args>,

    /// Payload the step finished with
    pub output: Option<Value>,

    /// Step duration in milliseconds
    pub duration: Option<u64>,

    pub mutations: Vec<Mutation>,

    /// Output taken by the step
    pub output_path: Option<String>,

    pub is_executing: bool,
    pub has_executed: bool,
}

/// One branch of a [`SignalTrace`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    pub path: Vec<PathSegment>,
    pub is_async: bool,
    pub action_index: usize,

    #[serde(flatten)]
    pub run: BranchTrace,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<IndexMap<String, Vec<TraceNode>>>,
}

/// An item of a traced branch list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceNode {
    Branch(BranchRecord),
    Group(Vec<BranchRecord>),
}

/// Trace of one signal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTrace {
    pub id: String,
    pub name: String,
    pub args: Args,
    pub branches: Vec<TraceNode>,
    pub is_executing: bool,

    /// Run duration in milliseconds
    pub duration: Option<u64>,

    pub started_at: DateTime<Utc>,
}

impl SignalTrace {
    /// All branch records, depth first in definition order
    pub fn records(&self) -> Vec<&BranchRecord> {
        let mut records = Vec::new();
        collect(&self.branches, &mut records);
        records
    }

    /// First branch record with the given step name
    pub fn find(&self, name: &str) -> Option<&BranchRecord> {
        self.records().into_iter().find(|record| record.name == name)
    }
}

fn collect<'a>(nodes: &'a [TraceNode], records: &mut Vec<&'a BranchRecord>) {
    for node in nodes {
        match node {
            TraceNode::Branch(record) => visit(record, records),
            TraceNode::Group(members) => members.iter().for_each(|record| visit(record, records)),
        }
    }
}

fn visit<'a>(record: &'a BranchRecord, records: &mut Vec<&'a BranchRecord>) {
    records.push(record);
    if let Some(outputs) = &record.outputs {
        outputs.values().for_each(|nodes| collect(nodes, records));
    }
}

/// Mutable state of one run
#[derive(Debug)]
pub(crate) struct RunState {
    pub id: Ulid,
    pub name: String,
    pub args: Args,
    pub branches: Vec<BranchTrace>,
    pub is_executing: bool,
    pub duration: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub(crate) fn new(id: Ulid, name: impl Into<String>, args: Args, branch_count: usize) -> Self {
        Self {
            id,
            name: name.into(),
            args,
            branches: vec![BranchTrace::default(); branch_count],
            is_executing: true,
            duration: None,
            started_at: Utc::now(),
        }
    }

    pub(crate) fn snapshot(&self, tree: &Tree) -> SignalTrace {
        SignalTrace {
            id: self.id.to_string(),
            name: self.name.clone(),
            args: self.args.clone(),
            branches: self.nodes(tree, tree.branches()),
            is_executing: self.is_executing,
            duration: self.duration,
            started_at: self.started_at,
        }
    }

    fn nodes(&self, tree: &Tree, nodes: &[BranchNode]) -> Vec<TraceNode> {
        nodes
            .iter()
            .map(|node| match node {
                BranchNode::Branch(id) => TraceNode::Branch(self.record(tree, *id)),
                BranchNode::Group(ids) => {
                    TraceNode::Group(ids.iter().map(|id| self.record(tree, *id)).collect())
                }
            })
            .collect()
    }

    fn record(&self, tree: &Tree, id: usize) -> BranchRecord {
        let spec = tree.spec(id);
        BranchRecord {
            name: spec.name.clone(),
            path: spec.path.clone(),
            is_async: spec.is_async,
            action_index: spec.action_index,
            run: self.branches[id].clone(),
            outputs: spec.outputs.as_ref().map(|outputs| {
                outputs
                    .iter()
                    .map(|(key, nodes)| (key.clone(), self.nodes(tree, nodes)))
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Outcome};
    use crate::chain::Chain;
    use serde_json::json;

    fn sync(name: &str) -> Action {
        Action::sync(name, |_, _| Ok(Outcome::next()))
    }

    fn asynchronous(name: &str) -> Action {
        Action::asynchronous(name, |_, _| async { Ok(Outcome::next()) })
    }

    fn tree() -> Tree {
        Tree::compile(&[
            sync("load").into(),
            Chain::paths([("found", vec![sync("render").into()])]),
            Chain::parallel([asynchronous("notify").into(), asynchronous("audit").into()]),
        ])
    }

    #[test]
    fn test_snapshot_mirrors_tree_shape() {
        let tree = tree();
        let state = RunState::new(Ulid::new(), "page", Args::new(), tree.len());
        let trace = state.snapshot(&tree);

        assert!(trace.is_executing);
        assert_eq!(trace.branches.len(), 2);
        assert!(matches!(&trace.branches[1], TraceNode::Group(members) if members.len() == 2));

        let names: Vec<&str> = trace.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["load", "render", "notify", "audit"]);
        assert!(!trace.find("render").unwrap().run.has_executed);
        assert!(trace.find("missing").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let tree = tree();
        let mut state = RunState::new(Ulid::new(), "page", Args::new(), tree.len());
        state.branches[0].output_path = Some("found".to_string());
        state.branches[0].has_executed = true;

        let value = serde_json::to_value(state.snapshot(&tree)).unwrap();
        let load = &value["branches"][0];
        assert_eq!(load["name"], json!("load"));
        assert_eq!(load["path"], json!([0]));
        assert_eq!(load["output_path"], json!("found"));
        assert_eq!(load["has_executed"], json!(true));
        assert_eq!(
            load["outputs"]["found"][0]["path"],
            json!([0, "outputs", "found", 0])
        );
        assert_eq!(value["branches"][1][1]["name"], json!("audit"));

        let back: SignalTrace = serde_json::from_value(value).unwrap();
        assert_eq!(back.find("load").unwrap().run.output_path.as_deref(), Some("found"));
    }
}
