//! Action tree compiler
//!
//! Turns a definition into a flat action table plus the branch structure that
//! the executor walks. The compiled tree is immutable; per-run bookkeeping
//! lives in [`crate::trace::BranchTrace`] slots indexed by branch id.

use crate::action::Action;
use crate::chain::Chain;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// One step of a branch path
///
/// Paths are indices into lists, with `outputs` and the output name in
/// between when descending into an output map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Key(key) => f.write_str(key),
        }
    }
}

/// Render a path as `[0, outputs, success, 1]`
pub fn format_path(path: &[PathSegment]) -> String {
    let parts: Vec<String> = path.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

/// An item of a compiled branch list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchNode {
    /// A step run on its own, in order
    Branch(usize),

    /// Steps run concurrently and joined before the list continues
    Group(Vec<usize>),
}

/// Compiled, immutable description of one step occurrence
#[derive(Debug, Clone)]
pub struct BranchSpec {
    pub name: String,
    pub path: Vec<PathSegment>,
    pub is_async: bool,
    pub action_index: usize,
    pub outputs: Option<IndexMap<String, Vec<BranchNode>>>,
}

/// A compiled signal definition
#[derive(Debug, Clone)]
pub struct Tree {
    actions: Vec<Action>,
    branches: Vec<BranchNode>,
    specs: Vec<BranchSpec>,
}

impl Tree {
    /// Compile a definition
    ///
    /// The definition is expected to have passed [`crate::analyze`]; items it
    /// would reject are dropped here.
    pub fn compile(definition: &[Chain]) -> Self {
        let mut compiler = Compiler::default();
        let branches = compiler.list(definition, &mut Vec::new(), false);
        Self {
            actions: compiler.actions,
            branches,
            specs: compiler.specs,
        }
    }

    /// Deduplicated action table
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Top-level branch list
    pub fn branches(&self) -> &[BranchNode] {
        &self.branches
    }

    /// All branches, indexed by branch id
    pub fn specs(&self) -> &[BranchSpec] {
        &self.specs
    }

    pub fn spec(&self, id: usize) -> &BranchSpec {
        &self.specs[id]
    }

    pub fn action(&self, id: usize) -> &Action {
        &self.actions[self.specs[id].action_index]
    }

    /// Number of branches
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[derive(Default)]
struct Compiler {
    actions: Vec<Action>,
    specs: Vec<BranchSpec>,
}

impl Compiler {
    fn list(
        &mut self,
        items: &[Chain],
        path: &mut Vec<PathSegment>,
        concurrent: bool,
    ) -> Vec<BranchNode> {
        let mut nodes = Vec::new();
        let mut items = items.iter().peekable();

        while let Some(item) = items.next() {
            match item {
                Chain::Action(action) => {
                    path.push(PathSegment::Index(nodes.len()));
                    let id = self.branch(action, path, concurrent);
                    if let Some(Chain::Paths(paths)) = items.peek().copied() {
                        items.next();
                        let outputs = self.outputs(paths, path);
                        self.specs[id].outputs = Some(outputs);
                    }
                    path.pop();
                    nodes.push(BranchNode::Branch(id));
                }
                Chain::Parallel(members) => {
                    path.push(PathSegment::Index(nodes.len()));
                    let ids = self
                        .list(members, path, !concurrent)
                        .into_iter()
                        .filter_map(|node| match node {
                            BranchNode::Branch(id) => Some(id),
                            BranchNode::Group(_) => None,
                        })
                        .collect();
                    path.pop();
                    nodes.push(BranchNode::Group(ids));
                }
                other => trace!(item = %other.describe(), "Skipping non-branch item"),
            }
        }

        nodes
    }

    fn branch(&mut self, action: &Action, path: &[PathSegment], concurrent: bool) -> usize {
        let action_index = match self.actions.iter().position(|a| a.same_as(action)) {
            Some(index) => index,
            None => {
                self.actions.push(action.clone());
                self.actions.len() - 1
            }
        };

        self.specs.push(BranchSpec {
            name: action.name().to_string(),
            path: path.to_vec(),
            is_async: concurrent,
            action_index,
            outputs: None,
        });
        self.specs.len() - 1
    }

    fn outputs(
        &mut self,
        paths: &IndexMap<String, Vec<Chain>>,
        path: &mut Vec<PathSegment>,
    ) -> IndexMap<String, Vec<BranchNode>> {
        paths
            .iter()
            .map(|(key, items)| {
                path.push(PathSegment::Key("outputs".to_string()));
                path.push(PathSegment::Key(key.clone()));
                let nodes = self.list(items, path, false);
                path.pop();
                path.pop();
                (key.clone(), nodes)
            })
            .collect()
    }
}
