//! Call graph recorded while the interprocedural CFG is stitched together.

use crate::cfg::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One call site and the transfer nodes that connect it to its callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller: String,
    pub callee: String,
    /// Synthetic invocation node in the caller
    pub call_node: NodeId,
    /// `Transfer(Enter)` node leading to the callee's Start
    pub enter: NodeId,
    /// `Transfer(Return)` node leading back from the callee's End
    pub ret: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraph {
    root: String,
    calls: Vec<CallSite>,
    reachable: BTreeSet<String>,
}

impl CallGraph {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let mut reachable = BTreeSet::new();
        reachable.insert(root.clone());
        Self { root, calls: Vec::new(), reachable }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn add_call(&mut self, site: CallSite) {
        self.reachable.insert(site.callee.clone());
        self.calls.push(site);
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    /// Call sites whose callee is `procedure`.
    pub fn callers_of<'a>(&'a self, procedure: &'a str) -> impl Iterator<Item = &'a CallSite> + 'a {
        self.calls.iter().filter(move |c| c.callee == procedure)
    }

    /// Procedures reachable from the root, the root included.
    pub fn reachable(&self) -> &BTreeSet<String> {
        &self.reachable
    }

    pub fn is_reachable(&self, procedure: &str) -> bool {
        self.reachable.contains(procedure)
    }
}
