//! Arena-backed control-flow graph.
//!
//! Nodes live in a flat vector and are addressed by [`NodeId`]. Edges are
//! collected as index pairs while the graph is built; [`ControlFlowGraph::finalize`]
//! wires dangling nodes to their procedure's End and builds the adjacency lists
//! the solvers walk.

use crate::ir::{Expr, Instruction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Write as _};

/// Index of a node in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    /// Control passes from a call site into the callee
    Enter,
    /// Control passes from the callee back to the call site
    Return,
}

/// What a flow node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowNodeKind {
    Instruction(Instruction),
    Boundary(BoundaryKind),
    /// Synthetic call site; `arguments` are the hoisted `$arg_*` variables
    Invocation { callee: String, arguments: Vec<Expr> },
    Transfer { kind: TransferKind, from: String, to: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    /// Procedure the node belongs to
    pub procedure: String,
    pub kind: FlowNodeKind,
    predecessors: Vec<NodeId>,
    successors: Vec<NodeId>,
}

impl FlowNode {
    pub fn instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            FlowNodeKind::Instruction(instr) => Some(instr),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, FlowNodeKind::Boundary(BoundaryKind::End))
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }
}

impl fmt::Display for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FlowNodeKind::Instruction(instr) => write!(f, "{}", instr),
            FlowNodeKind::Boundary(BoundaryKind::Start) => write!(f, "start {}", self.procedure),
            FlowNodeKind::Boundary(BoundaryKind::End) => write!(f, "end {}", self.procedure),
            FlowNodeKind::Invocation { callee, arguments } => {
                write!(f, "invoke {}", Expr::call(callee.clone(), arguments.clone()))
            }
            FlowNodeKind::Transfer { kind, from, to } => {
                let verb = match kind {
                    TransferKind::Enter => "enter",
                    TransferKind::Return => "return",
                };
                write!(f, "{} {} -> {}", verb, from, to)
            }
        }
    }
}

/// Ordered `(from, to)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Boundaries {
    start: NodeId,
    end: NodeId,
}

/// Control-flow graph of one loop body and, in interprocedural mode, its callees.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    root: String,
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
    edge_set: BTreeSet<FlowEdge>,
    boundaries: BTreeMap<String, Boundaries>,
    /// Instruction identity: (procedure, position in its body)
    instructions: HashMap<(String, usize), NodeId>,
    finalized: bool,
}

impl ControlFlowGraph {
    /// Create a graph holding only the Start and End of `root`.
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let mut graph = Self {
            root: root.clone(),
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_set: BTreeSet::new(),
            boundaries: BTreeMap::new(),
            instructions: HashMap::new(),
            finalized: false,
        };
        graph.add_procedure(&root);
        graph
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Create Start and End nodes for `procedure`, or return the existing pair.
    pub fn add_procedure(&mut self, procedure: &str) -> (NodeId, NodeId) {
        if let Some(b) = self.boundaries.get(procedure) {
            return (b.start, b.end);
        }
        let start = self.add_node(procedure, FlowNodeKind::Boundary(BoundaryKind::Start));
        let end = self.add_node(procedure, FlowNodeKind::Boundary(BoundaryKind::End));
        self.boundaries.insert(procedure.to_string(), Boundaries { start, end });
        (start, end)
    }

    /// Names of every procedure with nodes in the graph.
    pub fn procedures(&self) -> impl Iterator<Item = &str> {
        self.boundaries.keys().map(String::as_str)
    }

    pub fn add_node(&mut self, procedure: &str, kind: FlowNodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(FlowNode {
            id,
            procedure: procedure.to_string(),
            kind,
            predecessors: Vec::new(),
            successors: Vec::new(),
        });
        self.finalized = false;
        id
    }

    /// Node for the instruction at `index` of `procedure`'s body.
    ///
    /// Registering the same position twice returns the node created first.
    pub fn register_instruction(&mut self, procedure: &str, index: usize, instr: Instruction) -> NodeId {
        let key = (procedure.to_string(), index);
        if let Some(&id) = self.instructions.get(&key) {
            return id;
        }
        let id = self.add_node(procedure, FlowNodeKind::Instruction(instr));
        self.instructions.insert(key, id);
        id
    }

    /// Map an instruction position onto an existing node (used when a call
    /// statement is replaced by its synthetic call site).
    pub fn alias_instruction(&mut self, procedure: &str, index: usize, node: NodeId) {
        self.instructions.entry((procedure.to_string(), index)).or_insert(node);
    }

    pub fn instruction_node(&self, procedure: &str, index: usize) -> Option<NodeId> {
        self.instructions.get(&(procedure.to_string(), index)).copied()
    }

    /// Add `from -> to`; duplicates are ignored.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        let edge = FlowEdge { from, to };
        if self.edge_set.insert(edge) {
            self.edges.push(edge);
            self.finalized = false;
        }
    }

    /// Wire every dangling node to its procedure's End and build adjacency lists.
    pub fn finalize(&mut self) {
        let dangling: Vec<(NodeId, NodeId)> = {
            let has_outgoing: BTreeSet<NodeId> = self.edges.iter().map(|e| e.from).collect();
            self.nodes
                .iter()
                .filter(|n| !n.is_end() && !has_outgoing.contains(&n.id))
                .filter_map(|n| self.boundaries.get(&n.procedure).map(|b| (n.id, b.end)))
                .collect()
        };
        for (from, to) in dangling {
            self.add_edge(from, to);
        }

        for node in &mut self.nodes {
            node.predecessors.clear();
            node.successors.clear();
        }
        for edge in &self.edges {
            self.nodes[edge.from.0].successors.push(edge.to);
            self.nodes[edge.to.0].predecessors.push(edge.from);
        }
        self.finalized = true;

        log::debug!(
            "finalized CFG for '{}': {} nodes, {} edges, {} procedures",
            self.root,
            self.nodes.len(),
            self.edges.len(),
            self.boundaries.len()
        );
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Start of the root procedure.
    pub fn start(&self) -> NodeId {
        self.boundaries[&self.root].start
    }

    /// End of the root procedure.
    pub fn end(&self) -> NodeId {
        self.boundaries[&self.root].end
    }

    pub fn start_of(&self, procedure: &str) -> Option<NodeId> {
        self.boundaries.get(procedure).map(|b| b.start)
    }

    pub fn end_of(&self, procedure: &str) -> Option<NodeId> {
        self.boundaries.get(procedure).map(|b| b.end)
    }

    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id.0].successors()
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        self.nodes[id.0].predecessors()
    }

    /// Instruction nodes in creation order.
    pub fn instruction_nodes(&self) -> impl Iterator<Item = (NodeId, &Instruction)> {
        self.nodes.iter().filter_map(|n| n.instruction().map(|i| (n.id, i)))
    }

    /// Render the graph in Graphviz DOT, one cluster per procedure.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph cfg {{");
        let _ = writeln!(out, "  node [shape=box, fontname=\"monospace\"];");
        for (index, procedure) in self.boundaries.keys().enumerate() {
            let _ = writeln!(out, "  subgraph cluster_{} {{", index);
            let _ = writeln!(out, "    label=\"{}\";", escape(procedure));
            for node in self.nodes.iter().filter(|n| &n.procedure == procedure) {
                let _ = writeln!(out, "    {} [label=\"{}\"];", node.id, escape(&node.to_string()));
            }
            let _ = writeln!(out, "  }}");
        }
        for edge in &self.edges {
            let _ = writeln!(out, "  {} -> {};", edge.from, edge.to);
        }
        let _ = writeln!(out, "}}");
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
