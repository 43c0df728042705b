//! Generic monotone dataflow framework.
//!
//! An analysis supplies its fact type, direction, extremal value, merge
//! strategy and per-node transfer function; [`DataflowSolver`] runs the
//! worklist to a fixed point. The solver owns the interprocedural plumbing:
//! at a `Transfer(Enter)` node only facts about the callee's `$arg_*`
//! variables survive, and at a `Transfer(Return)` node only facts about the
//! callee's `$result_*` variable.
//!
//! Node state is `None` until some fact set first arrives. The first arrival
//! is stored verbatim and later arrivals go through the merge, so both may
//! (union) and must (intersection) analyses run on the same solver.

use crate::cfg::{argument_prefix, result_variable, ControlFlowGraph, FlowNodeKind, NodeId, TransferKind};
use crate::utils::errors::{AnalysisError, AnalysisErrorKind, AnalysisResult};
use std::collections::{BTreeSet, VecDeque};
use std::fmt::Debug;

/// Default cap on worklist visits.
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Facts are kept in ordered sets so results are deterministic.
pub type FactSet<F> = BTreeSet<F>;

/// Merge strategy: combine the stored facts of a node with an incoming set.
pub type MergeFn<F> = fn(&FactSet<F>, &FactSet<F>) -> FactSet<F>;

/// A single dataflow fact.
pub trait Fact: Clone + Ord + Debug {
    /// The variable this fact is about, if any.
    fn subject(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Initial contents of the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorklistSeed {
    /// Every edge, in insertion order
    Edges,
    /// Every node, in index order; a node is processed with all its outgoing edges
    Nodes,
}

pub trait DataflowAnalysis {
    type Fact: Fact;

    /// Short name used in log output.
    fn name(&self) -> &'static str;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn seed(&self) -> WorklistSeed {
        WorklistSeed::Edges
    }

    fn merge(&self) -> MergeFn<Self::Fact>;

    /// Facts holding at the root Start (forward) or root End (backward).
    fn extremal_value(&self, graph: &ControlFlowGraph) -> FactSet<Self::Fact>;

    /// Facts leaving `node` given the facts reaching it.
    ///
    /// Not called for transfer nodes.
    fn transfer(
        &self,
        graph: &ControlFlowGraph,
        node: NodeId,
        input: &FactSet<Self::Fact>,
    ) -> FactSet<Self::Fact>;
}

pub fn union<F: Fact>(stored: &FactSet<F>, incoming: &FactSet<F>) -> FactSet<F> {
    stored.union(incoming).cloned().collect()
}

pub fn intersection<F: Fact>(stored: &FactSet<F>, incoming: &FactSet<F>) -> FactSet<F> {
    stored.intersection(incoming).cloned().collect()
}

/// Fixed-point facts of one analysis over one graph.
#[derive(Debug, Clone)]
pub struct DataflowResult<F: Fact> {
    inputs: Vec<Option<FactSet<F>>>,
    outputs: Vec<Option<FactSet<F>>>,
    iterations: usize,
}

impl<F: Fact> DataflowResult<F> {
    /// Facts reaching `node`, or `None` if it was never reached.
    pub fn input(&self, node: NodeId) -> Option<&FactSet<F>> {
        self.inputs.get(node.0).and_then(Option::as_ref)
    }

    /// Facts leaving `node`, or `None` if it was never reached.
    pub fn output(&self, node: NodeId) -> Option<&FactSet<F>> {
        self.outputs.get(node.0).and_then(Option::as_ref)
    }

    /// Facts reaching `node`, empty when unreached.
    pub fn facts_at(&self, node: NodeId) -> FactSet<F> {
        self.input(node).cloned().unwrap_or_default()
    }

    pub fn is_reached(&self, node: NodeId) -> bool {
        self.input(node).is_some()
    }

    /// Worklist visits needed to converge.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

enum Worklist {
    Edges(VecDeque<(NodeId, NodeId)>),
    Nodes { queue: VecDeque<NodeId>, queued: Vec<bool> },
}

impl Worklist {
    fn pop(&mut self, graph: &ControlFlowGraph, direction: Direction) -> Option<Vec<(NodeId, NodeId)>> {
        match self {
            Worklist::Edges(queue) => queue.pop_front().map(|e| vec![e]),
            Worklist::Nodes { queue, queued } => {
                let node = queue.pop_front()?;
                queued[node.0] = false;
                Some(flow_targets(graph, node, direction).iter().map(|&t| (node, t)).collect())
            }
        }
    }

    /// Re-enqueue the flow leaving `node`.
    fn push_from(&mut self, graph: &ControlFlowGraph, node: NodeId, direction: Direction) {
        match self {
            Worklist::Edges(queue) => {
                queue.extend(flow_targets(graph, node, direction).iter().map(|&t| (node, t)));
            }
            Worklist::Nodes { queue, queued } => {
                if !queued[node.0] {
                    queued[node.0] = true;
                    queue.push_back(node);
                }
            }
        }
    }
}

fn flow_targets(graph: &ControlFlowGraph, node: NodeId, direction: Direction) -> &[NodeId] {
    match direction {
        Direction::Forward => graph.successors(node),
        Direction::Backward => graph.predecessors(node),
    }
}

/// Worklist solver shared by every analysis.
#[derive(Debug, Clone, Copy)]
pub struct DataflowSolver {
    pub max_iterations: usize,
}

impl Default for DataflowSolver {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS }
    }
}

impl DataflowSolver {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    /// Run `analysis` over a finalized `graph` to a fixed point.
    pub fn solve<A: DataflowAnalysis>(
        &self,
        analysis: &A,
        graph: &ControlFlowGraph,
    ) -> AnalysisResult<DataflowResult<A::Fact>> {
        debug_assert!(graph.is_finalized(), "{} solved over an unfinalized graph", analysis.name());
        let direction = analysis.direction();
        let merge = analysis.merge();
        let n = graph.len();

        let mut inputs: Vec<Option<FactSet<A::Fact>>> = vec![None; n];
        let extremal = match direction {
            Direction::Forward => graph.start(),
            Direction::Backward => graph.end(),
        };
        inputs[extremal.0] = Some(analysis.extremal_value(graph));

        let mut worklist = match analysis.seed() {
            WorklistSeed::Edges => Worklist::Edges(
                graph
                    .edges()
                    .iter()
                    .map(|e| match direction {
                        Direction::Forward => (e.from, e.to),
                        Direction::Backward => (e.to, e.from),
                    })
                    .collect(),
            ),
            WorklistSeed::Nodes => Worklist::Nodes {
                queue: (0..n).map(NodeId).collect(),
                queued: vec![true; n],
            },
        };

        let mut iterations = 0usize;
        while let Some(flows) = worklist.pop(graph, direction) {
            for (from, to) in flows {
                iterations += 1;
                if iterations > self.max_iterations {
                    log::warn!(
                        "{} did not converge after {} iterations",
                        analysis.name(),
                        self.max_iterations
                    );
                    return Err(AnalysisError::new(
                        AnalysisErrorKind::NotConverged,
                        format!("{} did not converge after {} iterations", analysis.name(), self.max_iterations),
                    ));
                }

                let Some(input) = inputs[from.0].as_ref() else {
                    continue;
                };
                let outgoing = self.apply(analysis, graph, from, input);

                let updated = match &inputs[to.0] {
                    None => Some(outgoing),
                    Some(stored) => {
                        let merged = merge(stored, &outgoing);
                        (merged != *stored).then_some(merged)
                    }
                };
                if let Some(facts) = updated {
                    inputs[to.0] = Some(facts);
                    worklist.push_from(graph, to, direction);
                }
            }
        }

        let outputs = (0..n)
            .map(|i| {
                inputs[i]
                    .as_ref()
                    .map(|input| self.apply(analysis, graph, NodeId(i), input))
            })
            .collect();

        log::debug!("{} converged after {} iterations over {} nodes", analysis.name(), iterations, n);
        Ok(DataflowResult { inputs, outputs, iterations })
    }

    fn apply<A: DataflowAnalysis>(
        &self,
        analysis: &A,
        graph: &ControlFlowGraph,
        node: NodeId,
        input: &FactSet<A::Fact>,
    ) -> FactSet<A::Fact> {
        match &graph.node(node).kind {
            FlowNodeKind::Transfer { kind: TransferKind::Enter, to, .. } => {
                let prefix = argument_prefix(to);
                filter_subjects(input, |s| s.starts_with(&prefix))
            }
            FlowNodeKind::Transfer { kind: TransferKind::Return, from, .. } => {
                let result = result_variable(from);
                filter_subjects(input, |s| s == result)
            }
            _ => analysis.transfer(graph, node, input),
        }
    }
}

fn filter_subjects<F: Fact>(facts: &FactSet<F>, keep: impl Fn(&str) -> bool) -> FactSet<F> {
    facts
        .iter()
        .filter(|f| f.subject().map(&keep).unwrap_or(false))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_loop_cfg;
    use crate::ir::{Expr, Instruction, LoopProgram, Procedure, LOOP_PROCEDURE};

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct Name(String);

    impl Fact for Name {
        fn subject(&self) -> Option<&str> {
            Some(&self.0)
        }
    }

    /// Names declared on some path (may) or every path (must).
    struct Declared {
        merge: MergeFn<Name>,
    }

    impl DataflowAnalysis for Declared {
        type Fact = Name;

        fn name(&self) -> &'static str {
            "declared"
        }

        fn merge(&self) -> MergeFn<Name> {
            self.merge
        }

        fn extremal_value(&self, _graph: &ControlFlowGraph) -> FactSet<Name> {
            FactSet::new()
        }

        fn transfer(&self, graph: &ControlFlowGraph, node: NodeId, input: &FactSet<Name>) -> FactSet<Name> {
            let mut out = input.clone();
            if let Some(Instruction::Declaration { name }) = graph.node(node).instruction() {
                out.insert(Name(name.clone()));
            }
            out
        }
    }

    /// Names read later on some path.
    struct Live;

    impl DataflowAnalysis for Live {
        type Fact = Name;

        fn name(&self) -> &'static str {
            "live"
        }

        fn direction(&self) -> Direction {
            Direction::Backward
        }

        fn merge(&self) -> MergeFn<Name> {
            union
        }

        fn extremal_value(&self, _graph: &ControlFlowGraph) -> FactSet<Name> {
            FactSet::new()
        }

        fn transfer(&self, graph: &ControlFlowGraph, node: NodeId, input: &FactSet<Name>) -> FactSet<Name> {
            let mut out = input.clone();
            if let Some(instr) = graph.node(node).instruction() {
                if let Some(def) = instr.defined_variable() {
                    out.remove(&Name(def.to_string()));
                }
                for expr in instr.expressions() {
                    out.extend(expr.variables().into_iter().map(Name));
                }
            }
            out
        }
    }

    fn diamond() -> LoopProgram {
        LoopProgram::new(
            "i",
            vec![
                Instruction::declare("a"),
                Instruction::branch(Expr::var("c"), "ELSE"),
                Instruction::declare("b"),
                Instruction::jump("JOIN"),
                Instruction::label("ELSE"),
                Instruction::label("JOIN"),
            ],
        )
    }

    #[test]
    fn test_may_and_must_merge() {
        let (graph, _) = build_loop_cfg(&diamond(), false).unwrap();
        let join = graph.instruction_node(LOOP_PROCEDURE, 5).unwrap();
        let solver = DataflowSolver::default();

        let may = solver.solve(&Declared { merge: union }, &graph).unwrap();
        let names: Vec<_> = may.facts_at(join).into_iter().map(|n| n.0).collect();
        assert_eq!(names, vec!["a", "b"]);

        let must = solver.solve(&Declared { merge: intersection }, &graph).unwrap();
        let names: Vec<_> = must.facts_at(join).into_iter().map(|n| n.0).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_backward_direction() {
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::declare("x"),
                Instruction::assign(Expr::var("x"), Expr::var("y")),
                Instruction::assign(Expr::var("z"), Expr::var("x")),
            ],
        );
        let (graph, _) = build_loop_cfg(&program, false).unwrap();
        let result = DataflowSolver::default().solve(&Live, &graph).unwrap();
        let second = graph.instruction_node(LOOP_PROCEDURE, 1).unwrap();
        let live: Vec<_> = result.facts_at(second).into_iter().map(|n| n.0).collect();
        assert_eq!(live, vec!["x"]);
        let live_out: Vec<_> = result.output(second).cloned().unwrap_or_default().into_iter().map(|n| n.0).collect();
        assert_eq!(live_out, vec!["y"]);
    }

    #[test]
    fn test_unreached_node_has_no_state() {
        let program = LoopProgram::new(
            "i",
            vec![Instruction::jump("L"), Instruction::declare("dead"), Instruction::label("L")],
        );
        let (graph, _) = build_loop_cfg(&program, false).unwrap();
        let result = DataflowSolver::default().solve(&Declared { merge: union }, &graph).unwrap();
        assert!(!result.is_reached(graph.instruction_node(LOOP_PROCEDURE, 1).unwrap()));
        assert!(result.is_reached(graph.end()));
    }

    #[test]
    fn test_transfer_nodes_filter_facts() {
        let program = LoopProgram::new(
            "i",
            vec![Instruction::declare("outer"), Instruction::call("f", vec![Expr::int(1)])],
        )
        .with_procedure(Procedure::new("f", vec!["p".into()], vec![Instruction::declare("inner")]));
        let (graph, calls) = build_loop_cfg(&program, true).unwrap();
        let result = DataflowSolver::default().solve(&Declared { merge: union }, &graph).unwrap();

        let site = &calls.calls()[0];
        let entered: Vec<_> = result.output(site.enter).cloned().unwrap_or_default().into_iter().map(|n| n.0).collect();
        assert_eq!(entered, vec!["$arg_f_0"]);
        let returned: Vec<_> = result.output(site.ret).cloned().unwrap_or_default().into_iter().map(|n| n.0).collect();
        assert_eq!(returned, vec!["$result_f"]);
    }

    #[test]
    fn test_iteration_cap() {
        let (graph, _) = build_loop_cfg(&diamond(), false).unwrap();
        let err = DataflowSolver::new(1).solve(&Declared { merge: union }, &graph).unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::NotConverged);
    }
}
