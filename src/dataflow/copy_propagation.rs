//! Copy propagation facts: `target` currently holds the same value as `source`.

use crate::cfg::{ControlFlowGraph, FlowNodeKind, NodeId};
use crate::dataflow::framework::{intersection, DataflowAnalysis, Fact, FactSet, MergeFn};
use crate::ir::{Expr, Instruction};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CopyFact {
    pub target: String,
    pub source: String,
}

impl Fact for CopyFact {
    fn subject(&self) -> Option<&str> {
        Some(&self.target)
    }
}

pub struct CopyPropagation {
    merge: MergeFn<CopyFact>,
}

impl Default for CopyPropagation {
    fn default() -> Self {
        Self { merge: intersection }
    }
}

impl CopyPropagation {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sources of the copies of `name` live in `facts`.
pub fn copies_of<'a>(facts: &'a FactSet<CopyFact>, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    facts.iter().filter(move |f| f.target == name).map(|f| f.source.as_str())
}

impl DataflowAnalysis for CopyPropagation {
    type Fact = CopyFact;

    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn merge(&self) -> MergeFn<CopyFact> {
        self.merge
    }

    fn extremal_value(&self, _graph: &ControlFlowGraph) -> FactSet<CopyFact> {
        FactSet::new()
    }

    fn transfer(&self, graph: &ControlFlowGraph, node: NodeId, input: &FactSet<CopyFact>) -> FactSet<CopyFact> {
        let flow = graph.node(node);
        if matches!(flow.kind, FlowNodeKind::Invocation { .. }) {
            return FactSet::new();
        }
        let Some(instr) = flow.instruction() else {
            return input.clone();
        };
        if instr.contains_invocation() {
            return FactSet::new();
        }

        match instr {
            Instruction::Declaration { name } => kill(input, name),
            Instruction::Assignment { target: Expr::Variable(name), value } => {
                let mut out = kill(input, name);
                if let Expr::Variable(source) = value {
                    if source != name {
                        out.insert(CopyFact { target: name.clone(), source: source.clone() });
                    }
                }
                out
            }
            _ => input.clone(),
        }
    }
}

fn kill(facts: &FactSet<CopyFact>, name: &str) -> FactSet<CopyFact> {
    facts
        .iter()
        .filter(|f| f.target != name && f.source != name)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_procedure_cfg;
    use crate::dataflow::framework::DataflowSolver;
    use crate::ir::Procedure;

    fn facts_before(body: Vec<Instruction>, index: usize) -> FactSet<CopyFact> {
        let procedure = Procedure::new("p", vec![], body);
        let graph = build_procedure_cfg(&procedure).unwrap();
        let result = DataflowSolver::default().solve(&CopyPropagation::new(), &graph).unwrap();
        result.facts_at(graph.instruction_node("p", index).unwrap())
    }

    #[test]
    fn test_copy_is_recorded() {
        let facts = facts_before(
            vec![Instruction::assign(Expr::var("b"), Expr::var("a")), Instruction::declare("z")],
            1,
        );
        assert_eq!(copies_of(&facts, "b").collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_reassigning_either_side_kills() {
        let source = facts_before(
            vec![
                Instruction::assign(Expr::var("b"), Expr::var("a")),
                Instruction::assign(Expr::var("a"), Expr::int(3)),
                Instruction::declare("z"),
            ],
            2,
        );
        assert!(source.is_empty());

        let target = facts_before(
            vec![
                Instruction::assign(Expr::var("b"), Expr::var("a")),
                Instruction::declare("b"),
                Instruction::declare("z"),
            ],
            2,
        );
        assert!(target.is_empty());
    }

    #[test]
    fn test_copy_must_hold_on_every_path() {
        let facts = facts_before(
            vec![
                Instruction::branch(Expr::var("c"), "J"),
                Instruction::assign(Expr::var("b"), Expr::var("a")),
                Instruction::label("J"),
            ],
            2,
        );
        assert!(facts.is_empty());
    }
}
