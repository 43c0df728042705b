//! Available expressions: computations whose result is still held in a variable.

use crate::cfg::{ControlFlowGraph, FlowNodeKind, NodeId};
use crate::dataflow::framework::{intersection, DataflowAnalysis, Fact, FactSet, MergeFn};
use crate::ir::{Expr, Instruction};

/// `target` holds the value of `expression`, computed at `node`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AvailableExpression {
    pub node: NodeId,
    pub target: String,
    pub expression: Expr,
}

impl Fact for AvailableExpression {
    fn subject(&self) -> Option<&str> {
        Some(&self.target)
    }
}

pub struct AvailableExpressions {
    merge: MergeFn<AvailableExpression>,
}

impl Default for AvailableExpressions {
    fn default() -> Self {
        Self { merge: intersection }
    }
}

impl AvailableExpressions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataflowAnalysis for AvailableExpressions {
    type Fact = AvailableExpression;

    fn name(&self) -> &'static str {
        "available-expressions"
    }

    fn merge(&self) -> MergeFn<AvailableExpression> {
        self.merge
    }

    fn extremal_value(&self, _graph: &ControlFlowGraph) -> FactSet<AvailableExpression> {
        FactSet::new()
    }

    fn transfer(
        &self,
        graph: &ControlFlowGraph,
        node: NodeId,
        input: &FactSet<AvailableExpression>,
    ) -> FactSet<AvailableExpression> {
        let flow = graph.node(node);
        if matches!(flow.kind, FlowNodeKind::Invocation { .. }) {
            return FactSet::new();
        }
        let Some(instr) = flow.instruction() else {
            return input.clone();
        };
        // calls may write any external state
        if instr.contains_invocation() {
            return FactSet::new();
        }

        match instr {
            Instruction::Declaration { name } => kill(input, name),
            Instruction::Assignment { target: Expr::Variable(name), value } => {
                let mut out = kill(input, name);
                if value.is_reusable_computation() && !value.reads(name) {
                    out.insert(AvailableExpression {
                        node,
                        target: name.clone(),
                        expression: value.clone(),
                    });
                }
                out
            }
            Instruction::Assignment { target: Expr::ArrayAccess { name, .. }, .. } => {
                input.iter().filter(|f| !f.expression.reads(name)).cloned().collect()
            }
            _ => input.clone(),
        }
    }
}

fn kill(facts: &FactSet<AvailableExpression>, name: &str) -> FactSet<AvailableExpression> {
    facts
        .iter()
        .filter(|f| f.target != name && !f.expression.reads(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_procedure_cfg;
    use crate::dataflow::framework::DataflowSolver;
    use crate::ir::Procedure;

    fn solve(body: Vec<Instruction>) -> (ControlFlowGraph, Vec<FactSet<AvailableExpression>>) {
        let procedure = Procedure::new("p", vec![], body);
        let graph = build_procedure_cfg(&procedure).unwrap();
        let result = DataflowSolver::default().solve(&AvailableExpressions::new(), &graph).unwrap();
        let facts = (0..procedure.body.len())
            .map(|i| result.facts_at(graph.instruction_node("p", i).unwrap()))
            .collect();
        (graph, facts)
    }

    fn x_plus_1() -> Expr {
        Expr::add(Expr::var("x"), Expr::int(1))
    }

    #[test]
    fn test_computation_becomes_available() {
        let (_, facts) = solve(vec![
            Instruction::assign(Expr::var("a"), x_plus_1()),
            Instruction::assign(Expr::var("b"), x_plus_1()),
        ]);
        assert!(facts[0].is_empty());
        assert_eq!(facts[1].len(), 1);
        let fact = facts[1].iter().next().unwrap();
        assert_eq!(fact.target, "a");
        assert_eq!(fact.expression, x_plus_1());
    }

    #[test]
    fn test_operand_reassignment_kills() {
        let (_, facts) = solve(vec![
            Instruction::assign(Expr::var("a"), x_plus_1()),
            Instruction::assign(Expr::var("x"), Expr::int(4)),
            Instruction::assign(Expr::var("b"), x_plus_1()),
        ]);
        assert!(facts[2].is_empty());
    }

    #[test]
    fn test_self_assignment_never_available() {
        let (_, facts) = solve(vec![
            Instruction::assign(Expr::var("x"), x_plus_1()),
            Instruction::declare("y"),
        ]);
        assert!(facts[1].is_empty());
    }

    #[test]
    fn test_must_merge_at_join() {
        let (_, facts) = solve(vec![
            Instruction::branch(Expr::var("c"), "J"),
            Instruction::assign(Expr::var("a"), x_plus_1()),
            Instruction::label("J"),
        ]);
        assert!(facts[2].is_empty());
    }

    #[test]
    fn test_calls_kill_everything() {
        let (_, facts) = solve(vec![
            Instruction::assign(Expr::var("a"), x_plus_1()),
            Instruction::call("f", vec![]),
            Instruction::declare("z"),
        ]);
        assert_eq!(facts[1].len(), 1);
        assert!(facts[2].is_empty());
    }
}
