//! Loop-dependence abstract interpretation.
//!
//! Every variable is described by a set of qualitative [`DescriptorKind`]s:
//! its sign, whether it is zero or one, and whether it varies with the
//! iteration. The induction variable starts out loop-dependent and positive;
//! arithmetic propagates the descriptors through the body.

use crate::cfg::{ControlFlowGraph, NodeId};
use crate::dataflow::descriptor::{kinds_of, merge_descriptors, DescriptorKind, VariableDescriptor};
use crate::dataflow::framework::{DataflowAnalysis, FactSet, MergeFn, WorklistSeed};
use crate::ir::{BinaryOp, Expr, Instruction};
use std::collections::BTreeSet;

use DescriptorKind::*;

type Kinds = BTreeSet<DescriptorKind>;

pub struct LoopDependenceAnalysis {
    induction_variable: String,
    merge: MergeFn<VariableDescriptor>,
}

impl LoopDependenceAnalysis {
    pub fn new(induction_variable: impl Into<String>) -> Self {
        Self { induction_variable: induction_variable.into(), merge: merge_descriptors }
    }
}

impl DataflowAnalysis for LoopDependenceAnalysis {
    type Fact = VariableDescriptor;

    fn name(&self) -> &'static str {
        "loop-dependence"
    }

    fn seed(&self) -> WorklistSeed {
        WorklistSeed::Nodes
    }

    fn merge(&self) -> MergeFn<VariableDescriptor> {
        self.merge
    }

    fn extremal_value(&self, graph: &ControlFlowGraph) -> FactSet<VariableDescriptor> {
        [LoopDependent, Positive, NotZero, Definition(graph.start())]
            .into_iter()
            .map(|kind| VariableDescriptor::new(self.induction_variable.clone(), kind))
            .collect()
    }

    fn transfer(
        &self,
        graph: &ControlFlowGraph,
        node: NodeId,
        input: &FactSet<VariableDescriptor>,
    ) -> FactSet<VariableDescriptor> {
        let (name, kinds) = match graph.node(node).instruction() {
            Some(Instruction::Declaration { name }) => (name, Kinds::new()),
            Some(Instruction::Assignment { target: Expr::Variable(name), value }) => {
                (name, evaluate(value, input))
            }
            _ => return input.clone(),
        };

        let mut out: FactSet<VariableDescriptor> =
            input.iter().filter(|d| &d.name != name).cloned().collect();
        out.insert(VariableDescriptor::new(name.clone(), Definition(node)));
        out.extend(kinds.into_iter().map(|kind| VariableDescriptor::new(name.clone(), kind)));
        out
    }
}

/// Descriptors of `expr` under `facts`; never contains a definition.
pub fn evaluate(expr: &Expr, facts: &FactSet<VariableDescriptor>) -> Kinds {
    match expr {
        Expr::IntegerLiteral(value) => integer(*value),
        Expr::Variable(name) => kinds_of(facts, name),
        Expr::UnaryMinus(inner) => negate(&evaluate(inner, facts)),
        Expr::Parentheses(inner) => evaluate(inner, facts),
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, facts);
            let r = evaluate(right, facts);
            match op {
                BinaryOp::Add => add(&l, &r),
                BinaryOp::Subtract => add(&l, &negate(&r)),
                BinaryOp::Multiply => multiply(&l, &r),
                BinaryOp::Divide => divide(&l, &r),
                BinaryOp::Modulo => modulo(&l, &r),
                BinaryOp::Generic(_) | BinaryOp::Comparison(_) => Kinds::new(),
            }
        }
        Expr::ArrayAccess { .. }
        | Expr::DoubleLiteral(_)
        | Expr::Conditional { .. }
        | Expr::Invocation { .. } => Kinds::new(),
    }
}

/// Whether `expr` varies with the iteration under `facts`.
pub fn is_loop_dependent(expr: &Expr, facts: &FactSet<VariableDescriptor>) -> bool {
    evaluate(expr, facts).contains(&LoopDependent)
}

fn integer(value: i64) -> Kinds {
    let kinds: &[DescriptorKind] = match value {
        0 => &[Zero, LoopIndependent],
        1 => &[One, Positive, NotZero, LoopIndependent],
        v if v > 1 => &[Positive, NotZero, LoopIndependent],
        _ => &[Negative, NotZero, LoopIndependent],
    };
    kinds.iter().copied().collect()
}

fn negate(kinds: &Kinds) -> Kinds {
    kinds
        .iter()
        .map(|k| match k {
            Positive => Negative,
            Negative => Positive,
            other => *other,
        })
        .collect()
}

fn both(l: &Kinds, r: &Kinds, kind: DescriptorKind) -> bool {
    l.contains(&kind) && r.contains(&kind)
}

fn either(l: &Kinds, r: &Kinds, kind: DescriptorKind) -> bool {
    l.contains(&kind) || r.contains(&kind)
}

fn add(l: &Kinds, r: &Kinds) -> Kinds {
    if l.contains(&Zero) {
        return r.clone();
    }
    if r.contains(&Zero) {
        return l.clone();
    }

    let mut out = Kinds::new();
    let same_sign = both(l, r, Positive) || both(l, r, Negative);
    if either(l, r, LoopDependent) && (same_sign || either(l, r, LoopIndependent)) {
        out.insert(LoopDependent);
    }
    if both(l, r, Positive) {
        out.extend([Positive, NotZero]);
    }
    if both(l, r, Negative) {
        out.extend([Negative, NotZero]);
    }
    if both(l, r, LoopIndependent) {
        out.insert(LoopIndependent);
    }
    out
}

fn multiply(l: &Kinds, r: &Kinds) -> Kinds {
    if either(l, r, Zero) {
        return [Zero].into_iter().collect();
    }
    if l.contains(&One) {
        return r.clone();
    }
    if r.contains(&One) {
        return l.clone();
    }

    let mut out = Kinds::new();
    if both(l, r, Positive) || both(l, r, Negative) {
        out.insert(Positive);
    }
    if (l.contains(&Positive) && r.contains(&Negative)) || (l.contains(&Negative) && r.contains(&Positive)) {
        out.insert(Negative);
    }
    if both(l, r, NotZero) {
        out.insert(NotZero);
        if either(l, r, LoopDependent) {
            out.insert(LoopDependent);
        }
    }
    if both(l, r, LoopIndependent) {
        out.insert(LoopIndependent);
    }
    out
}

fn divide(l: &Kinds, r: &Kinds) -> Kinds {
    if r.contains(&One) || l.contains(&Zero) {
        l.clone()
    } else if both(l, r, LoopIndependent) {
        [LoopIndependent].into_iter().collect()
    } else {
        Kinds::new()
    }
}

// `x % 1` and `0 % x` are both zero
fn modulo(l: &Kinds, r: &Kinds) -> Kinds {
    if r.contains(&One) || l.contains(&Zero) {
        [Zero].into_iter().collect()
    } else if both(l, r, LoopIndependent) {
        [LoopIndependent].into_iter().collect()
    } else {
        Kinds::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_loop_cfg;
    use crate::dataflow::descriptor::definitions_of;
    use crate::dataflow::framework::DataflowSolver;
    use crate::ir::{LoopProgram, LOOP_PROCEDURE};

    fn kinds(items: &[DescriptorKind]) -> Kinds {
        items.iter().copied().collect()
    }

    fn induction() -> FactSet<VariableDescriptor> {
        [LoopDependent, Positive, NotZero]
            .into_iter()
            .map(|k| VariableDescriptor::new("i", k))
            .collect()
    }

    #[test]
    fn test_integer_literals() {
        let none = FactSet::new();
        assert_eq!(evaluate(&Expr::int(0), &none), kinds(&[Zero, LoopIndependent]));
        assert_eq!(evaluate(&Expr::int(1), &none), kinds(&[One, Positive, NotZero, LoopIndependent]));
        assert_eq!(evaluate(&Expr::int(7), &none), kinds(&[Positive, NotZero, LoopIndependent]));
        assert_eq!(evaluate(&Expr::int(-2), &none), kinds(&[Negative, NotZero, LoopIndependent]));
    }

    #[test]
    fn test_zero_is_additive_identity() {
        let facts = induction();
        let e = Expr::mul(Expr::var("i"), Expr::int(3));
        let plain = evaluate(&e, &facts);
        assert_eq!(evaluate(&Expr::add(e.clone(), Expr::int(0)), &facts), plain);
        assert_eq!(evaluate(&Expr::add(Expr::int(0), e), &facts), plain);
    }

    #[test]
    fn test_shifted_induction_variable_is_loop_dependent() {
        let facts = induction();
        assert!(is_loop_dependent(&Expr::add(Expr::var("i"), Expr::int(1)), &facts));
        assert!(is_loop_dependent(&Expr::sub(Expr::var("i"), Expr::int(1)), &facts));
        assert!(is_loop_dependent(&Expr::paren(Expr::var("i")), &facts));
        assert!(!is_loop_dependent(&Expr::var("n"), &facts));
        assert!(!is_loop_dependent(&Expr::array("b", vec![Expr::var("i")]), &facts));
    }

    #[test]
    fn test_unary_minus_flips_sign() {
        let facts = induction();
        assert_eq!(
            evaluate(&Expr::neg(Expr::var("i")), &facts),
            kinds(&[LoopDependent, Negative, NotZero])
        );
        assert_eq!(
            evaluate(&Expr::neg(Expr::int(1)), &facts),
            kinds(&[One, Negative, NotZero, LoopIndependent])
        );
    }

    #[test]
    fn test_multiply() {
        let facts = induction();
        assert_eq!(evaluate(&Expr::mul(Expr::var("i"), Expr::int(0)), &facts), kinds(&[Zero]));
        assert_eq!(evaluate(&Expr::mul(Expr::int(1), Expr::var("i")), &facts), evaluate(&Expr::var("i"), &facts));
        assert_eq!(
            evaluate(&Expr::mul(Expr::var("i"), Expr::int(-4)), &facts),
            kinds(&[Negative, NotZero, LoopDependent])
        );
    }

    #[test]
    fn test_divide_and_modulo() {
        let facts = induction();
        assert_eq!(evaluate(&Expr::div(Expr::var("i"), Expr::int(1)), &facts), evaluate(&Expr::var("i"), &facts));
        assert!(evaluate(&Expr::div(Expr::var("i"), Expr::int(2)), &facts).is_empty());
        assert_eq!(evaluate(&Expr::div(Expr::int(6), Expr::int(2)), &facts), kinds(&[LoopIndependent]));
        assert_eq!(evaluate(&Expr::rem(Expr::var("i"), Expr::int(1)), &facts), kinds(&[Zero]));
        assert!(evaluate(&Expr::rem(Expr::var("i"), Expr::int(4)), &facts).is_empty());
    }

    #[test]
    fn test_unmodelled_expressions_are_unknown() {
        let facts = induction();
        assert!(evaluate(&Expr::double(1.0), &facts).is_empty());
        assert!(evaluate(&Expr::call("f", vec![Expr::var("i")]), &facts).is_empty());
        assert!(evaluate(
            &Expr::conditional(Expr::var("c"), Expr::var("i"), Expr::var("i")),
            &facts
        )
        .is_empty());
    }

    #[test]
    fn test_assignment_propagates_through_body() {
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::declare("k"),
                Instruction::assign(Expr::var("k"), Expr::add(Expr::var("i"), Expr::int(2))),
                Instruction::declare("m"),
                Instruction::assign(Expr::var("m"), Expr::int(5)),
            ],
        );
        let (graph, _) = build_loop_cfg(&program, true).unwrap();
        let result = DataflowSolver::default()
            .solve(&LoopDependenceAnalysis::new("i"), &graph)
            .unwrap();
        let facts = result.facts_at(graph.end());
        assert!(kinds_of(&facts, "k").contains(&LoopDependent));
        assert!(kinds_of(&facts, "m").contains(&LoopIndependent));
        let def = graph.instruction_node(LOOP_PROCEDURE, 1).unwrap();
        assert_eq!(definitions_of(&facts, "k"), [def].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_branches_with_distinct_definitions_lose_facts() {
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::declare("k"),
                Instruction::assign(Expr::var("k"), Expr::var("i")),
                Instruction::branch(Expr::var("c"), "SKIP"),
                Instruction::assign(Expr::var("k"), Expr::int(3)),
                Instruction::label("SKIP"),
            ],
        );
        let (graph, _) = build_loop_cfg(&program, true).unwrap();
        let result = DataflowSolver::default()
            .solve(&LoopDependenceAnalysis::new("i"), &graph)
            .unwrap();
        let skip = graph.instruction_node(LOOP_PROCEDURE, 4).unwrap();
        let facts = result.facts_at(skip);
        assert!(kinds_of(&facts, "k").is_empty());
        assert_eq!(definitions_of(&facts, "k").len(), 2);
    }
}
