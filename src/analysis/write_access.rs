//! Rejects loops that write scalar variables they do not declare.
//!
//! A scalar declared outside the loop is shared by every iteration, so a
//! write to it carries a value from one iteration into the next. Scoping is
//! per procedure: a write is local only when the writing procedure's own
//! declaration (or parameter) reaches it on every path.

use crate::analysis::verdict::{Rejection, RejectionReason, VerifierKind};
use crate::cfg::{build_procedure_cfg, result_variable, ControlFlowGraph, NodeId};
use crate::dataflow::{intersection, DataflowAnalysis, DataflowSolver, Fact, FactSet, MergeFn};
use crate::ir::{Expr, Instruction, LoopProgram, Procedure};
use crate::utils::errors::AnalysisResult;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Declared(String);

impl Fact for Declared {
    fn subject(&self) -> Option<&str> {
        Some(&self.0)
    }
}

/// Names declared on every path from the start of a procedure.
struct DeclaredNames {
    prologue: FactSet<Declared>,
}

impl DataflowAnalysis for DeclaredNames {
    type Fact = Declared;

    fn name(&self) -> &'static str {
        "declared-names"
    }

    fn merge(&self) -> MergeFn<Declared> {
        intersection
    }

    fn extremal_value(&self, _graph: &ControlFlowGraph) -> FactSet<Declared> {
        self.prologue.clone()
    }

    fn transfer(&self, graph: &ControlFlowGraph, node: NodeId, input: &FactSet<Declared>) -> FactSet<Declared> {
        let mut out = input.clone();
        if let Some(Instruction::Declaration { name }) = graph.node(node).instruction() {
            out.insert(Declared(name.clone()));
        }
        out
    }
}

/// Scalars `procedure` writes where none of its own declarations reach.
fn undeclared_writes(
    procedure: &Procedure,
    is_callee: bool,
    solver: &DataflowSolver,
) -> AnalysisResult<BTreeSet<String>> {
    let graph = build_procedure_cfg(procedure)?;
    let mut prologue: FactSet<Declared> = procedure.parameters.iter().cloned().map(Declared).collect();
    if is_callee {
        prologue.insert(Declared(result_variable(&procedure.name)));
    }
    let declared = solver.solve(&DeclaredNames { prologue }, &graph)?;

    let mut written = BTreeSet::new();
    for (node, instr) in graph.instruction_nodes() {
        let Instruction::Assignment { target: Expr::Variable(name), .. } = instr else {
            continue;
        };
        // unreachable code writes nothing
        let Some(facts) = declared.input(node) else {
            continue;
        };
        if !facts.contains(&Declared(name.clone())) {
            log::trace!("'{}' writes '{}' before declaring it", procedure.name, name);
            written.insert(name.clone());
        }
    }
    Ok(written)
}

/// Scalars written by some procedure of `graph` without a reaching local declaration.
pub fn shared_writes(
    program: &LoopProgram,
    graph: &ControlFlowGraph,
    solver: &DataflowSolver,
) -> AnalysisResult<BTreeSet<String>> {
    let root = program.root_procedure();
    let mut shared = BTreeSet::new();
    for name in graph.procedures() {
        let procedure = if name == graph.root() {
            &root
        } else {
            match program.procedures.get(name) {
                Some(procedure) => procedure,
                None => continue,
            }
        };
        shared.extend(undeclared_writes(procedure, name != graph.root(), solver)?);
    }
    Ok(shared)
}

pub fn verify_writes(
    program: &LoopProgram,
    graph: &ControlFlowGraph,
    solver: &DataflowSolver,
) -> AnalysisResult<Option<Rejection>> {
    let names = shared_writes(program, graph, solver)?;
    if names.is_empty() {
        return Ok(None);
    }
    log::debug!("shared scalars written: {:?}", names);
    Ok(Some(Rejection {
        verifier: VerifierKind::WriteAccess,
        reason: RejectionReason::SharedVariableWrite { names: names.into_iter().collect() },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_loop_cfg;

    fn shared(program: &LoopProgram) -> Vec<String> {
        let (graph, _) = build_loop_cfg(program, true).unwrap();
        shared_writes(program, &graph, &DataflowSolver::default()).unwrap().into_iter().collect()
    }

    #[test]
    fn test_shared_accumulator_rejected() {
        let program = LoopProgram::new(
            "i",
            vec![Instruction::assign(Expr::var("shared"), Expr::add(Expr::var("shared"), Expr::var("i")))],
        );
        let (graph, _) = build_loop_cfg(&program, true).unwrap();
        let rejection = verify_writes(&program, &graph, &DataflowSolver::default()).unwrap().unwrap();
        assert_eq!(rejection.verifier, VerifierKind::WriteAccess);
        assert_eq!(
            rejection.reason,
            RejectionReason::SharedVariableWrite { names: vec!["shared".to_string()] }
        );
    }

    #[test]
    fn test_declared_temporaries_accepted() {
        let program = LoopProgram::new(
            "i",
            vec![Instruction::declare("t"), Instruction::assign(Expr::var("t"), Expr::var("i"))],
        );
        assert!(shared(&program).is_empty());
    }

    #[test]
    fn test_callee_writes_are_checked() {
        let program = LoopProgram::new("i", vec![Instruction::call("bump", vec![])]).with_procedure(
            Procedure::new(
                "bump",
                vec![],
                vec![
                    Instruction::assign(Expr::var("counter"), Expr::int(1)),
                    Instruction::assign(Expr::var("$result_bump"), Expr::int(0)),
                ],
            ),
        );
        assert_eq!(shared(&program), vec!["counter"]);
    }

    #[test]
    fn test_declaration_after_write_does_not_cover_it() {
        let program = LoopProgram::new(
            "i",
            vec![Instruction::assign(Expr::var("sum"), Expr::var("i")), Instruction::declare("sum")],
        );
        assert_eq!(shared(&program), vec!["sum"]);
    }

    #[test]
    fn test_declaration_on_one_branch_does_not_cover_join() {
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::branch(Expr::var("c"), "J"),
                Instruction::declare("x"),
                Instruction::label("J"),
                Instruction::assign(Expr::var("x"), Expr::int(1)),
            ],
        );
        assert_eq!(shared(&program), vec!["x"]);
    }

    #[test]
    fn test_callee_local_does_not_hide_caller_write() {
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::assign(Expr::var("sum"), Expr::var("i")),
                Instruction::call("helper", vec![Expr::var("i")]),
            ],
        )
        .with_procedure(Procedure::new(
            "helper",
            vec!["p".into()],
            vec![Instruction::declare("sum"), Instruction::assign(Expr::var("sum"), Expr::var("p"))],
        ));
        assert_eq!(shared(&program), vec!["sum"]);
    }

    #[test]
    fn test_loop_local_does_not_cover_callee_write() {
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::declare("t"),
                Instruction::assign(Expr::var("t"), Expr::var("i")),
                Instruction::call("touch", vec![]),
            ],
        )
        .with_procedure(Procedure::new("touch", vec![], vec![Instruction::assign(Expr::var("t"), Expr::int(0))]));
        assert_eq!(shared(&program), vec!["t"]);
    }

    #[test]
    fn test_parameters_are_local_to_their_procedure() {
        let program = LoopProgram::new("i", vec![Instruction::call("set", vec![Expr::var("i")])]).with_procedure(
            Procedure::new("set", vec!["p".into()], vec![Instruction::assign(Expr::var("p"), Expr::int(0))]),
        );
        assert!(shared(&program).is_empty());
    }
}
