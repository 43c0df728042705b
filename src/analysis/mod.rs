//! Verification of loop bodies.
//!
//! The verifiers run over the (optionally interprocedural) CFG of a loop:
//! first the write-access check on scalars, then alias resolution and the
//! array-access check, which needs the loop-dependence and alias facts.

pub mod array_access;
pub mod external_alias;
pub mod verdict;
pub mod write_access;

pub use array_access::{collect_accesses, ArrayAccess, ArrayAccessVerifier};
pub use external_alias::{collect_external_aliases, may_alias, AliasGroup, ExternalAliases};
pub use verdict::{LoopReport, Rejection, RejectionReason, Verdict, VerifierKind};
pub use write_access::{shared_writes, verify_writes};

use crate::cfg::build_loop_cfg;
use crate::dataflow::{AliasAnalysis, DataflowSolver, LoopDependenceAnalysis};
use crate::ir::LoopProgram;
use crate::utils::errors::AnalysisResult;

/// Decide whether the iterations of `program` are independent.
pub fn verify_loop(
    program: &LoopProgram,
    interprocedural: bool,
    solver: &DataflowSolver,
) -> AnalysisResult<Verdict> {
    let (graph, calls) = build_loop_cfg(program, interprocedural)?;
    log::info!(
        "verifying loop over '{}': {} nodes, {} procedures reachable",
        program.induction_variable,
        graph.len(),
        calls.reachable().len()
    );

    if let Some(rejection) = verify_writes(program, &graph, solver)? {
        log::info!("rejected by {}", rejection.verifier);
        return Ok(Verdict::Rejected(rejection));
    }

    let descriptors = solver.solve(&LoopDependenceAnalysis::new(program.induction_variable.clone()), &graph)?;
    let external = collect_external_aliases(program);
    let aliases = solver.solve(&AliasAnalysis::new(external.seeds()), &graph)?;

    match ArrayAccessVerifier::new(&graph, &descriptors, &aliases).verify()? {
        Some(rejection) => {
            log::info!("rejected by {}", rejection.verifier);
            Ok(Verdict::Rejected(rejection))
        }
        None => Ok(Verdict::Parallelizable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Instruction, SymbolInfo, Visibility};

    #[test]
    fn test_write_check_runs_before_array_check() {
        // the constant store would be fatal for the array check
        let program = LoopProgram::new(
            "i",
            vec![
                Instruction::assign(Expr::var("sum"), Expr::var("i")),
                Instruction::assign(Expr::array("a", vec![Expr::int(0)]), Expr::var("i")),
            ],
        )
        .with_symbol(SymbolInfo::array("a", Visibility::Parameter, "int", 1));
        let verdict = verify_loop(&program, true, &DataflowSolver::default()).unwrap();
        assert!(matches!(
            verdict,
            Verdict::Rejected(Rejection { verifier: VerifierKind::WriteAccess, .. })
        ));
    }
}
