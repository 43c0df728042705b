//! Common subexpression elimination.

use crate::cfg::build_procedure_cfg;
use crate::dataflow::{AvailableExpressions, DataflowSolver};
use crate::ir::{Expr, Instruction, Procedure};
use crate::transform::Pass;
use crate::utils::errors::AnalysisResult;

/// Replaces `x = e` by `x = y` when `y = e` is available, `y != x` and `e`
/// does not read `x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonSubexpressionElimination;

impl Pass for CommonSubexpressionElimination {
    fn name(&self) -> &str {
        "cse"
    }

    fn apply(&self, procedure: &mut Procedure, solver: &DataflowSolver) -> AnalysisResult<usize> {
        let graph = build_procedure_cfg(procedure)?;
        let available = solver.solve(&AvailableExpressions::new(), &graph)?;

        let mut rewrites = 0;
        for (index, instr) in procedure.body.iter_mut().enumerate() {
            let Instruction::Assignment { target: Expr::Variable(target), value } = instr else {
                continue;
            };
            if !value.is_reusable_computation() || value.reads(target) {
                continue;
            }
            let Some(node) = graph.instruction_node(&procedure.name, index) else {
                continue;
            };

            let facts = available.facts_at(node);
            let reuse = facts
                .iter()
                .filter(|f| f.expression == *value && f.target != *target)
                .min_by_key(|f| f.node);
            if let Some(fact) = reuse {
                log::debug!("cse in '{}': {} = {} -> {}", procedure.name, target, value, fact.target);
                *value = Expr::var(fact.target.clone());
                rewrites += 1;
            }
        }
        Ok(rewrites)
    }
}
