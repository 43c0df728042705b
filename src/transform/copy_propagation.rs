//! Copy propagation.

use crate::cfg::build_procedure_cfg;
use crate::dataflow::{copies_of, CopyPropagation, DataflowSolver};
use crate::ir::{Expr, Procedure};
use crate::transform::Pass;
use crate::utils::errors::AnalysisResult;

/// Replaces a scalar read by its copy source when exactly one copy is live.
///
/// Chains move one hop per application.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPropagationPass;

impl Pass for CopyPropagationPass {
    fn name(&self) -> &str {
        "copy-propagation"
    }

    fn apply(&self, procedure: &mut Procedure, solver: &DataflowSolver) -> AnalysisResult<usize> {
        let graph = build_procedure_cfg(procedure)?;
        let copies = solver.solve(&CopyPropagation::new(), &graph)?;

        let mut rewrites = 0;
        for (index, instr) in procedure.body.iter_mut().enumerate() {
            let Some(node) = graph.instruction_node(&procedure.name, index) else {
                continue;
            };
            let facts = copies.facts_at(node);
            if facts.is_empty() {
                continue;
            }

            let rewritten = instr.map_reads(&mut |name: &str| {
                let mut sources = copies_of(&facts, name);
                match (sources.next(), sources.next()) {
                    (Some(source), None) => Some(Expr::var(source)),
                    _ => None,
                }
            });
            if rewritten != *instr {
                log::debug!("copy propagation in '{}': {} -> {}", procedure.name, instr, rewritten);
                *instr = rewritten;
                rewrites += 1;
            }
        }
        Ok(rewrites)
    }
}
