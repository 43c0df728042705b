//! Optimizer driver.
//!
//! Interleaves CSE and copy propagation until neither changes the code or
//! the iteration cap is reached. Every pass recomputes its facts over a fresh
//! intraprocedural CFG, so rewrites from the previous pass are always seen.

use crate::dataflow::DataflowSolver;
use crate::ir::{LoopProgram, Procedure, LOOP_PROCEDURE};
use crate::transform::{CommonSubexpressionElimination, CopyPropagationPass, Pass};
use crate::utils::errors::AnalysisResult;
use serde::{Deserialize, Serialize};

/// Default cap on optimizer rounds per procedure.
pub const DEFAULT_MAX_OPTIMIZER_ITERATIONS: usize = 16;

/// Summary of an optimizer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Passes that changed something, in application order
    pub applied_passes: Vec<String>,
    /// Total number of rewritten instructions
    pub rewrites: usize,
    /// Whether every procedure reached a fixed point within the cap
    pub converged: bool,
}

impl OptimizationResult {
    pub fn modified(&self) -> bool {
        self.rewrites > 0
    }
}

pub struct Optimizer {
    passes: Vec<Box<dyn Pass>>,
    max_iterations: usize,
    solver: DataflowSolver,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPTIMIZER_ITERATIONS, DataflowSolver::default())
    }
}

impl Optimizer {
    pub fn new(max_iterations: usize, solver: DataflowSolver) -> Self {
        Self {
            passes: vec![Box::new(CommonSubexpressionElimination), Box::new(CopyPropagationPass)],
            max_iterations,
            solver,
        }
    }

    /// Optimize the loop body and every supplied procedure in place.
    pub fn run(&self, program: &mut LoopProgram) -> AnalysisResult<OptimizationResult> {
        let mut result = OptimizationResult { converged: true, ..Default::default() };

        let mut root = Procedure::new(LOOP_PROCEDURE, Vec::new(), std::mem::take(&mut program.body));
        let outcome = self.run_procedure(&mut root, &mut result);
        program.body = root.body;
        outcome?;

        for procedure in program.procedures.values_mut() {
            self.run_procedure(procedure, &mut result)?;
        }

        log::info!(
            "optimizer: {} rewrites, passes applied: {:?}",
            result.rewrites,
            result.applied_passes
        );
        Ok(result)
    }

    /// Drive the passes over one procedure to a fixed point.
    pub fn run_procedure(&self, procedure: &mut Procedure, result: &mut OptimizationResult) -> AnalysisResult<()> {
        for round in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                let rewrites = pass.apply(procedure, &self.solver)?;
                if rewrites > 0 {
                    changed = true;
                    result.rewrites += rewrites;
                    result.applied_passes.push(pass.name().to_string());
                }
            }
            if !changed {
                log::trace!("'{}' stable after {} rounds", procedure.name, round + 1);
                return Ok(());
            }
        }
        log::warn!(
            "optimizer stopped on '{}' after {} rounds without reaching a fixed point",
            procedure.name,
            self.max_iterations
        );
        result.converged = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Instruction};

    fn x_plus_1() -> Expr {
        Expr::add(Expr::var("x"), Expr::int(1))
    }

    #[test]
    fn test_cse_then_copy_propagation() {
        let mut program = LoopProgram::new(
            "i",
            vec![
                Instruction::declare("a"),
                Instruction::assign(Expr::var("a"), x_plus_1()),
                Instruction::declare("b"),
                Instruction::assign(Expr::var("b"), x_plus_1()),
                Instruction::declare("c"),
                Instruction::assign(Expr::var("c"), Expr::mul(Expr::var("b"), Expr::int(2))),
            ],
        );
        let result = Optimizer::default().run(&mut program).unwrap();
        assert!(result.modified());
        assert!(result.converged);
        assert_eq!(program.body[3], Instruction::assign(Expr::var("b"), Expr::var("a")));
        assert_eq!(
            program.body[5],
            Instruction::assign(Expr::var("c"), Expr::mul(Expr::var("a"), Expr::int(2)))
        );
    }

    #[test]
    fn test_optimizer_is_idempotent() {
        let mut program = LoopProgram::new(
            "i",
            vec![
                Instruction::assign(Expr::var("x"), Expr::var("y")),
                Instruction::assign(Expr::var("z"), Expr::var("x")),
                Instruction::assign(Expr::var("w"), Expr::add(Expr::var("z"), Expr::var("z"))),
                Instruction::assign(Expr::var("v"), Expr::add(Expr::var("z"), Expr::var("z"))),
            ],
        );
        let optimizer = Optimizer::default();
        optimizer.run(&mut program).unwrap();
        let once = program.clone();
        let again = optimizer.run(&mut program).unwrap();
        assert!(!again.modified());
        assert_eq!(program, once);
    }

    #[test]
    fn test_procedures_are_optimized() {
        let mut program = LoopProgram::new("i", vec![]).with_procedure(Procedure::new(
            "f",
            vec!["p".into()],
            vec![
                Instruction::assign(Expr::var("q"), Expr::var("p")),
                Instruction::assign(Expr::var("$result_f"), Expr::var("q")),
            ],
        ));
        let result = Optimizer::default().run(&mut program).unwrap();
        assert_eq!(result.rewrites, 1);
        assert_eq!(
            program.procedures["f"].body[1],
            Instruction::assign(Expr::var("$result_f"), Expr::var("p"))
        );
    }

    #[test]
    fn test_iteration_cap_reported() {
        let mut program = LoopProgram::new(
            "i",
            vec![
                Instruction::assign(Expr::var("x"), Expr::var("y")),
                Instruction::assign(Expr::var("z"), Expr::var("x")),
                Instruction::assign(Expr::var("w"), Expr::var("z")),
            ],
        );
        let result = Optimizer::new(1, DataflowSolver::default()).run(&mut program).unwrap();
        assert!(!result.converged);
    }
}
