//! IR-normalizing optimizer passes.
//!
//! The passes bring syntactically different but equal index computations
//! into one form before the verifiers compare them.

pub mod copy_propagation;
pub mod cse;
pub mod pipeline;

pub use copy_propagation::CopyPropagationPass;
pub use cse::CommonSubexpressionElimination;
pub use pipeline::{OptimizationResult, Optimizer, DEFAULT_MAX_OPTIMIZER_ITERATIONS};

use crate::dataflow::DataflowSolver;
use crate::ir::{LoopProgram, Procedure};
use crate::utils::errors::AnalysisResult;

/// Optimizer pass over one procedure.
pub trait Pass {
    /// Rewrite `procedure` in place; returns the number of rewritten
    /// instructions, zero when nothing changed.
    fn apply(&self, procedure: &mut Procedure, solver: &DataflowSolver) -> AnalysisResult<usize>;

    /// Get pass name.
    fn name(&self) -> &str;
}

/// Run the default optimizer over a loop program.
pub fn optimize(program: &mut LoopProgram) -> AnalysisResult<OptimizationResult> {
    Optimizer::default().run(program)
}
