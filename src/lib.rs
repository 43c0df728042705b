//! # loopdep - Loop-carried dependence verifier
//!
//! Decides whether the iterations of a counted loop, already lowered to a
//! flat three-address IR, are free of loop-carried dependencies and may run
//! in any order.
//!
//! ## Architecture
//!
//! ```text
//! .lir text → Frontend → IR → Optimizer (CSE, copy propagation)
//!           → CFG (+ call graph) → Dataflow (loop dependence, aliases)
//!           → Verifiers (write access, array access) → LoopReport
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use loopdep::prelude::*;
//!
//! let source = r#"
//!     symbol a: param double[];
//!     loop i = 0 to n {
//!         var t;
//!         t = i + 1;
//!         a[t] = 0;
//!     }
//! "#;
//!
//! let program = loopdep::parse(source)?;
//! let report = loopdep::analyze(&program, &AnalysisConfig::default());
//! assert!(report.parallelizable);
//! ```

#![warn(clippy::all)]

pub mod analysis;
pub mod cfg;
pub mod dataflow;
pub mod frontend;
pub mod ir;
pub mod transform;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{verify_loop, LoopReport, Rejection, RejectionReason, Verdict, VerifierKind};
    pub use crate::cfg::{build_loop_cfg, build_procedure_cfg, CallGraph, ControlFlowGraph, NodeId};
    pub use crate::dataflow::{DataflowAnalysis, DataflowResult, DataflowSolver, Direction};
    pub use crate::frontend::{parse, ParseError};
    pub use crate::ir::*;
    pub use crate::transform::{Optimizer, Pass};
    pub use crate::utils::errors::*;
    pub use crate::utils::pretty::PrettyPrint;
    pub use crate::AnalysisConfig;
}

use analysis::LoopReport;
use anyhow::Result;
use dataflow::{DataflowSolver, DEFAULT_MAX_ITERATIONS};
use ir::LoopProgram;
use transform::{Optimizer, DEFAULT_MAX_OPTIMIZER_ITERATIONS};
use utils::errors::{Diagnostic, LoopDepError};

/// Main entry point for parsing `.lir` source.
pub fn parse(source: &str) -> Result<LoopProgram> {
    frontend::parse(source)
}

/// Configuration for one loop analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Normalize the IR with CSE and copy propagation before verifying
    pub optimize: bool,
    /// Stitch callee bodies into the CFG
    pub interprocedural: bool,
    /// Cap on optimizer rounds per procedure
    pub max_optimizer_iterations: usize,
    /// Cap on edge visits per dataflow solve
    pub max_dataflow_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            interprocedural: true,
            max_optimizer_iterations: DEFAULT_MAX_OPTIMIZER_ITERATIONS,
            max_dataflow_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl AnalysisConfig {
    /// Verify the IR exactly as supplied.
    pub fn unoptimized() -> Self {
        Self { optimize: false, ..Default::default() }
    }

    /// Leave invocations unresolved instead of stitching callees.
    pub fn intraprocedural() -> Self {
        Self { interprocedural: false, ..Default::default() }
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_interprocedural(mut self, interprocedural: bool) -> Self {
        self.interprocedural = interprocedural;
        self
    }

    pub fn with_max_optimizer_iterations(mut self, iterations: usize) -> Self {
        self.max_optimizer_iterations = iterations;
        self
    }

    pub fn with_max_dataflow_iterations(mut self, iterations: usize) -> Self {
        self.max_dataflow_iterations = iterations;
        self
    }

    fn solver(&self) -> DataflowSolver {
        DataflowSolver::new(self.max_dataflow_iterations)
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Optimize a copy of `program` as configured and return it with the rewrite count.
pub fn optimized(program: &LoopProgram, config: &AnalysisConfig) -> utils::errors::AnalysisResult<(LoopProgram, usize, bool)> {
    let mut program = program.clone();
    if !config.optimize {
        return Ok((program, 0, true));
    }
    let result = Optimizer::new(config.max_optimizer_iterations, config.solver()).run(&mut program)?;
    Ok((program, result.rewrites, result.converged))
}

/// Run the full pipeline on one loop. Unsupported input yields a
/// non-parallelizable report rather than an error.
pub fn analyze(program: &LoopProgram, config: &AnalysisConfig) -> LoopReport {
    let induction_variable = program.induction_variable.clone();
    let (program, rewrites, converged) = match optimized(program, config) {
        Ok(optimized) => optimized,
        Err(error) => {
            log::warn!("optimizer failed on loop over '{}': {}", induction_variable, error);
            return LoopReport::new(induction_variable, Err(error));
        }
    };

    let outcome = analysis::verify_loop(&program, config.interprocedural, &config.solver());
    if let Err(error) = &outcome {
        log::warn!("loop over '{}' is unsupported: {}", induction_variable, error);
    }

    let mut report = LoopReport::new(induction_variable, outcome).with_optimizer_rewrites(rewrites);
    if !converged {
        report = report.with_diagnostic(Diagnostic::warning(format!(
            "optimizer stopped after {} rounds without reaching a fixed point",
            config.max_optimizer_iterations
        )));
    }
    report
}

/// Parse `.lir` source and analyze its loop.
///
/// Only malformed source is an error; unsupported loops are reported.
pub fn analyze_source(source: &str, config: &AnalysisConfig) -> std::result::Result<LoopReport, LoopDepError> {
    let program = parse(source).map_err(LoopDepError::from_frontend)?;
    Ok(analyze(&program, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Verdict;
    use crate::utils::errors::AnalysisErrorKind;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_config_presets() {
        assert!(AnalysisConfig::default().optimize);
        assert!(!AnalysisConfig::unoptimized().optimize);
        assert!(!AnalysisConfig::intraprocedural().interprocedural);
        let config = AnalysisConfig::default().with_max_dataflow_iterations(10);
        assert_eq!(config.max_dataflow_iterations, 10);
    }

    #[test]
    fn test_analyze_source_parallelizable() {
        let report = analyze_source(
            "symbol a: param int[];
             loop i = 0 to n { a[i] = i; }",
            &AnalysisConfig::default(),
        )
        .unwrap();
        assert!(report.parallelizable);
        assert_eq!(report.verdict, Some(Verdict::Parallelizable));
    }

    #[test]
    fn test_unsupported_loop_folds_into_report() {
        let report = analyze_source("loop i { x = f(i); }", &AnalysisConfig::default()).unwrap();
        assert!(!report.parallelizable);
        assert_eq!(report.error.map(|e| e.kind), Some(AnalysisErrorKind::UnknownProcedure));
    }

    #[test]
    fn test_parse_errors_are_errors() {
        let config = AnalysisConfig::default();
        assert!(matches!(analyze_source("loop i { x = ; }", &config), Err(LoopDepError::Parse(_))));
        assert!(matches!(analyze_source("loop i { x = #; }", &config), Err(LoopDepError::Lexer(_))));
    }
}
