//! Verdicts and reports produced for an analyzed loop.

use crate::analysis::array_access::ArrayAccess;
use crate::ir::Expr;
use crate::utils::errors::{AnalysisError, Diagnostic};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifierKind {
    WriteAccess,
    ArrayAccess,
}

impl fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierKind::WriteAccess => write!(f, "write-access verifier"),
            VerifierKind::ArrayAccess => write!(f, "array-access verifier"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Scalars declared outside the loop are written inside it
    SharedVariableWrite { names: Vec<String> },
    /// A written alias group is indexed inconsistently
    ConflictingAccesses { target: Expr, accesses: Vec<ArrayAccess> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub verifier: VerifierKind,
    pub reason: RejectionReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RejectionReason::SharedVariableWrite { names } => {
                write!(f, "{}: shared variable(s) written: {}", self.verifier, names.join(", "))
            }
            RejectionReason::ConflictingAccesses { target, accesses } => {
                write!(f, "{}: alias group '{}' is accessed with different indices", self.verifier, target)?;
                for access in accesses {
                    write!(f, "\n  {}", access)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Iterations carry no dependencies and may run in any order
    Parallelizable,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_parallelizable(&self) -> bool {
        matches!(self, Verdict::Parallelizable)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Parallelizable => write!(f, "parallelizable"),
            Verdict::Rejected(rejection) => write!(f, "not parallelizable ({})", rejection),
        }
    }
}

/// Everything a host records about one loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopReport {
    pub induction_variable: String,
    pub parallelizable: bool,
    /// `None` when the loop could not be analyzed
    pub verdict: Option<Verdict>,
    pub error: Option<AnalysisError>,
    /// Rewrites applied by the optimizer before verification
    pub optimizer_rewrites: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoopReport {
    /// Fold the outcome of the analysis into a report. An analysis error
    /// yields a non-parallelizable report with an error diagnostic.
    pub fn new(induction_variable: impl Into<String>, outcome: Result<Verdict, AnalysisError>) -> Self {
        let induction_variable = induction_variable.into();
        match outcome {
            Ok(verdict) => {
                let diagnostics = match &verdict {
                    Verdict::Parallelizable => vec![Diagnostic::note(format!(
                        "loop over '{}' carries no dependencies",
                        induction_variable
                    ))],
                    Verdict::Rejected(rejection) => {
                        vec![Diagnostic::error(rejection.to_string())]
                    }
                };
                Self {
                    parallelizable: verdict.is_parallelizable(),
                    induction_variable,
                    verdict: Some(verdict),
                    error: None,
                    optimizer_rewrites: 0,
                    diagnostics,
                }
            }
            Err(error) => Self {
                induction_variable,
                parallelizable: false,
                verdict: None,
                diagnostics: vec![Diagnostic::error(format!("unsupported loop: {}", error))
                    .with_note("the loop must not be parallelized")],
                error: Some(error),
                optimizer_rewrites: 0,
            },
        }
    }

    pub fn with_optimizer_rewrites(mut self, rewrites: usize) -> Self {
        self.optimizer_rewrites = rewrites;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }
}

impl fmt::Display for LoopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.verdict, &self.error) {
            (Some(verdict), _) => writeln!(f, "loop over '{}': {}", self.induction_variable, verdict)?,
            (None, Some(error)) => writeln!(f, "loop over '{}': unsupported ({})", self.induction_variable, error)?,
            (None, None) => writeln!(f, "loop over '{}': not analyzed", self.induction_variable)?,
        }
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::{AnalysisErrorKind, DiagnosticSeverity};

    #[test]
    fn test_error_folds_into_unsupported_report() {
        let report = LoopReport::new("i", Err(AnalysisError::unknown_procedure("g")));
        assert!(!report.parallelizable);
        assert!(report.verdict.is_none());
        assert_eq!(report.error.as_ref().map(|e| e.kind), Some(AnalysisErrorKind::UnknownProcedure));
        assert_eq!(report.diagnostics[0].severity, DiagnosticSeverity::Error);
        assert!(report.to_string().contains("unsupported"));
    }

    #[test]
    fn test_rejection_display() {
        let verdict = Verdict::Rejected(Rejection {
            verifier: VerifierKind::WriteAccess,
            reason: RejectionReason::SharedVariableWrite { names: vec!["sum".into()] },
        });
        assert_eq!(
            verdict.to_string(),
            "not parallelizable (write-access verifier: shared variable(s) written: sum)"
        );
        let report = LoopReport::new("i", Ok(verdict));
        assert!(!report.parallelizable);
    }

    #[test]
    fn test_report_serializes() {
        let report = LoopReport::new("i", Ok(Verdict::Parallelizable));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"parallelizable\":true"));
    }
}
