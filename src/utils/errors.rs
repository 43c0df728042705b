//! Error types for the loop dependence engine.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use thiserror::Error;
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum LoopDepError {
    /// Error while tokenizing textual IR
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    /// Error while parsing textual IR
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The loop cannot be analyzed
    #[error("Unsupported loop: {0}")]
    Analysis(#[from] AnalysisError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoopDepError {
    /// Recover the typed error behind a frontend failure.
    pub fn from_frontend(error: anyhow::Error) -> Self {
        match error.downcast::<ParseError>() {
            Ok(err) => LoopDepError::Parse(err),
            Err(error) => match error.downcast::<LexerError>() {
                Ok(err) => LoopDepError::Lexer(err),
                Err(error) => LoopDepError::Internal(format!("{:#}", error)),
            },
        }
    }
}

/// Error during lexical analysis.
#[derive(Error, Debug, Clone)]
pub struct LexerError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of lexer error
    pub kind: LexerErrorKind,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerErrorKind {
    /// Unexpected character
    UnexpectedChar,
    /// Invalid number literal
    InvalidNumber,
}

/// Error during parsing.
#[derive(Error, Debug, Clone)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// What was found
    pub found: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Unexpected token
    UnexpectedToken,
    /// Expected an expression
    ExpectedExpression,
    /// Assignment to something that is not a variable or array element
    InvalidTarget,
    /// Missing or duplicated `loop` item
    InvalidLoop,
    /// Duplicate procedure or symbol
    DuplicateDefinition,
}

/// The engine cannot reason about the supplied IR.
///
/// Raised for the current loop only; the loop must not be parallelized.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisError {
    /// The error message, naming the offending construct
    pub message: String,
    /// The kind of unsupported input
    pub kind: AnalysisErrorKind,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisErrorKind {
    /// Invocation of a procedure with no supplied IR
    UnknownProcedure,
    /// Jump to a label that does not exist
    UnknownLabel,
    /// Label defined twice in one procedure
    DuplicateLabel,
    /// Array access with zero accessor dimensions
    EmptyAccessor,
    /// No accessor dimension varies with the iteration
    NoLoopDependentDimension,
    /// More than one accessor dimension varies with the iteration
    AmbiguousLoopDependentDimension,
    /// A name resolves to no alias at a program point
    UnresolvedAlias,
    /// The fixed-point solver hit its iteration cap
    NotConverged,
}

impl AnalysisError {
    pub fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }

    pub fn unknown_procedure(name: &str) -> Self {
        Self::new(AnalysisErrorKind::UnknownProcedure, format!("unknown procedure '{}'", name))
    }

    pub fn unknown_label(label: &str, procedure: &str) -> Self {
        Self::new(
            AnalysisErrorKind::UnknownLabel,
            format!("jump to unknown label '{}' in '{}'", label, procedure),
        )
    }

    pub fn duplicate_label(label: &str, procedure: &str) -> Self {
        Self::new(
            AnalysisErrorKind::DuplicateLabel,
            format!("label '{}' is defined twice in '{}'", label, procedure),
        )
    }
}

/// Result type for the analysis phases.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// A diagnostic message with severity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: DiagnosticSeverity,
    /// Message
    pub message: String,
    /// Primary span
    pub span: Option<Span>,
    /// Additional notes
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    /// The loop must not be parallelized
    Error,
    /// Analysis continued but the result may be conservative
    Warning,
    /// Informational message
    Note,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Create a new note diagnostic.
    pub fn note(message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Note,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Add a span to the diagnostic.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Add a note to the diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Note => "note",
        };
        write!(f, "{}: {}", label, self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {}", span)?;
        }
        for note in &self.notes {
            write!(f, "\n  = {}", note)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError {
            message: "Unexpected token".to_string(),
            span: Span::new(1, 5, 1, 10),
            kind: ParseErrorKind::UnexpectedToken,
            found: Some("number".to_string()),
        };
        let s = format!("{}", err);
        assert!(s.contains("Unexpected token"));
        assert!(s.contains("number"));
    }

    #[test]
    fn test_analysis_error_wraps() {
        let err: LoopDepError = AnalysisError::unknown_procedure("helper").into();
        assert!(err.to_string().contains("helper"));
        assert!(err.to_string().starts_with("Unsupported loop"));
    }

    #[test]
    fn test_frontend_errors_keep_their_type() {
        let parse: anyhow::Error = ParseError {
            message: "Expected expression".to_string(),
            span: Span::new(1, 1, 1, 2),
            kind: ParseErrorKind::ExpectedExpression,
            found: None,
        }
        .into();
        assert!(matches!(LoopDepError::from_frontend(parse), LoopDepError::Parse(_)));

        let other = anyhow::anyhow!("disk on fire");
        assert!(matches!(LoopDepError::from_frontend(other), LoopDepError::Internal(_)));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error("shared variable 'sum' is written")
            .with_note("declare it inside the loop");
        let text = diag.to_string();
        assert!(text.starts_with("error: shared variable"));
        assert!(text.contains("= declare it inside the loop"));
    }
}
