//! Source positions in `.lir` text, used by lexer and parser errors.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A position in source text (line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// The first character of a file.
    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A range of source text between two locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self { start_line, start_column, end_line, end_column }
    }

    pub fn from_locations(start: SourceLocation, end: SourceLocation) -> Self {
        Self::new(start.line, start.column, end.line, end.column)
    }

    pub fn start(&self) -> SourceLocation {
        SourceLocation::new(self.start_line, self.start_column)
    }

    pub fn end(&self) -> SourceLocation {
        SourceLocation::new(self.end_line, self.end_column)
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let start = self.start().min_by_position(other.start());
        let end = if (self.end_line, self.end_column) >= (other.end_line, other.end_column) {
            self.end()
        } else {
            other.end()
        };
        Span::from_locations(start, end)
    }
}

impl SourceLocation {
    fn min_by_position(self, other: SourceLocation) -> SourceLocation {
        if (self.line, self.column) <= (other.line, other.column) {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_column, self.end_column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        assert_eq!(Span::new(1, 5, 1, 10).to_string(), "1:5-10");
        assert_eq!(Span::new(1, 5, 3, 10).to_string(), "1:5-3:10");
    }

    #[test]
    fn test_span_merge() {
        let merged = Span::new(2, 7, 2, 9).merge(&Span::new(1, 3, 1, 4));
        assert_eq!(merged, Span::new(1, 3, 2, 9));
    }
}
