//! Frontend: lexer and parser for the textual loop IR (`.lir`).
//!
//! `.lir` is the lowered form a host-language front-end hands to the engine,
//! written out as text:
//!
//! ```text
//! symbol a: param double[];
//! proc scale(x) { $result_scale = x * 2; }
//! loop i = 0 to n {
//!     var t;
//!     t = scale(i);
//!     a[t] = 0;
//! }
//! ```

pub mod lexer;
pub mod parser;
pub mod token;

// Re-exports
pub use crate::utils::errors::ParseError;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Token, TokenKind};

use crate::ir::LoopProgram;
use anyhow::Result;

/// Parse `.lir` source into a loop program.
pub fn parse(source: &str) -> Result<LoopProgram> {
    let lexer = Lexer::new(source);
    let mut parser = Parser::new(lexer)?;
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::pretty::PrettyPrint;

    #[test]
    fn test_parse_simple() {
        let source = r#"
            symbol a: param int[];
            loop i = 0 to 10 {
                a[i] = i;
            }
        "#;
        let program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1);
        assert!(program.symbols.get("a").is_some());
    }

    #[test]
    fn test_listing_reads_back() {
        let source = r#"
            symbol a: param double[] assign(ref);
            proc f(p) { $result_f = (p + 1) * 2; }
            loop i = 0 to n {
                var t;
                t = f(i);
                if t < 0 goto done;
                a[t] = -1;
              done:
            }
        "#;
        let program = parse(source).unwrap();
        let again = parse(&program.pretty()).unwrap();
        assert_eq!(again, program);
    }
}
