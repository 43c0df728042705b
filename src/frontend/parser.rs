//! Parser for the textual loop IR.
//!
//! A recursive descent parser that reads `.lir` items (symbols, procedures
//! and exactly one loop) straight into a [`LoopProgram`].

use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::ir::{
    BinaryOp, CompareOp, Expr, Instruction, LoopProgram, Procedure, RebindingKind, RebindingValue,
    SymbolInfo, SymbolTable, Visibility,
};
use crate::utils::errors::{ParseError, ParseErrorKind};
use crate::utils::location::Span;
use anyhow::Result;
use std::collections::BTreeMap;

/// A parser for `.lir` source.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
}

/// Items collected before the program is assembled.
#[derive(Default)]
struct Items {
    the_loop: Option<(String, Option<(Expr, Expr)>, Vec<Instruction>)>,
    procedures: BTreeMap<String, Procedure>,
    symbols: SymbolTable,
}

impl<'a> Parser<'a> {
    /// Create a new parser from a lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let first_token = lexer.next_token()?;
        Ok(Self {
            lexer,
            current: first_token.clone(),
            previous: first_token,
        })
    }

    /// Parse a complete program.
    pub fn parse_program(&mut self) -> Result<LoopProgram> {
        let mut items = Items::default();

        while !self.is_at_end() {
            match self.current.kind {
                TokenKind::Symbol => {
                    let start = self.current.span;
                    let symbol = self.parse_symbol()?;
                    if items.symbols.get(&symbol.name).is_some() {
                        return Err(self.error_at(
                            start,
                            ParseErrorKind::DuplicateDefinition,
                            format!("symbol '{}' is declared twice", symbol.name),
                        ));
                    }
                    items.symbols.insert(symbol);
                }
                TokenKind::Proc => {
                    let start = self.current.span;
                    let procedure = self.parse_procedure()?;
                    if items.procedures.contains_key(&procedure.name) {
                        return Err(self.error_at(
                            start,
                            ParseErrorKind::DuplicateDefinition,
                            format!("procedure '{}' is defined twice", procedure.name),
                        ));
                    }
                    items.procedures.insert(procedure.name.clone(), procedure);
                }
                TokenKind::Loop => {
                    let start = self.current.span;
                    let parsed = self.parse_loop()?;
                    if items.the_loop.is_some() {
                        return Err(self.error_at(start, ParseErrorKind::InvalidLoop, "only one loop is allowed"));
                    }
                    items.the_loop = Some(parsed);
                }
                _ => {
                    return Err(self.error(
                        ParseErrorKind::UnexpectedToken,
                        "Expected 'loop', 'proc' or 'symbol'",
                    ))
                }
            }
        }

        let Some((induction_variable, bounds, body)) = items.the_loop else {
            return Err(self.error(ParseErrorKind::InvalidLoop, "missing 'loop' item"));
        };
        let mut program = LoopProgram::new(induction_variable, body);
        if let Some((lower, upper)) = bounds {
            program = program.with_bounds(lower, upper);
        }
        program.procedures = items.procedures;
        program.symbols = items.symbols;
        log::debug!(
            "parsed loop over '{}': {} instructions, {} procedures, {} symbols",
            program.induction_variable,
            program.body.len(),
            program.procedures.len(),
            program.symbols.len()
        );
        Ok(program)
    }

    /// `loop i = <expr> to <expr> { ... }`, bounds optional.
    fn parse_loop(&mut self) -> Result<(String, Option<(Expr, Expr)>, Vec<Instruction>)> {
        self.consume(TokenKind::Loop, "Expected 'loop'")?;
        let induction_variable = self.consume_identifier("Expected induction variable")?;
        let bounds = if self.match_token(TokenKind::Equal)? {
            let lower = self.parse_expression()?;
            self.consume(TokenKind::To, "Expected 'to' in loop header")?;
            let upper = self.parse_expression()?;
            Some((lower, upper))
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok((induction_variable, bounds, body))
    }

    fn parse_procedure(&mut self) -> Result<Procedure> {
        self.consume(TokenKind::Proc, "Expected 'proc'")?;
        let name = self.consume_identifier("Expected procedure name")?;

        self.consume(TokenKind::LeftParen, "Expected '(' after procedure name")?;
        let mut parameters = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                parameters.push(self.consume_identifier("Expected parameter name")?);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;

        let body = self.parse_block()?;
        Ok(Procedure::new(name, parameters, body))
    }

    /// `symbol a: param double[] init(fresh) assign(null);`
    fn parse_symbol(&mut self) -> Result<SymbolInfo> {
        self.consume(TokenKind::Symbol, "Expected 'symbol'")?;
        let name = self.consume_identifier("Expected symbol name")?;
        self.consume(TokenKind::Colon, "Expected ':' after symbol name")?;

        let visibility = if self.current.is_word("local") {
            Visibility::Local
        } else if self.current.is_word("param") {
            Visibility::Parameter
        } else if self.current.is_word("private") {
            Visibility::PrivateMember
        } else if self.current.is_word("public") {
            Visibility::PublicMember
        } else {
            return Err(self.error(
                ParseErrorKind::UnexpectedToken,
                "Expected visibility 'local', 'param', 'private' or 'public'",
            ));
        };
        self.advance()?;

        let element = self.consume_identifier("Expected element type")?;
        let mut rank = 0;
        while self.match_token(TokenKind::LeftBracket)? {
            self.consume(TokenKind::RightBracket, "Expected ']' in array type")?;
            rank += 1;
        }

        let mut symbol = if rank == 0 {
            SymbolInfo::scalar(name, visibility, &element)
        } else {
            SymbolInfo::array(name, visibility, &element, rank)
        };

        while self.check(TokenKind::Identifier) {
            let kind = if self.current.is_word("init") {
                RebindingKind::Initializer
            } else if self.current.is_word("assign") {
                RebindingKind::Assignment
            } else if self.current.is_word("refarg") {
                RebindingKind::RefArgument
            } else {
                return Err(self.error(
                    ParseErrorKind::UnexpectedToken,
                    "Expected rebinding 'init', 'assign' or 'refarg'",
                ));
            };
            self.advance()?;
            self.consume(TokenKind::LeftParen, "Expected '(' after rebinding kind")?;
            let value = if self.current.is_word("fresh") {
                RebindingValue::FreshConstruction
            } else if self.current.is_word("null") {
                RebindingValue::NullLiteral
            } else if self.current.is_word("ref") {
                RebindingValue::Reference
            } else {
                return Err(self.error(
                    ParseErrorKind::UnexpectedToken,
                    "Expected rebinding value 'fresh', 'null' or 'ref'",
                ));
            };
            self.advance()?;
            self.consume(TokenKind::RightParen, "Expected ')' after rebinding value")?;
            symbol = symbol.with_rebinding(kind, value);
        }

        self.consume(TokenKind::Semicolon, "Expected ';' after symbol")?;
        Ok(symbol)
    }

    fn parse_block(&mut self) -> Result<Vec<Instruction>> {
        self.consume(TokenKind::LeftBrace, "Expected '{'")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            body.push(self.parse_instruction()?);
        }
        self.consume(TokenKind::RightBrace, "Expected '}'")?;
        Ok(body)
    }

    fn parse_instruction(&mut self) -> Result<Instruction> {
        match self.current.kind {
            TokenKind::Var => {
                self.advance()?;
                let name = self.consume_identifier("Expected variable name")?;
                self.consume(TokenKind::Semicolon, "Expected ';' after declaration")?;
                Ok(Instruction::declare(name))
            }
            TokenKind::Goto => {
                self.advance()?;
                let target = self.consume_identifier("Expected label after 'goto'")?;
                self.consume(TokenKind::Semicolon, "Expected ';' after jump")?;
                Ok(Instruction::jump(target))
            }
            TokenKind::If => {
                self.advance()?;
                let condition = self.parse_expression()?;
                self.consume(TokenKind::Goto, "Expected 'goto' after condition")?;
                let target = self.consume_identifier("Expected label after 'goto'")?;
                self.consume(TokenKind::Semicolon, "Expected ';' after jump")?;
                Ok(Instruction::branch(condition, target))
            }
            TokenKind::Call => {
                self.advance()?;
                let name = self.consume_identifier("Expected procedure name after 'call'")?;
                self.consume(TokenKind::LeftParen, "Expected '(' after procedure name")?;
                let arguments = self.parse_args()?;
                self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
                self.consume(TokenKind::Semicolon, "Expected ';' after call")?;
                Ok(Instruction::call(name, arguments))
            }
            TokenKind::Identifier => self.parse_label_or_assignment(),
            _ => Err(self.error(ParseErrorKind::UnexpectedToken, "Expected instruction")),
        }
    }

    /// `L:`, `x = e;` or `a[i]... = e;`
    fn parse_label_or_assignment(&mut self) -> Result<Instruction> {
        let start = self.current.span;
        let name = self.consume_identifier("Expected identifier")?;
        if self.match_token(TokenKind::Colon)? {
            return Ok(Instruction::label(name));
        }

        let target = if self.check(TokenKind::LeftBracket) {
            Expr::array(name, self.parse_accessors()?)
        } else {
            Expr::var(name)
        };

        if !self.check(TokenKind::Equal) {
            let span = start.merge(&self.current.span);
            return Err(self.error_at(span, ParseErrorKind::InvalidTarget, "Expected '=' or ':' after target"));
        }
        self.advance()?;
        let value = self.parse_expression()?;
        self.consume(TokenKind::Semicolon, "Expected ';' after assignment")?;
        Ok(Instruction::assign(target, value))
    }

    fn parse_accessors(&mut self) -> Result<Vec<Expr>> {
        let mut accessors = Vec::new();
        while self.match_token(TokenKind::LeftBracket)? {
            accessors.push(self.parse_expression()?);
            self.consume(TokenKind::RightBracket, "Expected ']'")?;
        }
        Ok(accessors)
    }

    // Expression parsing with precedence climbing
    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_conditional_expr()
    }

    fn parse_conditional_expr(&mut self) -> Result<Expr> {
        let condition = self.parse_binary_expr(0)?;
        if !self.match_token(TokenKind::Question)? {
            return Ok(condition);
        }
        let when_true = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' in conditional expression")?;
        let when_false = self.parse_expression()?;
        Ok(Expr::conditional(condition, when_true, when_false))
    }

    /// Left-associative binary operators, loosest level first.
    fn parse_binary_expr(&mut self, level: usize) -> Result<Expr> {
        const LEVELS: usize = 10;
        if level == LEVELS {
            return self.parse_unary_expr();
        }

        let mut left = self.parse_binary_expr(level + 1)?;
        while let Some(op) = binary_operator(self.current.kind, level) {
            self.advance()?;
            let right = self.parse_binary_expr(level + 1)?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        if !self.match_token(TokenKind::Minus)? {
            return self.parse_primary_expr();
        }
        // negative literals are constants, not negations
        match self.parse_unary_expr()? {
            Expr::IntegerLiteral(value) => match value.checked_neg() {
                Some(negated) => Ok(Expr::int(negated)),
                None => Ok(Expr::neg(Expr::int(value))),
            },
            Expr::DoubleLiteral(value) => Ok(Expr::double(-value.get())),
            operand => Ok(Expr::neg(operand)),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.current.kind {
            TokenKind::Integer => {
                let value: i64 = self.current.lexeme.parse().map_err(|_| {
                    self.error(ParseErrorKind::ExpectedExpression, "Integer literal out of range")
                })?;
                self.advance()?;
                Ok(Expr::int(value))
            }
            TokenKind::Float => {
                let value: f64 = self
                    .current
                    .lexeme
                    .parse()
                    .map_err(|_| self.error(ParseErrorKind::ExpectedExpression, "Invalid float literal"))?;
                self.advance()?;
                Ok(Expr::double(value))
            }
            TokenKind::Identifier => {
                let name = self.current.lexeme.clone();
                self.advance()?;
                if self.match_token(TokenKind::LeftParen)? {
                    let arguments = self.parse_args()?;
                    self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
                    Ok(Expr::call(name, arguments))
                } else if self.check(TokenKind::LeftBracket) {
                    Ok(Expr::array(name, self.parse_accessors()?))
                } else {
                    Ok(Expr::var(name))
                }
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "Expected ')'")?;
                Ok(Expr::paren(inner))
            }
            _ => Err(self.error(ParseErrorKind::ExpectedExpression, "Expected expression")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        Ok(args)
    }

    // Helper methods
    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Result<&Token> {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(&self.previous)
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.error(ParseErrorKind::UnexpectedToken, format!("{}: expected '{}'", message, kind)))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<String> {
        if self.check(TokenKind::Identifier) {
            let name = self.current.lexeme.clone();
            self.advance()?;
            Ok(name)
        } else {
            Err(self.error(ParseErrorKind::UnexpectedToken, message))
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> Result<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Error at the current token.
    fn error(&self, kind: ParseErrorKind, message: impl Into<String>) -> anyhow::Error {
        self.error_at(self.current.span, kind, message)
    }

    fn error_at(&self, span: Span, kind: ParseErrorKind, message: impl Into<String>) -> anyhow::Error {
        let found = if self.is_at_end() {
            TokenKind::Eof.name().to_string()
        } else {
            self.current.lexeme.clone()
        };
        ParseError {
            message: message.into(),
            span,
            kind,
            found: Some(found),
        }
        .into()
    }
}

/// Operator of precedence `level` for `kind`, if any.
fn binary_operator(kind: TokenKind, level: usize) -> Option<BinaryOp> {
    use TokenKind::*;
    let generic = |op: &str| Some(BinaryOp::Generic(op.to_string()));
    match (level, kind) {
        (0, PipePipe) => generic("||"),
        (1, AmpAmp) => generic("&&"),
        (2, Pipe) => generic("|"),
        (3, Caret) => generic("^"),
        (4, Amp) => generic("&"),
        (5, EqualEqual) => Some(BinaryOp::Comparison(CompareOp::Eq)),
        (5, BangEqual) => Some(BinaryOp::Comparison(CompareOp::Ne)),
        (6, Less) => Some(BinaryOp::Comparison(CompareOp::Lt)),
        (6, LessEqual) => Some(BinaryOp::Comparison(CompareOp::Le)),
        (6, Greater) => Some(BinaryOp::Comparison(CompareOp::Gt)),
        (6, GreaterEqual) => Some(BinaryOp::Comparison(CompareOp::Ge)),
        (7, ShiftLeft) => generic("<<"),
        (7, ShiftRight) => generic(">>"),
        (8, Plus) => Some(BinaryOp::Add),
        (8, Minus) => Some(BinaryOp::Subtract),
        (9, Star) => Some(BinaryOp::Multiply),
        (9, Slash) => Some(BinaryOp::Divide),
        (9, Percent) => Some(BinaryOp::Modulo),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<LoopProgram> {
        Parser::new(Lexer::new(source))?.parse_program()
    }

    fn parse_error(source: &str) -> ParseError {
        let err = parse(source).unwrap_err();
        err.downcast_ref::<ParseError>().cloned().unwrap()
    }

    #[test]
    fn test_minimal_loop() {
        let program = parse("loop i { }").unwrap();
        assert_eq!(program.induction_variable, "i");
        assert!(program.body.is_empty());
        assert!(program.lower_bound.is_none());
    }

    #[test]
    fn test_loop_with_bounds() {
        let program = parse("loop i = 0 to n { a[i] = 0; }").unwrap();
        assert_eq!(program.lower_bound, Some(Expr::int(0)));
        assert_eq!(program.upper_bound, Some(Expr::var("n")));
        assert_eq!(
            program.body,
            vec![Instruction::assign(Expr::array("a", vec![Expr::var("i")]), Expr::int(0))]
        );
    }

    #[test]
    fn test_instructions() {
        let program = parse(
            "loop i {
                var t;
                t = i * 2;
                if t > 4 goto skip;
                call f(t, 1);
                goto skip;
              skip:
            }
            proc f(p, q) { }",
        )
        .unwrap();
        assert_eq!(
            program.body,
            vec![
                Instruction::declare("t"),
                Instruction::assign(Expr::var("t"), Expr::mul(Expr::var("i"), Expr::int(2))),
                Instruction::branch(Expr::compare(CompareOp::Gt, Expr::var("t"), Expr::int(4)), "skip"),
                Instruction::call("f", vec![Expr::var("t"), Expr::int(1)]),
                Instruction::jump("skip"),
                Instruction::label("skip"),
            ]
        );
        assert_eq!(program.procedures["f"].parameters, vec!["p", "q"]);
    }

    #[test]
    fn test_precedence() {
        let program = parse("loop i { x = a + b * c - d; y = a << 1 + 2; }").unwrap();
        let expected_x = Expr::sub(
            Expr::add(Expr::var("a"), Expr::mul(Expr::var("b"), Expr::var("c"))),
            Expr::var("d"),
        );
        assert_eq!(program.body[0], Instruction::assign(Expr::var("x"), expected_x));
        let expected_y = Expr::binary(
            BinaryOp::Generic("<<".into()),
            Expr::var("a"),
            Expr::add(Expr::int(1), Expr::int(2)),
        );
        assert_eq!(program.body[1], Instruction::assign(Expr::var("y"), expected_y));
    }

    #[test]
    fn test_unary_minus_and_literals() {
        let program = parse("loop i { x = -1; y = -i; z = -(i); w = 2.5; }").unwrap();
        assert_eq!(program.body[0], Instruction::assign(Expr::var("x"), Expr::int(-1)));
        assert_eq!(program.body[1], Instruction::assign(Expr::var("y"), Expr::neg(Expr::var("i"))));
        assert_eq!(
            program.body[2],
            Instruction::assign(Expr::var("z"), Expr::neg(Expr::paren(Expr::var("i"))))
        );
        assert_eq!(program.body[3], Instruction::assign(Expr::var("w"), Expr::double(2.5)));
    }

    #[test]
    fn test_conditional_and_calls() {
        let program = parse("loop i { x = c ? f(i) : a[i][j]; }").unwrap();
        assert_eq!(
            program.body[0],
            Instruction::assign(
                Expr::var("x"),
                Expr::conditional(
                    Expr::var("c"),
                    Expr::call("f", vec![Expr::var("i")]),
                    Expr::array("a", vec![Expr::var("i"), Expr::var("j")]),
                ),
            )
        );
    }

    #[test]
    fn test_modulo_and_divide_are_multiplicative() {
        let program = parse("loop i { x = i % 2 + i / 3; }").unwrap();
        assert_eq!(
            program.body[0],
            Instruction::assign(
                Expr::var("x"),
                Expr::add(Expr::rem(Expr::var("i"), Expr::int(2)), Expr::div(Expr::var("i"), Expr::int(3))),
            )
        );
    }

    #[test]
    fn test_symbols() {
        let program = parse(
            "symbol a: param double[];
             symbol b: local int[][] init(fresh) assign(null) refarg(ref);
             symbol n: private int;
             loop i { }",
        )
        .unwrap();
        let a = program.symbols.get("a").unwrap();
        assert_eq!(a.visibility, Visibility::Parameter);
        assert_eq!(a.rank, 1);
        assert!(a.element_type.is_value_type);
        let b = program.symbols.get("b").unwrap();
        assert_eq!(b.rank, 2);
        assert_eq!(b.rebindings.len(), 3);
        assert_eq!(b.rebindings[0].value, RebindingValue::FreshConstruction);
        assert_eq!(b.rebindings[2].kind, RebindingKind::RefArgument);
        assert!(!program.symbols.get("n").unwrap().is_array());
    }

    #[test]
    fn test_synthetic_names() {
        let program = parse("loop i { var $arg_f_0; $arg_f_0 = i; }").unwrap();
        assert_eq!(program.body[0], Instruction::declare("$arg_f_0"));
    }

    #[test]
    fn test_missing_loop() {
        assert_eq!(parse_error("proc f() { }").kind, ParseErrorKind::InvalidLoop);
    }

    #[test]
    fn test_two_loops() {
        assert_eq!(parse_error("loop i { } loop j { }").kind, ParseErrorKind::InvalidLoop);
    }

    #[test]
    fn test_duplicate_definitions() {
        assert_eq!(
            parse_error("proc f() { } proc f() { } loop i { }").kind,
            ParseErrorKind::DuplicateDefinition
        );
        assert_eq!(
            parse_error("symbol a: local int; symbol a: local int; loop i { }").kind,
            ParseErrorKind::DuplicateDefinition
        );
    }

    #[test]
    fn test_invalid_target() {
        let err = parse_error("loop i { x + 1; }");
        assert_eq!(err.kind, ParseErrorKind::InvalidTarget);
        assert_eq!(err.span.start_line, 1);
    }

    #[test]
    fn test_error_carries_position() {
        let err = parse_error("loop i {\n  x = ;\n}");
        assert_eq!(err.kind, ParseErrorKind::ExpectedExpression);
        assert_eq!(err.span.start_line, 2);
        assert_eq!(err.span.start_column, 7);
        assert_eq!(err.found.as_deref(), Some(";"));
    }

    #[test]
    fn test_bad_visibility() {
        assert_eq!(
            parse_error("symbol a: global int[]; loop i { }").kind,
            ParseErrorKind::UnexpectedToken
        );
    }

    #[test]
    fn test_lexer_error_propagates() {
        let err = parse("loop i { x = #; }").unwrap_err();
        assert!(err.downcast_ref::<crate::utils::errors::LexerError>().is_some());
    }
}
