//! Token types for the textual loop IR.

use crate::utils::location::Span;
use std::fmt;

/// A token in the source code.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The lexeme (raw text)
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Whether this is the identifier `word`.
    ///
    /// Visibilities, rebinding kinds and rebinding values are contextual
    /// words, lexed as identifiers.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == word
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.lexeme)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    Integer,
    Float,

    /// Identifier; `$` is allowed so synthetic names can be written back
    Identifier,

    // Keywords
    /// `loop`
    Loop,
    /// `proc`
    Proc,
    /// `symbol`
    Symbol,
    /// `var`
    Var,
    /// `goto`
    Goto,
    /// `if`
    If,
    /// `call`
    Call,
    /// `to`
    To,

    // Arithmetic operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison operators
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Operators kept opaque by the analyses
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    ShiftLeft,
    ShiftRight,

    /// `=`
    Equal,
    /// `?`
    Question,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Colon,

    /// End of file
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(self, Loop | Proc | Symbol | Var | Goto | If | Call | To)
    }

    pub fn is_comparison(&self) -> bool {
        use TokenKind::*;
        matches!(self, EqualEqual | BangEqual | Less | LessEqual | Greater | GreaterEqual)
    }

    /// Get the keyword for a string, if it is a keyword.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "loop" => Some(TokenKind::Loop),
            "proc" => Some(TokenKind::Proc),
            "symbol" => Some(TokenKind::Symbol),
            "var" => Some(TokenKind::Var),
            "goto" => Some(TokenKind::Goto),
            "if" => Some(TokenKind::If),
            "call" => Some(TokenKind::Call),
            "to" => Some(TokenKind::To),
            _ => None,
        }
    }

    /// Get a human-readable name for this token kind.
    pub fn name(&self) -> &'static str {
        use TokenKind::*;
        match self {
            Integer => "integer",
            Float => "float",
            Identifier => "identifier",
            Loop => "loop",
            Proc => "proc",
            Symbol => "symbol",
            Var => "var",
            Goto => "goto",
            If => "if",
            Call => "call",
            To => "to",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            EqualEqual => "==",
            BangEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Amp => "&",
            AmpAmp => "&&",
            Pipe => "|",
            PipePipe => "||",
            Caret => "^",
            ShiftLeft => "<<",
            ShiftRight => ">>",
            Equal => "=",
            Question => "?",
            LeftParen => "(",
            RightParen => ")",
            LeftBracket => "[",
            RightBracket => "]",
            LeftBrace => "{",
            RightBrace => "}",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
