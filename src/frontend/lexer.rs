//! Lexer for the textual loop IR.
//!
//! The lexer converts `.lir` source text into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{LexerError, LexerErrorKind};
use crate::utils::location::{SourceLocation, Span};
use std::iter::Peekable;
use std::str::Chars;
use unicode_xid::UnicodeXID;

/// A lexer for tokenizing source code.
pub struct Lexer<'a> {
    /// The source text
    source: &'a str,
    /// Character iterator
    chars: Peekable<Chars<'a>>,
    /// Current byte offset
    offset: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start of current token
    token_start: SourceLocation,
    /// Byte offset of the current token
    token_offset: usize,
    /// Whether we've hit EOF
    at_eof: bool,
}

fn is_identifier_start(c: char) -> bool {
    c.is_xid_start() || c == '_' || c == '$'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_xid_continue() || c == '$'
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
            token_offset: 0,
            at_eof: false,
        }
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn mark_token_start(&mut self) {
        self.token_start = self.current_location();
        self.token_offset = self.offset;
    }

    fn make_span(&self) -> Span {
        Span::from_locations(self.token_start, self.current_location())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Peek at the next character (one ahead).
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_is_digit(&mut self) -> bool {
        self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false)
    }

    /// Skip whitespace and `//` / `/* */` comments.
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.advance() {
                        if c == '*' && self.match_char('/') {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        let lexeme = self.source[self.token_offset..self.offset].to_string();
        Token::new(kind, self.make_span(), lexeme)
    }

    fn make_error(&self, message: &str, kind: LexerErrorKind) -> LexerError {
        LexerError {
            message: message.to_string(),
            span: self.make_span(),
            kind,
        }
    }

    fn scan_number(&mut self) -> Result<Token, LexerError> {
        while self.peek_is_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            self.advance();
            while self.peek_is_digit() {
                self.advance();
            }
        }

        if self.peek() == Some('e') || self.peek() == Some('E') {
            is_float = true;
            self.advance();
            if self.peek() == Some('+') || self.peek() == Some('-') {
                self.advance();
            }
            if !self.peek_is_digit() {
                return Err(self.make_error("Invalid floating-point exponent", LexerErrorKind::InvalidNumber));
            }
            while self.peek_is_digit() {
                self.advance();
            }
        }

        if self.peek().map(is_identifier_start).unwrap_or(false) {
            self.advance();
            return Err(self.make_error("Invalid number literal", LexerErrorKind::InvalidNumber));
        }

        Ok(self.make_token(if is_float { TokenKind::Float } else { TokenKind::Integer }))
    }

    fn scan_identifier(&mut self) -> Token {
        while self.peek().map(is_identifier_continue).unwrap_or(false) {
            self.advance();
        }
        let lexeme = &self.source[self.token_offset..self.offset];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    /// Pick `double` when the next character is `next`, `single` otherwise.
    fn either(&mut self, next: char, double: TokenKind, single: TokenKind) -> Token {
        let kind = if self.match_char(next) { double } else { single };
        self.make_token(kind)
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();
        self.mark_token_start();

        let c = match self.advance() {
            Some(c) => c,
            None => {
                self.at_eof = true;
                return Ok(self.make_token(TokenKind::Eof));
            }
        };

        let token = match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            ',' => self.make_token(TokenKind::Comma),
            ';' => self.make_token(TokenKind::Semicolon),
            ':' => self.make_token(TokenKind::Colon),
            '?' => self.make_token(TokenKind::Question),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '*' => self.make_token(TokenKind::Star),
            '/' => self.make_token(TokenKind::Slash),
            '%' => self.make_token(TokenKind::Percent),
            '^' => self.make_token(TokenKind::Caret),
            '=' => self.either('=', TokenKind::EqualEqual, TokenKind::Equal),
            '&' => self.either('&', TokenKind::AmpAmp, TokenKind::Amp),
            '|' => self.either('|', TokenKind::PipePipe, TokenKind::Pipe),
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else {
                    return Err(self.make_error("Expected '!=', found single '!'", LexerErrorKind::UnexpectedChar));
                }
            }
            '<' => {
                if self.match_char('<') {
                    self.make_token(TokenKind::ShiftLeft)
                } else {
                    self.either('=', TokenKind::LessEqual, TokenKind::Less)
                }
            }
            '>' => {
                if self.match_char('>') {
                    self.make_token(TokenKind::ShiftRight)
                } else {
                    self.either('=', TokenKind::GreaterEqual, TokenKind::Greater)
                }
            }
            c if c.is_ascii_digit() => return self.scan_number(),
            c if is_identifier_start(c) => self.scan_identifier(),
            _ => {
                return Err(self.make_error(
                    &format!("Unexpected character: '{}'", c),
                    LexerErrorKind::UnexpectedChar,
                ))
            }
        };
        Ok(token)
    }

    pub fn is_at_end(&self) -> bool {
        self.at_eof
    }

    /// Collect all tokens into a vector.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_eof {
            None
        } else {
            Some(self.next_token())
        }
    }
}
