//! Tokenizer: converts script text into a token stream.
//!
//! Handles keywords, identifiers, string/int/float literals and operator
//! symbols. `#` starts a comment running to the end of the line.

use crate::ast::Span;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Fn,
    Let,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    Pass,
    Record,
    And,
    Or,
    Not,
    True,
    False,
    None,

    // Literals
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Symbols
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,
    DotDot,
    At,
    Arrow,
    Pipe,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: u32,
    column: u32,
}

impl Tokenizer {
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenizes the entire input. The stream always ends with [`Token::Eof`].
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, CoreError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let span = self.current_span();
            let Some(ch) = self.peek() else {
                tokens.push(SpannedToken {
                    token: Token::Eof,
                    span,
                });
                return Ok(tokens);
            };
            let token = self.next_token(ch, span)?;
            tokens.push(SpannedToken { token, span });
        }
    }

    // ── Character helpers ──────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self, ch: char, span: Span) -> Result<Token, CoreError> {
        if ch.is_ascii_digit() {
            return self.read_number(span);
        }
        if ch.is_alphabetic() || ch == '_' {
            return Ok(self.read_word());
        }
        if ch == '"' {
            return self.read_string(span);
        }

        self.advance();
        let next = self.peek();
        let token = match (ch, next) {
            ('-', Some('>')) => self.take(Token::Arrow),
            ('/', Some('/')) => self.take(Token::SlashSlash),
            ('=', Some('=')) => self.take(Token::EqEq),
            ('!', Some('=')) => self.take(Token::NotEq),
            ('<', Some('=')) => self.take(Token::Le),
            ('>', Some('=')) => self.take(Token::Ge),
            ('.', Some('.')) => self.take(Token::DotDot),
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('{', _) => Token::LBrace,
            ('}', _) => Token::RBrace,
            ('[', _) => Token::LBracket,
            (']', _) => Token::RBracket,
            (',', _) => Token::Comma,
            (':', _) => Token::Colon,
            (';', _) => Token::Semi,
            ('.', _) => Token::Dot,
            ('@', _) => Token::At,
            ('|', _) => Token::Pipe,
            ('=', _) => Token::Assign,
            ('<', _) => Token::Lt,
            ('>', _) => Token::Gt,
            ('+', _) => Token::Plus,
            ('-', _) => Token::Minus,
            ('*', _) => Token::Star,
            ('/', _) => Token::Slash,
            ('%', _) => Token::Percent,
            (other, _) => {
                return Err(CoreError::parse(
                    span,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        Ok(token)
    }

    /// Consumes the second character of a two-character symbol.
    fn take(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match word.as_str() {
            "fn" => Token::Fn,
            "let" => Token::Let,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "in" => Token::In,
            "return" => Token::Return,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "pass" => Token::Pass,
            "record" => Token::Record,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            "none" => Token::None,
            _ => Token::Ident(word),
        }
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self, span: Span) -> Result<Token, CoreError> {
        let mut text = String::new();
        self.read_digits(&mut text);

        let mut is_float = false;
        // `1..5` is a range, `1.5` a float.
        if self.peek() == Some('.') && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_ahead(1);
            let digit_at = if matches!(sign, Some('+' | '-')) { 2 } else { 1 };
            if self.peek_ahead(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.advance();
                if digit_at == 2 {
                    if let Some(s) = self.advance() {
                        text.push(s);
                    }
                }
                self.read_digits(&mut text);
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| CoreError::parse(span, format!("invalid float '{text}': {e}")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|e| CoreError::parse(span, format!("invalid integer '{text}': {e}")))
        }
    }

    fn read_string(&mut self, span: Span) -> Result<Token, CoreError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(CoreError::parse(span, "unterminated string literal")),
                Some('"') => return Ok(Token::Str(value)),
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(other) => {
                            return Err(CoreError::parse(
                                self.current_span(),
                                format!("unknown escape '\\{other}'"),
                            ))
                        }
                        None => {
                            return Err(CoreError::parse(span, "unterminated string literal"))
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }
}
