//! Lexer for the constraint source language.
//!
//! Converts C declaration/expression text into a stream of tokens.
//! Comments and preprocessor lines are kept as trivia tokens.

use crate::token::{Span, Token, TokenKind};
use std::str::Chars;

/// Lexer for constraint source text.
pub struct Lexer<'a> {
    /// Source text being lexed.
    source: &'a str,
    /// Character iterator.
    chars: Chars<'a>,
    /// Current byte position.
    pos: usize,
    /// Current line number (1-indexed).
    line: u32,
    /// Current column number (1-indexed).
    column: u32,
    /// Start position of current token.
    token_start: usize,
    /// Start line of current token.
    token_start_line: u32,
    /// Start column of current token.
    token_start_column: u32,
    /// True until the first non-whitespace character of a line is seen.
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
            at_line_start: true,
        }
    }

    /// Tokenize the entire source, returning all tokens including EOF.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.mark_token_start();

        let Some(c) = self.peek() else {
            return self.make_token(TokenKind::Eof);
        };

        if c == '#' && self.at_line_start {
            return self.lex_directive();
        }
        self.at_line_start = false;

        if c == '/' && self.peek_next() == Some('/') {
            return self.lex_comment();
        }
        if c == '/' && self.peek_next() == Some('*') {
            return self.lex_block_comment();
        }
        if c == '"' {
            return self.lex_string();
        }
        if c == '\'' {
            return self.lex_char();
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit()))
        {
            return self.lex_number();
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return self.lex_identifier();
        }

        self.lex_operator_or_punctuation()
    }

    /// Skip whitespace characters.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                if c == '\n' {
                    self.at_line_start = true;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Mark the start of a new token.
    fn mark_token_start(&mut self) {
        self.token_start = self.pos;
        self.token_start_line = self.line;
        self.token_start_column = self.column;
    }

    /// Peek at the current character without consuming it.
    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Peek at the next character (after current) without consuming.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next()
    }

    /// Advance to the next character, returning the current one.
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the current character if it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Create a token with the current span.
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            Span::new(
                self.token_start,
                self.pos,
                self.token_start_line,
                self.token_start_column,
            ),
        )
    }

    /// Get the text of the current token.
    fn token_text(&self) -> &'a str {
        &self.source[self.token_start..self.pos]
    }

    /// Lex a `#` preprocessor line, honoring backslash continuations.
    fn lex_directive(&mut self) -> Token {
        self.advance();
        let content_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\\' && self.peek_next() == Some('\n') {
                self.advance();
                self.advance();
                continue;
            }
            if c == '\n' {
                break;
            }
            self.advance();
        }
        let content = self.source[content_start..self.pos].to_string();
        self.make_token(TokenKind::Directive(content))
    }

    /// Lex a single-line comment.
    fn lex_comment(&mut self) -> Token {
        self.advance();
        self.advance();
        let content_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        let content = self.source[content_start..self.pos].to_string();
        self.make_token(TokenKind::Comment(content))
    }

    /// Lex a `/* */` comment. C block comments do not nest.
    fn lex_block_comment(&mut self) -> Token {
        self.advance();
        self.advance();
        let content_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    return self
                        .make_token(TokenKind::Error("unterminated block comment".to_string()));
                }
                Some('*') if self.peek_next() == Some('/') => {
                    let content = self.source[content_start..self.pos].to_string();
                    self.advance();
                    self.advance();
                    return self.make_token(TokenKind::Comment(content));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Lex a string literal.
    fn lex_string(&mut self) -> Token {
        self.advance();
        let mut content = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return self
                        .make_token(TokenKind::Error("unterminated string literal".to_string()));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance().and_then(unescape) {
                        Some(c) => content.push(c),
                        None => {
                            return self.make_token(TokenKind::Error(
                                "invalid escape sequence".to_string(),
                            ));
                        }
                    }
                }
                Some(c) => {
                    content.push(c);
                    self.advance();
                }
            }
        }
        self.make_token(TokenKind::StringLit(content))
    }

    /// Lex a character literal as its integer code.
    fn lex_char(&mut self) -> Token {
        self.advance();
        let value = match self.advance() {
            Some('\\') => self.advance().and_then(unescape),
            Some('\'') | Some('\n') | None => None,
            Some(c) => Some(c),
        };
        match value {
            Some(c) if self.eat('\'') => self.make_token(TokenKind::Integer(c as i64)),
            _ => self.make_token(TokenKind::Error("invalid character literal".to_string())),
        }
    }

    /// Lex an integer or floating literal, stripping C suffixes.
    fn lex_number(&mut self) -> Token {
        let is_hex = self.peek() == Some('0') && matches!(self.peek_next(), Some('x' | 'X'));
        if is_hex {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let source = self.source;
            let digits = &source[digits_start..self.pos];
            self.skip_int_suffix();
            return match i64::from_str_radix(digits, 16) {
                Ok(n) => self.make_token(TokenKind::Integer(n)),
                Err(_) => self.make_token(TokenKind::Error(format!(
                    "invalid hex literal: {}",
                    self.token_text()
                ))),
            };
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_follows = match self.peek_next() {
                Some(d) if d.is_ascii_digit() => true,
                Some('+' | '-') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    ahead.next();
                    ahead.next().is_some_and(|d| d.is_ascii_digit())
                }
                _ => false,
            };
            if exponent_follows {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.advance();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = self.token_text();
        if is_float {
            while matches!(self.peek(), Some('f' | 'F' | 'l' | 'L')) {
                self.advance();
            }
            return match text.parse::<f64>() {
                Ok(x) => self.make_token(TokenKind::Float(x)),
                Err(_) => self.make_token(TokenKind::Error(format!("invalid float: {text}"))),
            };
        }

        self.skip_int_suffix();
        let parsed = if text.len() > 1 && text.starts_with('0') {
            i64::from_str_radix(&text[1..], 8)
        } else {
            text.parse::<i64>()
        };
        match parsed {
            Ok(n) => self.make_token(TokenKind::Integer(n)),
            Err(_) => self.make_token(TokenKind::Error(format!("invalid integer: {text}"))),
        }
    }

    fn skip_int_suffix(&mut self) {
        while matches!(self.peek(), Some('u' | 'U' | 'l' | 'L')) {
            self.advance();
        }
    }

    /// Lex an identifier or keyword.
    fn lex_identifier(&mut self) -> Token {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let text = self.token_text();
        match TokenKind::keyword(text) {
            Some(keyword) => self.make_token(keyword),
            None => self.make_token(TokenKind::Ident(text.to_string())),
        }
    }

    /// Lex an operator or punctuation.
    fn lex_operator_or_punctuation(&mut self) -> Token {
        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '~' => TokenKind::Tilde,
            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::CompoundAssign("+=")
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else if self.eat('=') {
                    TokenKind::CompoundAssign("-=")
                } else {
                    TokenKind::Minus
                }
            }
            '*' => self.with_assign(TokenKind::Star, "*="),
            '/' => self.with_assign(TokenKind::Slash, "/="),
            '%' => self.with_assign(TokenKind::Percent, "%="),
            '^' => self.with_assign(TokenKind::Caret, "^="),
            '&' => {
                if self.eat('&') {
                    TokenKind::AmpAmp
                } else {
                    self.with_assign(TokenKind::Amp, "&=")
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::PipePipe
                } else {
                    self.with_assign(TokenKind::Pipe, "|=")
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '<' => {
                if self.eat('<') {
                    self.with_assign(TokenKind::Shl, "<<=")
                } else if self.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    self.with_assign(TokenKind::Shr, ">>=")
                } else if self.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            _ => TokenKind::Error(format!("unexpected character: {c}")),
        };
        self.make_token(kind)
    }

    fn with_assign(&mut self, plain: TokenKind, compound: &'static str) -> TokenKind {
        if self.eat('=') {
            TokenKind::CompoundAssign(compound)
        } else {
            plain
        }
    }
}

fn unescape(c: char) -> Option<char> {
    Some(match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        _ => return None,
    })
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.is_eof() {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            lex("unsigned long x[3];"),
            vec![
                TokenKind::Unsigned,
                TokenKind::Long,
                TokenKind::Ident("x".to_string()),
                TokenKind::LBracket,
                TokenKind::Integer(3),
                TokenKind::RBracket,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(
            lex("42 0x1F 010 7u 3UL 1.5 2.0f .25 1e3"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Integer(31),
                TokenKind::Integer(8),
                TokenKind::Integer(7),
                TokenKind::Integer(3),
                TokenKind::Float(1.5),
                TokenKind::Float(2.0),
                TokenKind::Float(0.25),
                TokenKind::Float(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_float_keyword_and_literal() {
        assert_eq!(
            lex("float f; f > 0.5;"),
            vec![
                TokenKind::KwFloat,
                TokenKind::Ident("f".to_string()),
                TokenKind::Semicolon,
                TokenKind::Ident("f".to_string()),
                TokenKind::Gt,
                TokenKind::Float(0.5),
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_char_literal() {
        assert_eq!(
            lex("'a' '\\n'"),
            vec![
                TokenKind::Integer(97),
                TokenKind::Integer(10),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("a->b && c || !d <= e >> 2 != f <<= 1 ..."),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Arrow,
                TokenKind::Ident("b".to_string()),
                TokenKind::AmpAmp,
                TokenKind::Ident("c".to_string()),
                TokenKind::PipePipe,
                TokenKind::Bang,
                TokenKind::Ident("d".to_string()),
                TokenKind::Le,
                TokenKind::Ident("e".to_string()),
                TokenKind::Shr,
                TokenKind::Integer(2),
                TokenKind::Ne,
                TokenKind::Ident("f".to_string()),
                TokenKind::CompoundAssign("<<="),
                TokenKind::Integer(1),
                TokenKind::Ellipsis,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_and_directives_are_trivia() {
        let tokens = lex("#include <stdio.h>\nint /* c */ a; // tail\n");
        assert!(matches!(tokens[0], TokenKind::Directive(_)));
        assert!(tokens[0].is_trivia());
        assert_eq!(tokens[1], TokenKind::Int);
        assert_eq!(tokens[2], TokenKind::Comment(" c ".to_string()));
        assert_eq!(tokens[3], TokenKind::Ident("a".to_string()));
        assert_eq!(tokens[4], TokenKind::Semicolon);
        assert_eq!(tokens[5], TokenKind::Comment(" tail".to_string()));
    }

    #[test]
    fn test_hash_mid_line_is_error() {
        let tokens = lex("a # b");
        assert!(matches!(tokens[1], TokenKind::Error(_)));
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = Lexer::new("int a;\n  int b;").tokenize();
        let b = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident("b".to_string()))
            .unwrap();
        assert_eq!(b.span.line, 2);
        assert_eq!(b.span.column, 7);
    }

    #[test]
    fn test_unterminated_comment() {
        let tokens = lex("/* never closed");
        assert!(matches!(tokens[0], TokenKind::Error(_)));
    }

    #[test]
    fn test_gcc_keywords() {
        assert_eq!(
            lex("__attribute__ __asm__"),
            vec![TokenKind::Attribute, TokenKind::Asm, TokenKind::Eof]
        );
    }
}
