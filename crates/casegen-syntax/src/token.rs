//! Token types and source span tracking for the constraint lexer.

use std::fmt;

/// A span in the source code, tracking byte offsets and line/column.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, in characters not bytes).
    pub column: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Create a dummy span for synthesized nodes.
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: if self.line <= other.line {
                self.column
            } else {
                other.column
            },
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slice the covered text out of `source`, or `""` if out of bounds.
    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The kind of token.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // === Declaration keywords ===
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
    Const,
    Volatile,
    Void,
    Char,
    Short,
    Int,
    Long,
    KwFloat,
    Double,
    Signed,
    Unsigned,
    Struct,
    Union,
    Enum,
    Sizeof,

    // === Statement keywords (recognized only to be rejected) ===
    Return,
    If,
    Else,
    While,
    For,
    Do,

    // === GCC extensions ===
    /// `__attribute__`
    Attribute,
    /// `asm` / `__asm__`
    Asm,

    // === Punctuation ===
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Question,
    Dot,
    /// `->`
    Arrow,
    /// `...`
    Ellipsis,

    // === Operators ===
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `=`
    Assign,
    /// Compound assignment such as `+=` or `<<=`; holds the operator text.
    CompoundAssign(&'static str),

    // === Literals ===
    /// Integer literal (suffixes stripped, char literals included).
    Integer(i64),
    /// Floating literal (suffixes stripped).
    Float(f64),
    /// String literal (without quotes).
    StringLit(String),
    /// Identifier
    Ident(String),

    // === Trivia ===
    /// `//` or `/* */` comment
    Comment(String),
    /// `#...` preprocessor line
    Directive(String),

    // === Special ===
    /// End of file
    Eof,
    /// Lexer error
    Error(String),
}

impl TokenKind {
    /// Get the keyword for a given identifier, if any.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "typedef" => TokenKind::Typedef,
            "extern" => TokenKind::Extern,
            "static" => TokenKind::Static,
            "auto" => TokenKind::Auto,
            "register" => TokenKind::Register,
            "const" => TokenKind::Const,
            "volatile" => TokenKind::Volatile,
            "void" => TokenKind::Void,
            "char" => TokenKind::Char,
            "short" => TokenKind::Short,
            "int" => TokenKind::Int,
            "long" => TokenKind::Long,
            "float" => TokenKind::KwFloat,
            "double" => TokenKind::Double,
            "signed" => TokenKind::Signed,
            "unsigned" => TokenKind::Unsigned,
            "struct" => TokenKind::Struct,
            "union" => TokenKind::Union,
            "enum" => TokenKind::Enum,
            "sizeof" => TokenKind::Sizeof,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "do" => TokenKind::Do,
            "__attribute__" => TokenKind::Attribute,
            "asm" | "__asm__" => TokenKind::Asm,
            _ => return None,
        })
    }

    /// Check if this token is a keyword.
    pub fn is_keyword(&self) -> bool {
        self.keyword_text().is_some()
    }

    fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::Typedef => "typedef",
            TokenKind::Extern => "extern",
            TokenKind::Static => "static",
            TokenKind::Auto => "auto",
            TokenKind::Register => "register",
            TokenKind::Const => "const",
            TokenKind::Volatile => "volatile",
            TokenKind::Void => "void",
            TokenKind::Char => "char",
            TokenKind::Short => "short",
            TokenKind::Int => "int",
            TokenKind::Long => "long",
            TokenKind::KwFloat => "float",
            TokenKind::Double => "double",
            TokenKind::Signed => "signed",
            TokenKind::Unsigned => "unsigned",
            TokenKind::Struct => "struct",
            TokenKind::Union => "union",
            TokenKind::Enum => "enum",
            TokenKind::Sizeof => "sizeof",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::Do => "do",
            TokenKind::Attribute => "__attribute__",
            TokenKind::Asm => "asm",
            _ => return None,
        })
    }

    /// Keywords that may start a declaration specifier list.
    pub fn starts_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Typedef
                | TokenKind::Extern
                | TokenKind::Static
                | TokenKind::Auto
                | TokenKind::Register
                | TokenKind::Const
                | TokenKind::Volatile
                | TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::KwFloat
                | TokenKind::Double
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
        )
    }

    /// Check if this is a trivia token (comment, preprocessor line).
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Comment(_) | TokenKind::Directive(_))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kw) = self.keyword_text() {
            return write!(f, "{kw}");
        }
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::PlusPlus => write!(f, "++"),
            TokenKind::MinusMinus => write!(f, "--"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::AmpAmp => write!(f, "&&"),
            TokenKind::PipePipe => write!(f, "||"),
            TokenKind::Shl => write!(f, "<<"),
            TokenKind::Shr => write!(f, ">>"),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Le => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Ge => write!(f, ">="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::Ne => write!(f, "!="),
            TokenKind::Assign => write!(f, "="),
            TokenKind::CompoundAssign(op) => write!(f, "{op}"),
            TokenKind::Integer(n) => write!(f, "{n}"),
            TokenKind::Float(x) => write!(f, "{x}"),
            TokenKind::StringLit(s) => write!(f, "\"{s}\""),
            TokenKind::Ident(s) => write!(f, "{s}"),
            TokenKind::Comment(s) => write!(f, "/*{s}*/"),
            TokenKind::Directive(s) => write!(f, "#{s}"),
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Error(msg) => write!(f, "ERROR: {msg}"),
            _ => Ok(()),
        }
    }
}

/// A token with its span in the source code.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The span in the source code.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Check if this is the end of file.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Check if this is an error token.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let s1 = Span::new(0, 5, 1, 1);
        let s2 = Span::new(10, 15, 1, 11);
        let merged = s1.merge(s2);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 15);
    }

    #[test]
    fn test_span_slice() {
        let src = "int a;";
        assert_eq!(Span::new(4, 5, 1, 5).slice(src), "a");
        assert_eq!(Span::new(4, 50, 1, 5).slice(src), "");
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("typedef"), Some(TokenKind::Typedef));
        assert_eq!(TokenKind::keyword("__asm__"), Some(TokenKind::Asm));
        assert_eq!(TokenKind::keyword("_LENGTH"), None);
    }

    #[test]
    fn test_keyword_display_round_trips() {
        for kw in ["struct", "unsigned", "sizeof", "__attribute__"] {
            let kind = TokenKind::keyword(kw).unwrap();
            assert!(kind.is_keyword());
            assert_eq!(kind.to_string(), kw);
        }
        assert!(!TokenKind::LParen.is_keyword());
        assert!(!TokenKind::Integer(42).is_keyword());
    }
}
