//! Abstract syntax tree for the restricted C subset.
//!
//! Each grammar production is one variant. Same-precedence binary chains
//! are kept as a single node (operands plus the operators between them) so
//! later stages can tell `a < b` from the rejected `a < b < c`.

use crate::token::Span;

/// A whole source file.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub items: Vec<ExternalDecl>,
    pub span: Span,
}

impl TranslationUnit {
    /// Find the function definition with the given name.
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.items.iter().find_map(|item| match item {
            ExternalDecl::Function(f) if f.name.name == name => Some(f),
            _ => None,
        })
    }
}

/// An identifier with its source span.
#[derive(Debug, Clone)]
pub struct Ident {
    /// The identifier name.
    pub name: String,
    /// Source span.
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// A top-level item.
#[derive(Debug, Clone)]
pub enum ExternalDecl {
    Declaration(Declaration),
    Function(FunctionDef),
}

/// `specifiers init-declarator, ... ;`
#[derive(Debug, Clone)]
pub struct Declaration {
    pub specifiers: DeclSpecifiers,
    pub declarators: Vec<InitDeclarator>,
    pub span: Span,
}

/// Storage class keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
}

/// Builtin type keywords, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKeyword {
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
}

/// The non-keyword part of a type: a record, an enum, or a typedef name.
#[derive(Debug, Clone)]
pub enum TypeName {
    Struct(StructSpecifier),
    Enum(Span),
    Typedef(Ident),
}

/// Declaration specifiers: storage class, qualifiers and the base type.
#[derive(Debug, Clone)]
pub struct DeclSpecifiers {
    pub storage: Option<StorageClass>,
    pub is_const: bool,
    pub is_volatile: bool,
    pub keywords: Vec<TypeKeyword>,
    pub named: Option<TypeName>,
    pub span: Span,
}

impl DeclSpecifiers {
    pub fn is_typedef(&self) -> bool {
        self.storage == Some(StorageClass::Typedef)
    }

    pub fn has(&self, kw: TypeKeyword) -> bool {
        self.keywords.contains(&kw)
    }
}

/// Whether a record specifier was written `struct` or `union`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Struct,
    Union,
}

/// `struct Tag { fields }`, `struct { fields }` or `struct Tag`.
#[derive(Debug, Clone)]
pub struct StructSpecifier {
    pub kind: RecordKind,
    pub tag: Option<Ident>,
    /// `None` for a reference to an existing tag, `Some` for a definition.
    pub fields: Option<Vec<FieldDecl>>,
    pub span: Span,
}

/// One member declaration line inside a record body.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub specifiers: DeclSpecifiers,
    pub declarators: Vec<FieldDeclarator>,
    pub span: Span,
}

/// A member declarator with an optional bit-field width.
#[derive(Debug, Clone)]
pub struct FieldDeclarator {
    pub declarator: Declarator,
    pub bit_width: Option<Expr>,
}

/// A declarator plus its initializer.
#[derive(Debug, Clone)]
pub struct InitDeclarator {
    pub declarator: Declarator,
    pub initializer: Option<Initializer>,
}

/// `= expr` or `= { ... }`.
#[derive(Debug, Clone)]
pub enum Initializer {
    Expr(Expr),
    List(Vec<Initializer>, Span),
}

/// `* * name [N] (params) __attribute__((...))`
#[derive(Debug, Clone)]
pub struct Declarator {
    pub pointer_depth: usize,
    pub name: Ident,
    pub suffixes: Vec<DeclaratorSuffix>,
    /// Spans of trailing `__attribute__` or `asm` extensions.
    pub extensions: Vec<Span>,
    pub span: Span,
}

impl Declarator {
    pub fn is_function(&self) -> bool {
        matches!(self.suffixes.first(), Some(DeclaratorSuffix::Function(_)))
    }
}

#[derive(Debug, Clone)]
pub enum DeclaratorSuffix {
    /// `[N]` or `[]`
    Array(Option<Expr>),
    /// `(params)`
    Function(Vec<ParamDecl>),
}

/// A parameter in a function declarator. Unnamed parameters and `...` are
/// accepted but carry no information this project uses.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub specifiers: Option<DeclSpecifiers>,
    pub name: Option<Ident>,
    pub span: Span,
}

/// `specifiers name(params) { body }`
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub specifiers: DeclSpecifiers,
    pub name: Ident,
    pub declarator: Declarator,
    pub body: CompoundStmt,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CompoundStmt {
    pub items: Vec<BlockItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum BlockItem {
    Declaration(Declaration),
    Statement(Stmt),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `expr;`
    Expr(Expr),
    /// `;`
    Empty(Span),
    /// `{ ... }`
    Compound(CompoundStmt),
}

/// An expression.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of expression.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer or character literal.
    Int(i64),
    /// Floating literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Identifier.
    Ident(String),
    /// `( expr )`
    Paren(Box<Expr>),

    /// `base[index]`
    Index { base: Box<Expr>, index: Box<Expr> },
    /// `callee(args)`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `base.field`
    Field { base: Box<Expr>, field: Ident },
    /// `base->field`
    Arrow { base: Box<Expr>, field: Ident },
    /// `operand++` / `operand--`
    PostIncDec { operand: Box<Expr>, increment: bool },

    /// Prefix operator.
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `sizeof expr` or `sizeof(type)`.
    Sizeof(Span),
    /// `(type) expr`
    Cast { operand: Box<Expr> },

    /// Chain of same-precedence binary operators with at least two operands.
    Chain {
        level: ChainLevel,
        operands: Vec<Expr>,
        ops: Vec<BinOp>,
    },

    /// `cond ? then : otherwise`
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `target op= value`
    Assign {
        op: String,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `a, b, c`
    Comma(Vec<Expr>),
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
    AddressOf,
    Deref,
    PreInc,
    PreDec,
}

/// Grammar level of a binary chain, from tightest to loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChainLevel {
    Multiplicative,
    Additive,
    Shift,
    Relational,
    Equality,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
}

impl ChainLevel {
    pub fn name(self) -> &'static str {
        match self {
            ChainLevel::Multiplicative => "multiplicative",
            ChainLevel::Additive => "additive",
            ChainLevel::Shift => "shift",
            ChainLevel::Relational => "relational",
            ChainLevel::Equality => "equality",
            ChainLevel::BitAnd => "bitwise and",
            ChainLevel::BitXor => "bitwise xor",
            ChainLevel::BitOr => "bitwise or",
            ChainLevel::LogicalAnd => "logical and",
            ChainLevel::LogicalOr => "logical or",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn level(self) -> ChainLevel {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Mod => ChainLevel::Multiplicative,
            BinOp::Add | BinOp::Sub => ChainLevel::Additive,
            BinOp::Shl | BinOp::Shr => ChainLevel::Shift,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => ChainLevel::Relational,
            BinOp::Eq | BinOp::Ne => ChainLevel::Equality,
            BinOp::BitAnd => ChainLevel::BitAnd,
            BinOp::BitXor => ChainLevel::BitXor,
            BinOp::BitOr => ChainLevel::BitOr,
            BinOp::And => ChainLevel::LogicalAnd,
            BinOp::Or => ChainLevel::LogicalOr,
        }
    }
}
