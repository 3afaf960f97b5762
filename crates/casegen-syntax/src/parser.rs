//! Recursive descent parser for the restricted C subset.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use std::collections::HashSet;
use thiserror::Error;

/// Parser error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of file at {span}")]
    UnexpectedEof { span: Span },
    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax { message: String, span: Span },
}

impl ParseError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
            ParseError::InvalidSyntax { span, .. } => *span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parser for constraint source text.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Names introduced by `typedef`, needed to tell `T x;` from `x;`.
    typedefs: HashSet<String>,
}

impl Parser {
    /// Create a new parser from source text.
    pub fn new(source: &str) -> Self {
        let tokens: Vec<_> = Lexer::new(source)
            .tokenize()
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .collect();
        Self {
            tokens,
            pos: 0,
            typedefs: HashSet::new(),
        }
    }

    /// Parse a complete translation unit.
    pub fn parse_translation_unit(&mut self) -> ParseResult<TranslationUnit> {
        let start = self.current_span();
        let mut items = Vec::new();
        while !self.is_at_end() {
            if self.match_token(TokenKind::Semicolon) {
                continue;
            }
            items.push(self.parse_external_decl()?);
        }
        let span = start.merge(self.prev_span());
        Ok(TranslationUnit { items, span })
    }

    /// Parse a single standalone expression, requiring the whole input.
    pub fn parse_standalone_expr(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_expr()?;
        if !self.is_at_end() {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    fn parse_external_decl(&mut self) -> ParseResult<ExternalDecl> {
        let start = self.current_span();
        let specifiers = self.parse_decl_specifiers()?;

        if self.match_token(TokenKind::Semicolon) {
            let span = start.merge(self.prev_span());
            return Ok(ExternalDecl::Declaration(Declaration {
                specifiers,
                declarators: Vec::new(),
                span,
            }));
        }

        let first = self.parse_declarator()?;
        if first.is_function() && self.check(TokenKind::LBrace) {
            let body = self.parse_compound()?;
            let span = start.merge(self.prev_span());
            return Ok(ExternalDecl::Function(FunctionDef {
                specifiers,
                name: first.name.clone(),
                declarator: first,
                body,
                span,
            }));
        }

        self.finish_declaration(specifiers, first, start)
            .map(ExternalDecl::Declaration)
    }

    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        let start = self.current_span();
        let specifiers = self.parse_decl_specifiers()?;
        if self.match_token(TokenKind::Semicolon) {
            let span = start.merge(self.prev_span());
            return Ok(Declaration {
                specifiers,
                declarators: Vec::new(),
                span,
            });
        }
        let first = self.parse_declarator()?;
        self.finish_declaration(specifiers, first, start)
    }

    /// Parse the remaining init-declarators after `first` and the closing `;`.
    fn finish_declaration(
        &mut self,
        specifiers: DeclSpecifiers,
        first: Declarator,
        start: Span,
    ) -> ParseResult<Declaration> {
        let mut declarators = vec![self.parse_init_declarator_rest(first)?];
        while self.match_token(TokenKind::Comma) {
            let declarator = self.parse_declarator()?;
            declarators.push(self.parse_init_declarator_rest(declarator)?);
        }
        self.expect(TokenKind::Semicolon)?;

        if specifiers.is_typedef() {
            for d in &declarators {
                self.typedefs.insert(d.declarator.name.name.clone());
            }
        }

        let span = start.merge(self.prev_span());
        Ok(Declaration {
            specifiers,
            declarators,
            span,
        })
    }

    fn parse_init_declarator_rest(&mut self, declarator: Declarator) -> ParseResult<InitDeclarator> {
        let initializer = if self.match_token(TokenKind::Assign) {
            Some(self.parse_initializer()?)
        } else {
            None
        };
        Ok(InitDeclarator {
            declarator,
            initializer,
        })
    }

    fn parse_initializer(&mut self) -> ParseResult<Initializer> {
        if !self.check(TokenKind::LBrace) {
            return self.parse_assignment_expr().map(Initializer::Expr);
        }
        let start = self.current_span();
        self.advance();
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) {
            items.push(self.parse_initializer()?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Initializer::List(items, start.merge(self.prev_span())))
    }

    /// Does the current token begin a declaration?
    fn at_declaration_start(&self) -> bool {
        let kind = self.peek_kind();
        kind.starts_specifier() || self.is_typedef_name(&kind)
    }

    fn is_typedef_name(&self, kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Ident(name) if self.typedefs.contains(name))
    }

    fn parse_decl_specifiers(&mut self) -> ParseResult<DeclSpecifiers> {
        let start = self.current_span();
        let mut specs = DeclSpecifiers {
            storage: None,
            is_const: false,
            is_volatile: false,
            keywords: Vec::new(),
            named: None,
            span: start,
        };
        let mut consumed = false;

        loop {
            let kind = self.peek_kind();
            let storage = match kind {
                TokenKind::Typedef => Some(StorageClass::Typedef),
                TokenKind::Extern => Some(StorageClass::Extern),
                TokenKind::Static => Some(StorageClass::Static),
                TokenKind::Auto => Some(StorageClass::Auto),
                TokenKind::Register => Some(StorageClass::Register),
                _ => None,
            };
            if let Some(storage) = storage {
                if specs.storage.is_some() {
                    return Err(self.invalid("multiple storage classes in one declaration"));
                }
                specs.storage = Some(storage);
                self.advance();
                consumed = true;
                continue;
            }

            let keyword = match kind {
                TokenKind::Void => Some(TypeKeyword::Void),
                TokenKind::Char => Some(TypeKeyword::Char),
                TokenKind::Short => Some(TypeKeyword::Short),
                TokenKind::Int => Some(TypeKeyword::Int),
                TokenKind::Long => Some(TypeKeyword::Long),
                TokenKind::KwFloat => Some(TypeKeyword::Float),
                TokenKind::Double => Some(TypeKeyword::Double),
                TokenKind::Signed => Some(TypeKeyword::Signed),
                TokenKind::Unsigned => Some(TypeKeyword::Unsigned),
                _ => None,
            };
            if let Some(keyword) = keyword {
                specs.keywords.push(keyword);
                self.advance();
                consumed = true;
                continue;
            }

            match kind {
                TokenKind::Const => {
                    specs.is_const = true;
                    self.advance();
                }
                TokenKind::Volatile => {
                    specs.is_volatile = true;
                    self.advance();
                }
                TokenKind::Struct | TokenKind::Union if specs.named.is_none() => {
                    specs.named = Some(TypeName::Struct(self.parse_struct_specifier()?));
                }
                TokenKind::Enum if specs.named.is_none() => {
                    specs.named = Some(TypeName::Enum(self.parse_enum_specifier()?));
                }
                TokenKind::Ident(ref name)
                    if specs.named.is_none()
                        && specs.keywords.is_empty()
                        && self.typedefs.contains(name) =>
                {
                    let span = self.current_span();
                    specs.named = Some(TypeName::Typedef(Ident::new(name.clone(), span)));
                    self.advance();
                }
                _ => break,
            }
            consumed = true;
        }

        if !consumed {
            return Err(self.unexpected("declaration specifiers"));
        }
        specs.span = start.merge(self.prev_span());
        Ok(specs)
    }

    fn parse_struct_specifier(&mut self) -> ParseResult<StructSpecifier> {
        let start = self.current_span();
        let kind = if self.match_token(TokenKind::Union) {
            RecordKind::Union
        } else {
            self.expect(TokenKind::Struct)?;
            RecordKind::Struct
        };

        let tag = match self.peek_kind() {
            TokenKind::Ident(_) => Some(self.parse_ident()?),
            _ => None,
        };

        let fields = if self.match_token(TokenKind::LBrace) {
            let mut fields = Vec::new();
            while !self.check(TokenKind::RBrace) {
                if self.is_at_end() {
                    return Err(ParseError::UnexpectedEof {
                        span: self.current_span(),
                    });
                }
                fields.push(self.parse_field_decl()?);
            }
            self.expect(TokenKind::RBrace)?;
            Some(fields)
        } else {
            None
        };

        if tag.is_none() && fields.is_none() {
            return Err(self.unexpected("struct tag or body"));
        }

        Ok(StructSpecifier {
            kind,
            tag,
            fields,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_field_decl(&mut self) -> ParseResult<FieldDecl> {
        let start = self.current_span();
        let specifiers = self.parse_decl_specifiers()?;
        let mut declarators = Vec::new();
        if !self.check(TokenKind::Semicolon) {
            loop {
                let declarator = self.parse_declarator()?;
                let bit_width = if self.match_token(TokenKind::Colon) {
                    Some(self.parse_conditional_expr()?)
                } else {
                    None
                };
                declarators.push(FieldDeclarator {
                    declarator,
                    bit_width,
                });
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(FieldDecl {
            specifiers,
            declarators,
            span: start.merge(self.prev_span()),
        })
    }

    /// `enum Tag { ... }` is parsed only far enough to be rejected later.
    fn parse_enum_specifier(&mut self) -> ParseResult<Span> {
        let start = self.current_span();
        self.expect(TokenKind::Enum)?;
        if let TokenKind::Ident(_) = self.peek_kind() {
            self.advance();
        }
        if self.check(TokenKind::LBrace) {
            self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace)?;
        }
        Ok(start.merge(self.prev_span()))
    }

    fn parse_declarator(&mut self) -> ParseResult<Declarator> {
        let start = self.current_span();
        let mut pointer_depth = 0;
        while self.match_token(TokenKind::Star) {
            pointer_depth += 1;
            while matches!(self.peek_kind(), TokenKind::Const | TokenKind::Volatile) {
                self.advance();
            }
        }

        if self.check(TokenKind::LParen) {
            return Err(self.invalid("parenthesized declarators are not supported"));
        }
        let name = self.parse_ident()?;

        let mut suffixes = Vec::new();
        loop {
            if self.match_token(TokenKind::LBracket) {
                let size = if self.check(TokenKind::RBracket) {
                    None
                } else {
                    Some(self.parse_conditional_expr()?)
                };
                self.expect(TokenKind::RBracket)?;
                suffixes.push(DeclaratorSuffix::Array(size));
            } else if self.check(TokenKind::LParen) {
                suffixes.push(DeclaratorSuffix::Function(self.parse_params()?));
            } else {
                break;
            }
        }

        let mut extensions = Vec::new();
        while matches!(self.peek_kind(), TokenKind::Attribute | TokenKind::Asm) {
            let ext_start = self.current_span();
            self.advance();
            self.skip_balanced(TokenKind::LParen, TokenKind::RParen)?;
            extensions.push(ext_start.merge(self.prev_span()));
        }

        Ok(Declarator {
            pointer_depth,
            name,
            suffixes,
            extensions,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<ParamDecl>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.match_token(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let start = self.current_span();
            if self.match_token(TokenKind::Ellipsis) {
                params.push(ParamDecl {
                    specifiers: None,
                    name: None,
                    span: start,
                });
            } else {
                let specifiers = self.parse_decl_specifiers()?;
                while self.match_token(TokenKind::Star) {}
                let name = match self.peek_kind() {
                    TokenKind::Ident(_) => Some(self.parse_ident()?),
                    _ => None,
                };
                while self.check(TokenKind::LBracket) {
                    self.skip_balanced(TokenKind::LBracket, TokenKind::RBracket)?;
                }
                params.push(ParamDecl {
                    specifiers: Some(specifiers),
                    name,
                    span: start.merge(self.prev_span()),
                });
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_compound(&mut self) -> ParseResult<CompoundStmt> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEof {
                    span: self.current_span(),
                });
            }
            items.push(self.parse_block_item()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(CompoundStmt {
            items,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_block_item(&mut self) -> ParseResult<BlockItem> {
        if self.at_declaration_start() {
            return self.parse_declaration().map(BlockItem::Declaration);
        }
        let stmt = match self.peek_kind() {
            TokenKind::LBrace => Stmt::Compound(self.parse_compound()?),
            TokenKind::Semicolon => {
                let span = self.current_span();
                self.advance();
                Stmt::Empty(span)
            }
            TokenKind::Return
            | TokenKind::If
            | TokenKind::Else
            | TokenKind::While
            | TokenKind::For
            | TokenKind::Do => {
                return Err(self.invalid(&format!(
                    "`{}` statements are not supported in constraint bodies",
                    self.peek_kind()
                )));
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Stmt::Expr(expr)
            }
        };
        Ok(BlockItem::Statement(stmt))
    }

    // === Expressions ===

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let first = self.parse_assignment_expr()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(TokenKind::Comma) {
            items.push(self.parse_assignment_expr()?);
        }
        let span = items[0].span.merge(items[items.len() - 1].span);
        Ok(Expr::new(ExprKind::Comma(items), span))
    }

    fn parse_assignment_expr(&mut self) -> ParseResult<Expr> {
        let target = self.parse_conditional_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => "=".to_string(),
            TokenKind::CompoundAssign(op) => op.to_string(),
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment_expr()?;
        let span = target.span.merge(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_conditional_expr(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_chain(ChainLevel::LogicalOr)?;
        if !self.match_token(TokenKind::Question) {
            return Ok(cond);
        }
        let then_branch = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let else_branch = self.parse_conditional_expr()?;
        let span = cond.span.merge(else_branch.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    /// Parse one precedence level, collecting all same-level operators into
    /// a single chain node. A lone operand passes through unchanged.
    fn parse_chain(&mut self, level: ChainLevel) -> ParseResult<Expr> {
        let first = self.parse_chain_operand(level)?;
        let mut operands = vec![first];
        let mut ops = Vec::new();
        while let Some(op) = self.peek_binop().filter(|op| op.level() == level) {
            self.advance();
            ops.push(op);
            operands.push(self.parse_chain_operand(level)?);
        }
        if ops.is_empty() {
            return Ok(operands.remove(0));
        }
        let span = operands[0].span.merge(operands[operands.len() - 1].span);
        Ok(Expr::new(
            ExprKind::Chain {
                level,
                operands,
                ops,
            },
            span,
        ))
    }

    fn parse_chain_operand(&mut self, level: ChainLevel) -> ParseResult<Expr> {
        let inner = match level {
            ChainLevel::Multiplicative => return self.parse_cast_expr(),
            ChainLevel::Additive => ChainLevel::Multiplicative,
            ChainLevel::Shift => ChainLevel::Additive,
            ChainLevel::Relational => ChainLevel::Shift,
            ChainLevel::Equality => ChainLevel::Relational,
            ChainLevel::BitAnd => ChainLevel::Equality,
            ChainLevel::BitXor => ChainLevel::BitAnd,
            ChainLevel::BitOr => ChainLevel::BitXor,
            ChainLevel::LogicalAnd => ChainLevel::BitOr,
            ChainLevel::LogicalOr => ChainLevel::LogicalAnd,
        };
        self.parse_chain(inner)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        Some(match self.peek_kind() {
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Amp => BinOp::BitAnd,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::Pipe => BinOp::BitOr,
            TokenKind::AmpAmp => BinOp::And,
            TokenKind::PipePipe => BinOp::Or,
            _ => return None,
        })
    }

    fn parse_cast_expr(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::LParen) && self.type_name_follows(1) {
            let start = self.current_span();
            self.advance();
            self.parse_type_name()?;
            self.expect(TokenKind::RParen)?;
            let operand = self.parse_cast_expr()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Cast {
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_unary_expr()
    }

    fn type_name_follows(&self, offset: usize) -> bool {
        let kind = self.peek_ahead_kind(offset);
        kind.starts_specifier() || self.is_typedef_name(&kind)
    }

    /// `specifiers *...` inside a cast or `sizeof`.
    fn parse_type_name(&mut self) -> ParseResult<()> {
        self.parse_decl_specifiers()?;
        while self.match_token(TokenKind::Star) {}
        while self.check(TokenKind::LBracket) {
            self.skip_balanced(TokenKind::LBracket, TokenKind::RBracket)?;
        }
        Ok(())
    }

    fn parse_unary_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Amp => Some(UnaryOp::AddressOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) {
                self.parse_unary_expr()?
            } else {
                self.parse_cast_expr()?
            };
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        if self.match_token(TokenKind::Sizeof) {
            if self.check(TokenKind::LParen) && self.type_name_follows(1) {
                self.advance();
                self.parse_type_name()?;
                self.expect(TokenKind::RParen)?;
            } else {
                self.parse_unary_expr()?;
            }
            return Ok(Expr::new(
                ExprKind::Sizeof(start.merge(self.prev_span())),
                start.merge(self.prev_span()),
            ));
        }

        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let is_arrow = self.check(TokenKind::Arrow);
                    self.advance();
                    let field = self.parse_ident()?;
                    let span = expr.span.merge(field.span);
                    let base = Box::new(expr);
                    expr = if is_arrow {
                        Expr::new(ExprKind::Arrow { base, field }, span)
                    } else {
                        Expr::new(ExprKind::Field { base, field }, span)
                    };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let increment = self.check(TokenKind::PlusPlus);
                    self.advance();
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr::new(
                        ExprKind::PostIncDec {
                            operand: Box::new(expr),
                            increment,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.match_token(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment_expr()?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(n), span))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(x), span))
            }
            TokenKind::StringLit(mut s) => {
                self.advance();
                while let TokenKind::StringLit(next) = self.peek_kind() {
                    s.push_str(&next);
                    self.advance();
                }
                Ok(Expr::new(ExprKind::String(s), span.merge(self.prev_span())))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Ident(name), span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::Paren(Box::new(inner)),
                    span.merge(self.prev_span()),
                ))
            }
            TokenKind::Error(message) => Err(ParseError::InvalidSyntax { message, span }),
            TokenKind::Eof => Err(ParseError::UnexpectedEof { span }),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_ident(&mut self) -> ParseResult<Ident> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident::new(name, span))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof { span }),
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Skip a balanced `open ... close` group, starting at `open`.
    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) -> ParseResult<()> {
        self.expect(open.clone())?;
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedEof {
                    span: self.current_span(),
                });
            }
            if self.check(open.clone()) {
                depth += 1;
            } else if self.check(close.clone()) {
                depth -= 1;
            }
            self.advance();
        }
        Ok(())
    }

    // === Token helpers ===

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    /// Peek ahead by `offset` tokens (0 = current token).
    fn peek_ahead_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::dummy()
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(&kind)
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<()> {
        if self.check(kind.clone()) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::UnexpectedEof {
                span: self.current_span(),
            })
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.peek_kind().to_string(),
                span: self.current_span(),
            })
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        if let TokenKind::Error(message) = self.peek_kind() {
            return ParseError::InvalidSyntax {
                message,
                span: self.current_span(),
            };
        }
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek_kind().to_string(),
            span: self.current_span(),
        }
    }

    fn invalid(&self, message: &str) -> ParseError {
        ParseError::InvalidSyntax {
            message: message.to_string(),
            span: self.current_span(),
        }
    }
}

/// Parse source text into a translation unit.
pub fn parse(source: &str) -> ParseResult<TranslationUnit> {
    Parser::new(source).parse_translation_unit()
}

/// Parse a standalone expression such as `(a > 1) && (b < 2)`.
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    Parser::new(source).parse_standalone_expr()
}
