//! AST to constraint IR compiler.
//!
//! One pass over the translation unit: top-level declarations build the
//! symbol table and struct blueprints, then the `_CONSTRAINT` body is
//! compiled statement by statement into asserted terms plus the leaf,
//! atom, disjunction and Gaussian side tables.

use crate::constraints::{
    Assertion, AtomTable, CompiledConstraints, DisjunctionGroups, GaussianConstraint, Leaf,
};
use crate::symbols::SymbolTable;
use crate::term::{numeric_join, ArithOp, CmpOp, Primitive, Rational, Sort, Term};
use crate::types::{IntWidth, MemberDescriptor, Qualifier, StructBlueprint, SymbolEntry, ValueType};
use casegen_syntax::{
    BinOp, BlockItem, ChainLevel, CompoundStmt, DeclSpecifiers, Declaration, Declarator,
    DeclaratorSuffix, Expr, ExprKind, ExternalDecl, FunctionDef, RecordKind, Span, Stmt,
    StructSpecifier, TranslationUnit, TypeKeyword, TypeName, UnaryOp, CONSTRAINT_FUNCTION,
    GAUSSIAN_PRIMITIVE, LENGTH_PRIMITIVE,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Fixed precision for decimal literals: `1.5` becomes `1500/1000`.
const LITERAL_SCALE: i64 = 1000;

/// Compilation error.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unsupported construct at {span}: {construct} in `{fragment}`")]
    Unsupported {
        construct: String,
        fragment: String,
        span: Span,
    },

    #[error("unresolved symbol `{name}` at {span}")]
    UnresolvedSymbol { name: String, span: Span },

    #[error("unknown struct `{name}` at {span}")]
    UnknownStruct { name: String, span: Span },

    #[error("struct `{record}` has no field `{field}` (at {span})")]
    UnknownField {
        field: String,
        record: String,
        span: Span,
    },

    #[error("array `{name}` at {span} needs positive integer constant dimensions")]
    InvalidDimension { name: String, span: Span },

    #[error("`{name}` declared twice (at {span})")]
    DuplicateSymbol { name: String, span: Span },

    #[error("expected a boolean expression at {span}: `{fragment}`")]
    ExpectedBool { fragment: String, span: Span },

    #[error("expected a numeric expression at {span}: `{fragment}`")]
    ExpectedNumeric { fragment: String, span: Span },

    #[error("expected an integer expression at {span}: `{fragment}`")]
    ExpectedInteger { fragment: String, span: Span },

    #[error("`{fragment}` at {span} is not an array or sequence")]
    NotIndexable { fragment: String, span: Span },

    #[error("`{fragment}` at {span} is not a struct")]
    NotAStruct { fragment: String, span: Span },

    #[error("`{fragment}` at {span} is not a sequence")]
    NotASequence { fragment: String, span: Span },

    #[error("`{name}` takes {expected} argument(s), got {found} (at {span})")]
    PrimitiveArity {
        name: &'static str,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("invalid GAUSSIAN call at {span}: {message}")]
    InvalidGaussian { message: String, span: Span },

    #[error("no `{}` function found", CONSTRAINT_FUNCTION)]
    MissingConstraintFunction,
}

impl CompileError {
    /// Source span of the offending construct.
    pub fn span(&self) -> Span {
        match self {
            CompileError::Unsupported { span, .. }
            | CompileError::UnresolvedSymbol { span, .. }
            | CompileError::UnknownStruct { span, .. }
            | CompileError::UnknownField { span, .. }
            | CompileError::InvalidDimension { span, .. }
            | CompileError::DuplicateSymbol { span, .. }
            | CompileError::ExpectedBool { span, .. }
            | CompileError::ExpectedNumeric { span, .. }
            | CompileError::ExpectedInteger { span, .. }
            | CompileError::NotIndexable { span, .. }
            | CompileError::NotAStruct { span, .. }
            | CompileError::NotASequence { span, .. }
            | CompileError::PrimitiveArity { span, .. }
            | CompileError::InvalidGaussian { span, .. } => *span,
            CompileError::MissingConstraintFunction => Span::dummy(),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Source dialect options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub int_width: IntWidth,
}

/// Compile a parsed translation unit with default options.
pub fn compile(unit: &TranslationUnit, source: &str) -> CompileResult<CompiledConstraints> {
    compile_with_options(unit, source, CompileOptions::default())
}

/// Compile a parsed translation unit.
pub fn compile_with_options(
    unit: &TranslationUnit,
    source: &str,
    options: CompileOptions,
) -> CompileResult<CompiledConstraints> {
    let mut compiler = Compiler::new(source, options);
    compiler.compile_unit(unit)?;
    Ok(compiler.finish())
}

/// Compiler context threaded through every recursive call.
struct Compiler<'a> {
    source: &'a str,
    options: CompileOptions,
    symbols: SymbolTable,
    blueprints: Vec<StructBlueprint>,
    /// Struct tag to canonical blueprint name.
    struct_tags: HashMap<String, String>,
    /// Typedef name to aliased type.
    typedefs: HashMap<String, ValueType>,
    anonymous_structs: usize,
    assertions: Vec<Assertion>,
    predicates: Vec<String>,
    leaves: Vec<Leaf>,
    atoms: AtomTable,
    disjunctions: DisjunctionGroups,
    gaussians: Vec<GaussianConstraint>,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a str, options: CompileOptions) -> Self {
        Self {
            source,
            options,
            symbols: SymbolTable::new(),
            blueprints: Vec::new(),
            struct_tags: HashMap::new(),
            typedefs: HashMap::new(),
            anonymous_structs: 0,
            assertions: Vec::new(),
            predicates: Vec::new(),
            leaves: Vec::new(),
            atoms: AtomTable::default(),
            disjunctions: DisjunctionGroups::default(),
            gaussians: Vec::new(),
        }
    }

    fn finish(self) -> CompiledConstraints {
        CompiledConstraints {
            globals: self.symbols.globals().cloned().collect(),
            blueprints: self.blueprints,
            assertions: self.assertions,
            predicates: self.predicates,
            leaves: self.leaves,
            atoms: self.atoms,
            disjunctions: self.disjunctions,
            gaussians: self.gaussians,
        }
    }

    fn compile_unit(&mut self, unit: &TranslationUnit) -> CompileResult<()> {
        let mut found = false;
        for item in &unit.items {
            match item {
                ExternalDecl::Declaration(decl) => self.declare(decl)?,
                ExternalDecl::Function(func) if func.name.name == CONSTRAINT_FUNCTION => {
                    self.compile_constraint_function(func)?;
                    found = true;
                }
                ExternalDecl::Function(func) => {
                    debug!(name = %func.name.name, "skipping non-constraint function");
                }
            }
        }
        if !found {
            return Err(CompileError::MissingConstraintFunction);
        }
        Ok(())
    }

    fn fragment(&self, span: Span) -> String {
        span.slice(self.source).trim().to_string()
    }

    fn unsupported(&self, construct: &str, span: Span) -> CompileError {
        CompileError::Unsupported {
            construct: construct.to_string(),
            fragment: self.fragment(span),
            span,
        }
    }

    // === Declarations ===

    fn declare(&mut self, decl: &Declaration) -> CompileResult<()> {
        if self.symbols.depth() > 1 {
            if let Some(TypeName::Struct(spec)) = &decl.specifiers.named {
                if spec.fields.is_some() {
                    return Err(self.unsupported("struct definition below top level", spec.span));
                }
            }
            debug!(at = %decl.span, "skipping nested declaration");
            return Ok(());
        }

        let alias = if decl.specifiers.is_typedef() {
            decl.declarators
                .first()
                .map(|d| d.declarator.name.name.as_str())
        } else {
            None
        };
        let ty = self.resolve_specifiers(&decl.specifiers, alias)?;

        if decl.specifiers.is_typedef() {
            for init in &decl.declarators {
                let d = &init.declarator;
                if d.pointer_depth > 0 || !d.suffixes.is_empty() || init.initializer.is_some() {
                    return Err(self.unsupported("pointer, array or function typedefs", d.span));
                }
                let Some(ty) = ty.clone() else {
                    return Err(self.unsupported("void typedefs", d.span));
                };
                self.typedefs.insert(d.name.name.clone(), ty);
            }
            return Ok(());
        }

        for init in &decl.declarators {
            let d = &init.declarator;
            if d.is_function() {
                debug!(name = %d.name.name, "skipping function declaration");
                continue;
            }
            if init.initializer.is_some() {
                return Err(self.unsupported("initializers on declared variables", d.span));
            }
            let Some(ty) = ty.clone() else {
                return Err(self.unsupported("void variables", d.span));
            };
            let (qualifier, dims) = self.shape(d, &ty)?;
            let entry = SymbolEntry {
                name: d.name.name.clone(),
                qualifier,
                ty,
                dims,
                span: d.span,
            };
            debug!(symbol = %entry, "declared");
            if let Err(rejected) = self.symbols.declare(entry) {
                return Err(CompileError::DuplicateSymbol {
                    name: rejected.name,
                    span: d.span,
                });
            }
        }
        Ok(())
    }

    /// Qualifier and dimensions of a variable or member declarator.
    fn shape(&self, d: &Declarator, ty: &ValueType) -> CompileResult<(Qualifier, Vec<u64>)> {
        if !d.extensions.is_empty() {
            return Err(self.unsupported("GCC declarator extensions", d.span));
        }
        if d.pointer_depth > 1 {
            return Err(self.unsupported("multi-level pointers", d.span));
        }
        if d.pointer_depth == 1 {
            if ty.struct_name().is_some() {
                return Err(self.unsupported("pointers to structs", d.span));
            }
            if !d.suffixes.is_empty() {
                return Err(self.unsupported("arrays of pointers", d.span));
            }
            return Ok((Qualifier::Pointer, Vec::new()));
        }
        if d.suffixes.is_empty() {
            return Ok((Qualifier::Primary, Vec::new()));
        }

        let mut dims = Vec::with_capacity(d.suffixes.len());
        for suffix in &d.suffixes {
            let DeclaratorSuffix::Array(size) = suffix else {
                return Err(self.unsupported("function-returning declarators", d.span));
            };
            let dim = size.as_ref().and_then(constant_dimension);
            match dim {
                Some(n) => dims.push(n),
                None => {
                    return Err(CompileError::InvalidDimension {
                        name: d.name.name.clone(),
                        span: d.span,
                    })
                }
            }
        }
        Ok((Qualifier::Array, dims))
    }

    /// Resolve the base type. `None` means `void`.
    fn resolve_specifiers(
        &mut self,
        specs: &DeclSpecifiers,
        alias: Option<&str>,
    ) -> CompileResult<Option<ValueType>> {
        match &specs.named {
            Some(TypeName::Struct(spec)) => {
                let name = self.resolve_struct(spec, alias)?;
                Ok(Some(ValueType::Struct(name)))
            }
            Some(TypeName::Enum(span)) => Err(self.unsupported("enum types", *span)),
            Some(TypeName::Typedef(id)) => match self.typedefs.get(&id.name) {
                Some(ty) => Ok(Some(ty.clone())),
                None => Err(CompileError::UnresolvedSymbol {
                    name: id.name.clone(),
                    span: id.span,
                }),
            },
            None => self.scalar_type(specs),
        }
    }

    fn scalar_type(&self, specs: &DeclSpecifiers) -> CompileResult<Option<ValueType>> {
        if specs.keywords.is_empty() {
            return Err(self.unsupported("declarations without a type", specs.span));
        }
        if specs.keywords.iter().all(|k| *k == TypeKeyword::Void) {
            return Ok(None);
        }
        let ty = if specs.has(TypeKeyword::Unsigned) {
            ValueType::UInt64
        } else if specs.has(TypeKeyword::Float) || specs.has(TypeKeyword::Double) {
            ValueType::Float64
        } else if specs.has(TypeKeyword::Long) {
            ValueType::Int64
        } else {
            match self.options.int_width {
                IntWidth::W32 => ValueType::Int32,
                IntWidth::W64 => ValueType::Int64,
            }
        };
        Ok(Some(ty))
    }

    /// Resolve a struct specifier to its canonical blueprint name, building
    /// the blueprint when the specifier carries a body.
    fn resolve_struct(
        &mut self,
        spec: &StructSpecifier,
        alias: Option<&str>,
    ) -> CompileResult<String> {
        if spec.kind == RecordKind::Union {
            return Err(self.unsupported("union types", spec.span));
        }

        let Some(fields) = &spec.fields else {
            let Some(tag) = &spec.tag else {
                return Err(self.unsupported("anonymous struct reference", spec.span));
            };
            // `struct Alias` also resolves a typedef'd anonymous struct.
            let alias_match = self
                .blueprints
                .iter()
                .any(|b| b.name == tag.name)
                .then(|| tag.name.clone());
            return self
                .struct_tags
                .get(&tag.name)
                .cloned()
                .or(alias_match)
                .ok_or_else(|| CompileError::UnknownStruct {
                    name: tag.name.clone(),
                    span: tag.span,
                });
        };

        let name = match (&spec.tag, alias) {
            (Some(tag), _) => tag.name.clone(),
            (None, Some(alias)) => alias.to_string(),
            (None, None) => {
                self.anonymous_structs += 1;
                format!("__anon{}", self.anonymous_structs)
            }
        };
        if self.blueprints.iter().any(|b| b.name == name) {
            return Err(CompileError::DuplicateSymbol {
                name,
                span: spec.span,
            });
        }

        let mut members: Vec<MemberDescriptor> = Vec::new();
        for field in fields {
            let Some(ty) = self.resolve_specifiers(&field.specifiers, None)? else {
                return Err(self.unsupported("void struct members", field.span));
            };
            if ty.struct_name().is_some() {
                return Err(self.unsupported("struct-typed members", field.span));
            }
            for fd in &field.declarators {
                if fd.bit_width.is_some() {
                    return Err(self.unsupported("bit-fields", fd.declarator.span));
                }
                let (qualifier, dims) = self.shape(&fd.declarator, &ty)?;
                let member_name = fd.declarator.name.name.clone();
                if members.iter().any(|m| m.name == member_name) {
                    return Err(CompileError::DuplicateSymbol {
                        name: member_name,
                        span: fd.declarator.span,
                    });
                }
                members.push(MemberDescriptor {
                    name: member_name,
                    qualifier,
                    ty: ty.clone(),
                    dims,
                });
            }
        }

        debug!(name = %name, members = members.len(), "struct blueprint");
        if let Some(tag) = &spec.tag {
            self.struct_tags.insert(tag.name.clone(), name.clone());
        }
        self.blueprints.push(StructBlueprint {
            name: name.clone(),
            members,
            span: spec.span,
        });
        Ok(name)
    }

    // === Constraint body ===

    fn compile_constraint_function(&mut self, func: &FunctionDef) -> CompileResult<()> {
        self.symbols.push_scope();
        let result = self.compile_block(&func.body);
        self.symbols.pop_scope();
        result
    }

    fn compile_block(&mut self, block: &CompoundStmt) -> CompileResult<()> {
        for item in &block.items {
            match item {
                BlockItem::Declaration(decl) => self.declare(decl)?,
                BlockItem::Statement(Stmt::Expr(expr)) => self.compile_statement(expr)?,
                BlockItem::Statement(Stmt::Empty(_)) => {}
                BlockItem::Statement(Stmt::Compound(inner)) => {
                    self.symbols.push_scope();
                    let result = self.compile_block(inner);
                    self.symbols.pop_scope();
                    result?;
                }
            }
        }
        Ok(())
    }

    /// Compile one constraint statement and assert it.
    fn compile_statement(&mut self, expr: &Expr) -> CompileResult<()> {
        let term = self.compile_expr(expr)?;
        let source = self.fragment(expr.span);
        self.predicates.push(source.clone());

        if term == Term::GaussianSentinel {
            return Ok(());
        }
        if term.sort() != Sort::Bool {
            return Err(CompileError::ExpectedBool {
                fragment: source,
                span: expr.span,
            });
        }
        debug!(constraint = %term, "assert");
        self.assertions.push(Assertion {
            term,
            source,
            span: expr.span,
        });
        Ok(())
    }

    // === Expressions ===

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<Term> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(n) => Ok(Term::Int(*n)),
            ExprKind::Float(x) => Rational::approximate(*x, LITERAL_SCALE)
                .filter(|r| i64::try_from(r.numer()).is_ok() && i64::try_from(r.denom()).is_ok())
                .map(Term::Real)
                .ok_or_else(|| self.unsupported("out-of-range float literal", span)),
            ExprKind::String(_) => Err(self.unsupported("string literals", span)),
            ExprKind::Ident(name) => self.compile_ident(name, span),
            ExprKind::Paren(inner) => self.compile_expr(inner),

            ExprKind::Index { base, index } => {
                let base_term = self.compile_expr(base)?;
                let index_term = self.compile_expr(index)?;
                if index_term.sort() != Sort::Int {
                    return Err(CompileError::ExpectedInteger {
                        fragment: self.fragment(index.span),
                        span: index.span,
                    });
                }
                match base_term.sort() {
                    Sort::Array(_) => Ok(Term::Select {
                        array: Box::new(base_term),
                        index: Box::new(index_term),
                    }),
                    Sort::Seq(_) => Ok(Term::Nth {
                        seq: Box::new(base_term),
                        index: Box::new(index_term),
                    }),
                    _ => Err(CompileError::NotIndexable {
                        fragment: self.fragment(base.span),
                        span: base.span,
                    }),
                }
            }
            ExprKind::Call { callee, args } => self.compile_call(callee, args, span),
            ExprKind::Field { base, field } => {
                let base_term = self.compile_expr(base)?;
                let Sort::Struct(record) = base_term.sort() else {
                    return Err(CompileError::NotAStruct {
                        fragment: self.fragment(base.span),
                        span: base.span,
                    });
                };
                let Some(blueprint) = self.blueprints.iter().find(|b| b.name == record) else {
                    return Err(CompileError::UnknownStruct { name: record, span });
                };
                let Some(index) = blueprint.position(&field.name) else {
                    return Err(CompileError::UnknownField {
                        field: field.name.clone(),
                        record,
                        span: field.span,
                    });
                };
                let sort = blueprint.members[index].sort();
                Ok(Term::Field {
                    base: Box::new(base_term),
                    blueprint: record,
                    index,
                    field: field.name.clone(),
                    sort,
                })
            }
            ExprKind::Arrow { .. } => Err(self.unsupported("pointer member access `->`", span)),
            ExprKind::PostIncDec { .. } => Err(self.unsupported("increment/decrement", span)),

            ExprKind::Unary { op, operand } => self.compile_unary(*op, operand, span),
            ExprKind::Sizeof(_) => Err(self.unsupported("sizeof", span)),
            ExprKind::Cast { .. } => Err(self.unsupported("cast expressions", span)),

            ExprKind::Chain {
                level,
                operands,
                ops,
            } => self.compile_chain(*level, operands, ops, span),

            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.compile_expr(cond)?;
                self.expect_bool(&c, cond.span)?;
                let t = self.compile_expr(then_branch)?;
                let e = self.compile_expr(else_branch)?;
                let (ts, es) = (t.sort(), e.sort());
                if ts == Sort::Bool && es == Sort::Bool {
                    Ok(Term::And(vec![
                        Term::implies(c.clone(), t),
                        Term::implies(Term::not(c), e),
                    ]))
                } else if ts.is_numeric() && es.is_numeric() {
                    Ok(Term::Ite {
                        cond: Box::new(c),
                        then_term: Box::new(t),
                        else_term: Box::new(e),
                    })
                } else {
                    Err(CompileError::ExpectedBool {
                        fragment: self.fragment(span),
                        span,
                    })
                }
            }
            ExprKind::Assign { .. } => Err(self.unsupported("assignment", span)),
            ExprKind::Comma(items) => {
                let mut last = Term::Bool(true);
                for item in items {
                    last = self.compile_expr(item)?;
                }
                Ok(last)
            }
        }
    }

    fn compile_ident(&self, name: &str, span: Span) -> CompileResult<Term> {
        if name == LENGTH_PRIMITIVE {
            return Ok(Term::Primitive(Primitive::Length));
        }
        if name == GAUSSIAN_PRIMITIVE {
            return Ok(Term::Primitive(Primitive::Gaussian));
        }
        match self.symbols.lookup(name) {
            Some(entry) => Ok(Term::Var {
                name: entry.name.clone(),
                sort: entry.sort(),
            }),
            None => Err(CompileError::UnresolvedSymbol {
                name: name.to_string(),
                span,
            }),
        }
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> CompileResult<Term> {
        let primitive = match self.compile_expr(callee) {
            Ok(Term::Primitive(p)) => p,
            Ok(_) | Err(CompileError::UnresolvedSymbol { .. }) => {
                return Err(self.unsupported("call to unknown function", callee.span));
            }
            Err(e) => return Err(e),
        };

        match primitive {
            Primitive::Length => {
                let [arg] = args else {
                    return Err(CompileError::PrimitiveArity {
                        name: LENGTH_PRIMITIVE,
                        expected: 1,
                        found: args.len(),
                        span,
                    });
                };
                let seq = self.compile_expr(arg)?;
                if !matches!(seq.sort(), Sort::Seq(_)) {
                    return Err(CompileError::NotASequence {
                        fragment: self.fragment(arg.span),
                        span: arg.span,
                    });
                }
                Ok(Term::Length(Box::new(seq)))
            }
            Primitive::Gaussian => {
                let [target, mean, std_dev] = args else {
                    return Err(CompileError::PrimitiveArity {
                        name: GAUSSIAN_PRIMITIVE,
                        expected: 3,
                        found: args.len(),
                        span,
                    });
                };
                let target_term = self.compile_expr(target)?;
                if !target_term.sort().is_numeric() {
                    return Err(CompileError::ExpectedNumeric {
                        fragment: self.fragment(target.span),
                        span: target.span,
                    });
                }
                let mean = literal_value(mean).ok_or_else(|| CompileError::InvalidGaussian {
                    message: "mean must be a numeric literal".to_string(),
                    span: mean.span,
                })?;
                let sd = literal_value(std_dev)
                    .filter(|sd| sd.is_finite() && *sd > 0.0)
                    .ok_or_else(|| CompileError::InvalidGaussian {
                        message: "standard deviation must be a positive numeric literal"
                            .to_string(),
                        span: std_dev.span,
                    })?;
                self.gaussians.push(GaussianConstraint {
                    target: target_term,
                    mean,
                    std_dev: sd,
                    span,
                });
                Ok(Term::GaussianSentinel)
            }
        }
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> CompileResult<Term> {
        let construct = match op {
            UnaryOp::Plus | UnaryOp::Neg => {
                let inner = self.compile_expr(operand)?;
                self.expect_numeric(&inner, operand.span)?;
                return Ok(match (op, inner) {
                    (UnaryOp::Plus, inner) => inner,
                    (_, Term::Int(n)) if n != i64::MIN => Term::Int(-n),
                    (_, inner) => Term::Neg(Box::new(inner)),
                });
            }
            UnaryOp::Not => {
                let inner = self.compile_expr(operand)?;
                self.expect_bool(&inner, operand.span)?;
                return Ok(Term::not(inner));
            }
            UnaryOp::BitNot => "bitwise not `~`",
            UnaryOp::AddressOf => "address-of `&`",
            UnaryOp::Deref => "dereference `*`",
            UnaryOp::PreInc | UnaryOp::PreDec => "increment/decrement",
        };
        Err(self.unsupported(construct, span))
    }

    fn compile_chain(
        &mut self,
        level: ChainLevel,
        operands: &[Expr],
        ops: &[BinOp],
        span: Span,
    ) -> CompileResult<Term> {
        match level {
            ChainLevel::Multiplicative | ChainLevel::Additive => {
                let mut acc = self.compile_expr(&operands[0])?;
                self.expect_numeric(&acc, operands[0].span)?;
                for (op, rhs_expr) in ops.iter().zip(&operands[1..]) {
                    let rhs = self.compile_expr(rhs_expr)?;
                    self.expect_numeric(&rhs, rhs_expr.span)?;
                    let arith = match op {
                        BinOp::Mul => ArithOp::Mul,
                        BinOp::Div => ArithOp::Div,
                        BinOp::Mod => ArithOp::Mod,
                        BinOp::Add => ArithOp::Add,
                        _ => ArithOp::Sub,
                    };
                    if arith == ArithOp::Mod {
                        warn!(at = %span, "`%` is weakly supported by the solver's arithmetic");
                        if numeric_join(&acc.sort(), &rhs.sort()) != Sort::Int {
                            return Err(CompileError::ExpectedInteger {
                                fragment: self.fragment(span),
                                span,
                            });
                        }
                    }
                    acc = Term::arith(arith, acc, rhs);
                }
                Ok(acc)
            }
            ChainLevel::Shift => Err(self.unsupported("shift operators", span)),
            ChainLevel::BitAnd | ChainLevel::BitXor | ChainLevel::BitOr => {
                Err(self.unsupported("bitwise operators", span))
            }
            ChainLevel::Relational | ChainLevel::Equality => {
                if operands.len() > 2 {
                    return Err(self.unsupported(
                        &format!("chained {} comparison", level.name()),
                        span,
                    ));
                }
                let lhs = self.compile_expr(&operands[0])?;
                self.expect_numeric(&lhs, operands[0].span)?;
                let rhs = self.compile_expr(&operands[1])?;
                self.expect_numeric(&rhs, operands[1].span)?;
                let op = match ops[0] {
                    BinOp::Lt => CmpOp::Lt,
                    BinOp::Le => CmpOp::Le,
                    BinOp::Gt => CmpOp::Gt,
                    BinOp::Ge => CmpOp::Ge,
                    BinOp::Eq => CmpOp::Eq,
                    _ => CmpOp::Ne,
                };
                Ok(self.leaf(op, lhs, rhs, span))
            }
            ChainLevel::LogicalAnd => {
                let mut terms = Vec::with_capacity(operands.len());
                for operand in operands {
                    let t = self.compile_expr(operand)?;
                    self.expect_bool(&t, operand.span)?;
                    terms.push(t);
                }
                Ok(Term::And(terms))
            }
            ChainLevel::LogicalOr => {
                let group = self.disjunctions.fresh();
                let mut terms = Vec::with_capacity(operands.len());
                for operand in operands {
                    let before = self.leaves.len();
                    let t = self.compile_expr(operand)?;
                    self.expect_bool(&t, operand.span)?;
                    if self.leaves.len() > before {
                        self.disjunctions.tag(self.leaves.len() - 1, group);
                    }
                    terms.push(t);
                }
                Ok(Term::Or(terms))
            }
        }
    }

    /// Record a comparison as a leaf formula and register its atoms.
    fn leaf(&mut self, op: CmpOp, lhs: Term, rhs: Term, span: Span) -> Term {
        let id = self.leaves.len();
        register_atoms(&mut self.atoms, &lhs, id);
        register_atoms(&mut self.atoms, &rhs, id);
        let term = Term::cmp(op, lhs, rhs);
        self.leaves.push(Leaf {
            id,
            term: term.clone(),
            span,
        });
        term
    }

    fn expect_bool(&self, term: &Term, span: Span) -> CompileResult<()> {
        if term.sort() == Sort::Bool && *term != Term::GaussianSentinel {
            Ok(())
        } else {
            Err(CompileError::ExpectedBool {
                fragment: self.fragment(span),
                span,
            })
        }
    }

    fn expect_numeric(&self, term: &Term, span: Span) -> CompileResult<()> {
        if term.sort().is_numeric() {
            Ok(())
        } else {
            Err(CompileError::ExpectedNumeric {
                fragment: self.fragment(span),
                span,
            })
        }
    }
}

/// Register every non-numeral operand of a leaf. Arithmetic composites are
/// unfolded; element and length accesses are atoms in their own right.
fn register_atoms(atoms: &mut AtomTable, term: &Term, leaf: usize) {
    match term {
        Term::Int(_) | Term::Real(_) | Term::Bool(_) => {}
        Term::Neg(inner) => register_atoms(atoms, inner, leaf),
        Term::Arith { lhs, rhs, .. } => {
            register_atoms(atoms, lhs, leaf);
            register_atoms(atoms, rhs, leaf);
        }
        _ => atoms.register(term.clone(), leaf),
    }
}

/// A positive integer literal, possibly parenthesized.
fn constant_dimension(expr: &Expr) -> Option<u64> {
    match &expr.kind {
        ExprKind::Int(n) if *n > 0 => Some(*n as u64),
        ExprKind::Paren(inner) => constant_dimension(inner),
        _ => None,
    }
}

/// A numeric literal, possibly negated or parenthesized.
fn literal_value(expr: &Expr) -> Option<f64> {
    match &expr.kind {
        ExprKind::Int(n) => Some(*n as f64),
        ExprKind::Float(x) => Some(*x),
        ExprKind::Paren(inner) => literal_value(inner),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => literal_value(operand).map(|v| -v),
        ExprKind::Unary {
            op: UnaryOp::Plus,
            operand,
        } => literal_value(operand),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegen_syntax::parse;

    fn compile_src(src: &str) -> CompileResult<CompiledConstraints> {
        let unit = parse(src).unwrap();
        compile(&unit, src)
    }

    fn with_body(decls: &str, body: &str) -> String {
        format!("{decls}\nint _CONSTRAINT(void) {{\n{body}\n}}\n")
    }

    fn unsupported(result: CompileResult<CompiledConstraints>) -> String {
        match result {
            Err(CompileError::Unsupported { construct, .. }) => construct,
            other => panic!("expected unsupported construct, got: {other:?}"),
        }
    }

    #[test]
    fn test_compile_scalars() {
        let c = compile_src(&with_body(
            "int a; long b; unsigned c; double d; char e;",
            "a > 1;",
        ))
        .unwrap();
        let types: Vec<_> = c.globals.iter().map(|g| g.ty.clone()).collect();
        assert_eq!(
            types,
            vec![
                ValueType::Int32,
                ValueType::Int64,
                ValueType::UInt64,
                ValueType::Float64,
                ValueType::Int32
            ]
        );
    }

    #[test]
    fn test_int_width_dialect() {
        let src = with_body("int a;", "a > 1;");
        let unit = parse(&src).unwrap();
        let c = compile_with_options(
            &unit,
            &src,
            CompileOptions {
                int_width: IntWidth::W64,
            },
        )
        .unwrap();
        assert_eq!(c.globals[0].ty, ValueType::Int64);
    }

    #[test]
    fn test_struct_tag_and_typedef_share_blueprint() {
        let c = compile_src(&with_body(
            "typedef struct S1 { int a; double c; int *d; int e[4]; } S1T;\nstruct S1 s[2]; S1T t;",
            "s[0].a > t.a;",
        ))
        .unwrap();
        assert_eq!(c.blueprints.len(), 1);
        let bp = &c.blueprints[0];
        assert_eq!(bp.name, "S1");
        let names: Vec<_> = bp.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "d", "e"]);
        assert_eq!(c.globals[0].ty, ValueType::Struct("S1".to_string()));
        assert_eq!(c.globals[1].ty, ValueType::Struct("S1".to_string()));
    }

    #[test]
    fn test_anonymous_typedef_struct_named_by_alias() {
        let c = compile_src(&with_body(
            "typedef struct { int x; int y; } Point;\nPoint p;",
            "p.x < p.y;",
        ))
        .unwrap();
        assert_eq!(c.blueprints[0].name, "Point");
    }

    #[test]
    fn test_field_projection_index() {
        let c = compile_src(&with_body(
            "struct S { int a; double c; } s;",
            "s.c >= 1.5;",
        ))
        .unwrap();
        let Term::Cmp { lhs, rhs, .. } = &c.assertions[0].term else {
            panic!("expected comparison");
        };
        assert!(matches!(**lhs, Term::Field { index: 1, .. }));
        assert_eq!(**rhs, Term::Real(Rational::new(3, 2).unwrap()));
    }

    #[test]
    fn test_leaves_and_atoms() {
        let c = compile_src(&with_body(
            "int a; int b[3]; int *p;",
            "a + b[1] <= 10 && _LENGTH(p) > 2;\na != 4;",
        ))
        .unwrap();
        assert_eq!(c.leaves.len(), 3);
        assert_eq!(c.assertions.len(), 2);
        assert_eq!(c.assertions[0].source, "a + b[1] <= 10 && _LENGTH(p) > 2");
        let atoms: Vec<String> = c.atoms.atoms().iter().map(|t| t.to_string()).collect();
        assert_eq!(atoms, vec!["a", "b[1]", "_LENGTH(p)"]);
        let a = &c.atoms.atoms()[0];
        assert_eq!(c.atoms.leaves_of(a), &[0, 2]);
    }

    #[test]
    fn test_disjunction_groups() {
        let c = compile_src(&with_body("int a; int b;", "(a < 3) || (b > 7);")).unwrap();
        let groups = c.disjunctions.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.values().next(), Some(&vec![0, 1]));
    }

    #[test]
    fn test_gaussian_recorded_not_asserted() {
        let c = compile_src(&with_body(
            "struct S { double c; } s;",
            "GAUSSIAN(s.c, 1.0, -(-2));",
        ))
        .unwrap();
        assert!(c.assertions.is_empty());
        assert_eq!(c.predicates.len(), 1);
        assert_eq!(c.gaussians.len(), 1);
        assert_eq!(c.gaussians[0].mean, 1.0);
        assert_eq!(c.gaussians[0].std_dev, 2.0);
    }

    #[test]
    fn test_gaussian_rejects_bad_parameters() {
        let r = compile_src(&with_body("double x;", "GAUSSIAN(x, 0.0, 0.0);"));
        assert!(matches!(r, Err(CompileError::InvalidGaussian { .. })));
        let r = compile_src(&with_body("double x; double m;", "GAUSSIAN(x, m, 1.0);"));
        assert!(matches!(r, Err(CompileError::InvalidGaussian { .. })));
    }

    #[test]
    fn test_conditional_encoding() {
        let c = compile_src(&with_body("int a; int b;", "a > 0 ? b > 1 : b < -1;")).unwrap();
        assert!(matches!(&c.assertions[0].term, Term::And(parts) if parts.len() == 2));
        let c = compile_src(&with_body("int a; int b;", "(a > 0 ? a : 5) < b;")).unwrap();
        let Term::Cmp { lhs, .. } = &c.assertions[0].term else {
            panic!("expected comparison");
        };
        assert!(matches!(**lhs, Term::Ite { .. }));
    }

    #[test]
    fn test_rejected_constructs() {
        assert_eq!(
            unsupported(compile_src(&with_body("union U { int a; } u;", ""))),
            "union types"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("struct S { int a : 3; } s;", ""))),
            "bit-fields"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int **p;", ""))),
            "multi-level pointers"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("struct S { int a; } *p;", ""))),
            "pointers to structs"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a = 3;", ""))),
            "initializers on declared variables"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a __attribute__((unused));", ""))),
            "GCC declarator extensions"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a;", "a = 3;"))),
            "assignment"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a;", "(a << 1) > 2;"))),
            "shift operators"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a;", "(a & 1) == 0;"))),
            "bitwise operators"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a; int b; int c;", "a < b < c;"))),
            "chained relational comparison"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a;", "foo(a) > 1;"))),
            "call to unknown function"
        );
        assert_eq!(
            unsupported(compile_src(&with_body("int a;", "struct T { int x; } t; a > 0;"))),
            "struct definition below top level"
        );
    }

    #[test]
    fn test_out_of_range_float_literal() {
        match compile_src(&with_body("double x;", "x < 1e19;")) {
            Err(CompileError::Unsupported {
                construct, fragment, ..
            }) => {
                assert_eq!(construct, "out-of-range float literal");
                assert_eq!(fragment, "1e19");
            }
            other => panic!("expected unsupported literal, got: {other:?}"),
        }
        assert!(compile_src(&with_body("double x;", "x < 1e17;")).is_ok());
    }

    #[test]
    fn test_non_constant_dimension() {
        let r = compile_src(&with_body("int n; int a[n];", ""));
        assert!(matches!(r, Err(CompileError::InvalidDimension { .. })));
        let r = compile_src(&with_body("int a[];", ""));
        assert!(matches!(r, Err(CompileError::InvalidDimension { .. })));
    }

    #[test]
    fn test_unresolved_and_unknown_field() {
        let r = compile_src(&with_body("int a;", "zz > 1;"));
        assert!(matches!(r, Err(CompileError::UnresolvedSymbol { ref name, .. }) if name == "zz"));
        let r = compile_src(&with_body("struct S { int a; } s;", "s.q > 1;"));
        assert!(matches!(r, Err(CompileError::UnknownField { .. })));
    }

    #[test]
    fn test_type_errors() {
        let r = compile_src(&with_body("int a;", "a + 1;"));
        assert!(matches!(r, Err(CompileError::ExpectedBool { .. })));
        let r = compile_src(&with_body("int a; int b;", "(a > 1) + b > 0;"));
        assert!(matches!(r, Err(CompileError::ExpectedNumeric { .. })));
        let r = compile_src(&with_body("int a[3];", "_LENGTH(a) > 1;"));
        assert!(matches!(r, Err(CompileError::NotASequence { .. })));
        let r = compile_src(&with_body("double x; int a;", "x % a == 1;"));
        assert!(matches!(r, Err(CompileError::ExpectedInteger { .. })));
    }

    #[test]
    fn test_missing_constraint_function() {
        let r = compile_src("int a;");
        assert!(matches!(r, Err(CompileError::MissingConstraintFunction)));
    }

    #[test]
    fn test_primitive_prototypes_are_skipped() {
        let c = compile_src(&with_body(
            "int _LENGTH(void *p);\nvoid GAUSSIAN(double v, double m, double s);\nint *p;",
            "_LENGTH(p) > 1;",
        ))
        .unwrap();
        assert_eq!(c.globals.len(), 1);
    }

    #[test]
    fn test_nested_declarations_not_globals() {
        let c = compile_src(&with_body("int a;", "int tmp; a > 0;")).unwrap();
        assert_eq!(c.globals.len(), 1);
    }
}
