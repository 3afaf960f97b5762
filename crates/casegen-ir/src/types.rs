//! Declared variable types and record layouts.

use crate::term::Sort;
use casegen_syntax::Span;
use std::fmt;

/// How a variable is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Primary,
    Array,
    Pointer,
}

/// Width used for `char`, `short`, `int` and `signed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntWidth {
    #[default]
    W32,
    W64,
}

/// Base value type of a declared variable or struct member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// A record; the payload names its [`StructBlueprint`].
    Struct(String),
}

impl ValueType {
    /// Solver sort of a single scalar or record value of this type.
    pub fn sort(&self) -> Sort {
        match self {
            ValueType::Int32 | ValueType::Int64 | ValueType::UInt32 | ValueType::UInt64 => {
                Sort::Int
            }
            ValueType::Float32 | ValueType::Float64 => Sort::Real,
            ValueType::Struct(name) => Sort::Struct(name.clone()),
        }
    }

    /// Values of this type must fit in 32 bits when extracted.
    pub fn is_32bit(&self) -> bool {
        matches!(self, ValueType::Int32 | ValueType::UInt32)
    }

    pub fn is_real(&self) -> bool {
        matches!(self, ValueType::Float32 | ValueType::Float64)
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            ValueType::Struct(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int32 => write!(f, "i32"),
            ValueType::Int64 => write!(f, "i64"),
            ValueType::UInt32 => write!(f, "u32"),
            ValueType::UInt64 => write!(f, "u64"),
            ValueType::Float32 => write!(f, "f32"),
            ValueType::Float64 => write!(f, "f64"),
            ValueType::Struct(name) => write!(f, "struct {name}"),
        }
    }
}

/// One declared global variable.
///
/// `dims` is non-empty exactly when `qualifier` is [`Qualifier::Array`].
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    pub qualifier: Qualifier,
    pub ty: ValueType,
    /// Array bounds, outermost first.
    pub dims: Vec<u64>,
    pub span: Span,
}

impl SymbolEntry {
    /// Sort of the whole variable: scalar, nested int-indexed arrays, or a
    /// sequence for pointers.
    pub fn sort(&self) -> Sort {
        let base = self.ty.sort();
        match self.qualifier {
            Qualifier::Primary => base,
            Qualifier::Array => self
                .dims
                .iter()
                .fold(base, |inner, _| Sort::Array(Box::new(inner))),
            Qualifier::Pointer => Sort::Seq(Box::new(base)),
        }
    }
}

impl fmt::Display for SymbolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)?;
        match self.qualifier {
            Qualifier::Primary => Ok(()),
            Qualifier::Pointer => write!(f, "[..]"),
            Qualifier::Array => self.dims.iter().try_for_each(|d| write!(f, "[{d}]")),
        }
    }
}

/// One member of a struct. Members are always scalar-based.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    pub name: String,
    pub qualifier: Qualifier,
    pub ty: ValueType,
    pub dims: Vec<u64>,
}

impl MemberDescriptor {
    /// Member sort. Arrays and pointers inside records are sequences with
    /// no length bound asserted; arrays nest one sequence per dimension.
    pub fn sort(&self) -> Sort {
        let base = self.ty.sort();
        match self.qualifier {
            Qualifier::Primary => base,
            Qualifier::Array => self
                .dims
                .iter()
                .fold(base, |inner, _| Sort::Seq(Box::new(inner))),
            Qualifier::Pointer => Sort::Seq(Box::new(base)),
        }
    }
}

/// A record type. Member order is fixed at creation and matches the
/// solver tuple's projector order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructBlueprint {
    pub name: String,
    pub members: Vec<MemberDescriptor>,
    pub span: Span,
}

impl StructBlueprint {
    /// Position of a member by name.
    pub fn position(&self, field: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == field)
    }
}

impl fmt::Display for StructBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct {} {{", self.name)?;
        for (i, m) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", m.name, m.sort())?;
        }
        write!(f, " }}")
    }
}
