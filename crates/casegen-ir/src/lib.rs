//! Intermediate representation for casegen.
//!
//! Turns a parsed constraint source into a [`CompiledConstraints`]: the
//! global variables, struct blueprints, asserted terms, and the leaf, atom
//! and disjunction tables the generator narrows with.

pub mod compile;
pub mod constraints;
pub mod symbols;
pub mod term;
pub mod types;

pub use compile::{compile, compile_with_options, CompileError, CompileOptions, CompileResult};
pub use constraints::{
    Assertion, AtomTable, CompiledConstraints, DisjunctionGroups, GaussianConstraint, GroupTag,
    Leaf, LeafId,
};
pub use symbols::SymbolTable;
pub use term::{ArithOp, CmpOp, Primitive, Rational, Sort, Term};
pub use types::{IntWidth, MemberDescriptor, Qualifier, StructBlueprint, SymbolEntry, ValueType};

use std::fmt;

/// Whether generated cases satisfy or violate the constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Positive,
    Negative,
}

impl Mode {
    /// File name prefix for cases of this mode.
    pub fn prefix(self) -> char {
        match self {
            Mode::Positive => 'P',
            Mode::Negative => 'N',
        }
    }

    /// Validation outcome a case of this mode must produce.
    pub fn expected(self) -> bool {
        self == Mode::Positive
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Positive => write!(f, "positive"),
            Mode::Negative => write!(f, "negative"),
        }
    }
}
