//! Z3-backed diversified case generation.
//!
//! The engine asserts the compiled constraints into a solver session, then
//! repeatedly narrows per-atom integer ranges from the leaf comparisons,
//! pins sampled values on scoped solver frames and extracts one JSON case
//! per satisfiable combination.

pub mod cases;
pub mod encoder;
pub mod engine;
pub mod extract;
pub mod narrow;
pub mod session;

pub use cases::CaseSet;
pub use engine::generate;
pub use extract::ExtractError;
pub use session::{CheckOutcome, ScopeGuard, SolverSession};

use casegen_ir::Mode;
use thiserror::Error;

/// Symbolic generation error.
///
/// Only encoding problems are errors; unsatisfiable or unknown solver
/// results are reported through [`GenerationStatus`].
#[derive(Debug, Error)]
pub enum SymbolicError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("invalid Gaussian parameters (mean {mean}, std dev {std_dev}): {reason}")]
    Gaussian {
        mean: f64,
        std_dev: f64,
        reason: String,
    },
}

pub type SymbolicResult<T> = Result<T, SymbolicError>;

/// Search limits and sampling knobs for one generation run.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Cases requested for this mode.
    pub count: usize,
    /// Generation cycles before giving up on the requested count.
    pub max_cycles: usize,
    /// Distinct values sampled per atom at each narrowing step.
    pub samples_per_atom: usize,
    /// Random flip sets tried per cycle in negative mode.
    pub negation_attempts: usize,
    /// Solver checks allowed within one cycle.
    pub check_budget: usize,
    /// Range used for sequence-length atoms.
    pub length_range: (i64, i64),
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            count: 1,
            max_cycles: 256,
            samples_per_atom: 3,
            negation_attempts: 64,
            check_budget: 4096,
            length_range: (1, 100),
        }
    }
}

/// How a generation run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    /// The requested count was reached.
    Complete,
    /// The cycle budget ran out first.
    BudgetExhausted,
    /// The constraints (or every tried negation) were unsatisfiable.
    Unsatisfiable,
    /// The solver gave up.
    Unknown(String),
}

/// Result of one generation run.
#[derive(Debug, Clone)]
pub struct Generation {
    pub mode: Mode,
    /// Distinct cases in discovery order.
    pub cases: Vec<serde_json::Value>,
    pub status: GenerationStatus,
    pub cycles: usize,
    pub checks: usize,
}

impl Generation {
    pub(crate) fn empty(mode: Mode, status: GenerationStatus) -> Self {
        Self {
            mode,
            cases: Vec::new(),
            status,
            cycles: 0,
            checks: 0,
        }
    }
}
