//! Solver session with RAII assertion scopes.

use crate::encoder::{Encoder, SymValue};
use crate::SymbolicResult;
use casegen_ir::{CompiledConstraints, Term};
use std::cell::Cell;
use tracing::{debug, warn};
use z3::{Model, SatResult, Solver};

/// Outcome of one satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Sat,
    Unsat,
    Unknown(String),
}

impl CheckOutcome {
    pub fn is_sat(&self) -> bool {
        matches!(self, CheckOutcome::Sat)
    }
}

/// One Z3 solver plus the symbolic values of every global variable.
///
/// Sessions live on the z3 thread-local context and are never shared
/// between threads.
pub struct SolverSession {
    solver: Solver,
    encoder: Encoder,
    depth: Cell<usize>,
    checks: Cell<usize>,
}

impl SolverSession {
    /// Allocate the variables of `compiled`. Nothing is asserted yet.
    pub fn new(compiled: &CompiledConstraints) -> SymbolicResult<Self> {
        Ok(Self {
            solver: Solver::new(),
            encoder: Encoder::new(compiled)?,
            depth: Cell::new(0),
            checks: Cell::new(0),
        })
    }

    pub fn var(&self, name: &str) -> SymbolicResult<&SymValue> {
        self.encoder.var(name)
    }

    /// Assert a boolean term, together with the bounds of every element
    /// and length access it mentions.
    pub fn assert_term(&self, term: &Term) -> SymbolicResult<()> {
        let mut side = Vec::new();
        let encoded = self.encoder.encode_bool(term, &mut side)?;
        self.solver.assert(&encoded);
        for condition in &side {
            self.solver.assert(condition);
        }
        Ok(())
    }

    /// Assert the negation of a boolean term. Access bounds stay positive.
    pub fn assert_negated(&self, term: &Term) -> SymbolicResult<()> {
        let mut side = Vec::new();
        let encoded = self.encoder.encode_bool(term, &mut side)?;
        self.solver.assert(&encoded.not());
        for condition in &side {
            self.solver.assert(condition);
        }
        Ok(())
    }

    /// Check satisfiability of everything asserted so far.
    pub fn check(&self) -> CheckOutcome {
        self.checks.set(self.checks.get() + 1);
        match self.solver.check() {
            SatResult::Sat => CheckOutcome::Sat,
            SatResult::Unsat => CheckOutcome::Unsat,
            SatResult::Unknown => {
                let reason = self
                    .solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(reason = %reason, "solver returned unknown");
                CheckOutcome::Unknown(reason)
            }
        }
    }

    /// Model of the last satisfiable check.
    pub fn model(&self) -> Option<Model> {
        self.solver.get_model()
    }

    /// Open an assertion scope that is retracted when the guard drops.
    pub fn scope(&self) -> ScopeGuard<'_> {
        self.solver.push();
        self.depth.set(self.depth.get() + 1);
        ScopeGuard { session: self }
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Total solver checks run on this session.
    pub fn checks(&self) -> usize {
        self.checks.get()
    }
}

/// An open solver scope. Dropping it pops exactly that scope, on every
/// exit path.
#[must_use = "dropping the guard immediately retracts the scope"]
pub struct ScopeGuard<'s> {
    session: &'s SolverSession,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.session.solver.pop(1);
        let depth = self.session.depth.get();
        self.session.depth.set(depth.saturating_sub(1));
        debug!(depth, "scope popped");
    }
}
