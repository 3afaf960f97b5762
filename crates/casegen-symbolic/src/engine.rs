//! Diversified solve/mutate engine.
//!
//! One generation run owns one solver session. Each cycle shuffles the
//! atom order, activates one member of every disjunction group (or, in
//! negative mode, negates a random subset of the assertions) and then
//! narrows, samples and pins atoms one at a time on nested solver scopes,
//! extracting a case at every satisfiable step.

use crate::cases::CaseSet;
use crate::extract::{extract_case, GaussianSampler};
use crate::narrow::{self, sample_distinct, Admissible, Fixed, Interval, I32_RANGE};
use crate::session::{CheckOutcome, ScopeGuard, SolverSession};
use crate::{GenerateConfig, Generation, GenerationStatus, SymbolicResult};
use casegen_ir::{
    AtomTable, CmpOp, CompiledConstraints, DisjunctionGroups, LeafId, Mode, Rational, Term,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

/// Run one generation for `mode`, seeded deterministically from `seed`.
pub fn generate(
    compiled: &CompiledConstraints,
    mode: Mode,
    config: &GenerateConfig,
    seed: u64,
) -> SymbolicResult<Generation> {
    info!(%mode, count = config.count, seed, "generation started");
    if config.count == 0 {
        return Ok(Generation::empty(mode, GenerationStatus::Complete));
    }

    let session = SolverSession::new(compiled)?;
    let gaussians = GaussianSampler::all(compiled)?;

    let (atoms, groups) = match mode {
        Mode::Positive => {
            for assertion in &compiled.assertions {
                session.assert_term(&assertion.term)?;
            }
            match session.check() {
                CheckOutcome::Sat => {}
                CheckOutcome::Unsat => {
                    info!("constraints are unsatisfiable, no positive cases");
                    return Ok(Generation::empty(mode, GenerationStatus::Unsatisfiable));
                }
                CheckOutcome::Unknown(reason) => {
                    return Ok(Generation::empty(mode, GenerationStatus::Unknown(reason)));
                }
            }
            (compiled.atoms.clone(), compiled.disjunctions.clone())
        }
        Mode::Negative => {
            if compiled.assertions.is_empty() {
                warn!("no assertions to negate, no negative cases");
                return Ok(Generation::empty(mode, GenerationStatus::Unsatisfiable));
            }
            let mut atoms = compiled.atoms.clone();
            atoms.clear_references();
            (atoms, DisjunctionGroups::default())
        }
    };

    // Gaussian targets are pinned at extraction time, never sampled.
    let order: Vec<Term> = atoms
        .atoms()
        .iter()
        .filter(|atom| !compiled.gaussians.iter().any(|g| g.target == **atom))
        .cloned()
        .collect();

    let mut search = Search {
        session: &session,
        compiled,
        config,
        atoms,
        groups,
        gaussians,
        rng: StdRng::seed_from_u64(seed),
        cases: CaseSet::new(config.count),
        budget: 0,
        negations_found: 0,
        extract_failures: 0,
    };

    let mut cycles = 0;
    while cycles < config.max_cycles && !search.cases.is_full() {
        cycles += 1;
        search.cycle(mode, &order)?;
    }

    let status = if search.cases.is_full() {
        GenerationStatus::Complete
    } else if mode == Mode::Negative && search.negations_found == 0 {
        GenerationStatus::Unsatisfiable
    } else {
        GenerationStatus::BudgetExhausted
    };
    info!(
        %mode,
        cases = search.cases.len(),
        duplicates = search.cases.duplicates(),
        extract_failures = search.extract_failures,
        cycles,
        checks = session.checks(),
        "generation finished"
    );
    debug_assert_eq!(session.depth(), 0);

    let checks = session.checks();
    Ok(Generation {
        mode,
        cases: search.cases.into_cases(),
        status,
        cycles,
        checks,
    })
}

/// Pick one member of every disjunction group.
pub fn choose_disjuncts<R: Rng + ?Sized>(groups: &DisjunctionGroups, rng: &mut R) -> Vec<LeafId> {
    groups
        .groups()
        .values()
        .filter_map(|members| members.choose(rng).copied())
        .collect()
}

/// Mutable search state for one generation run.
struct Search<'s> {
    session: &'s SolverSession,
    compiled: &'s CompiledConstraints,
    config: &'s GenerateConfig,
    atoms: AtomTable,
    groups: DisjunctionGroups,
    gaussians: Vec<GaussianSampler>,
    rng: StdRng,
    cases: CaseSet,
    /// Solver checks left in the current cycle.
    budget: usize,
    negations_found: usize,
    extract_failures: usize,
}

impl<'s> Search<'s> {
    fn cycle(&mut self, mode: Mode, atoms: &[Term]) -> SymbolicResult<()> {
        self.budget = self.config.check_budget;
        let mut order = atoms.to_vec();
        order.shuffle(&mut self.rng);

        let _negation = match mode {
            Mode::Positive => None,
            Mode::Negative => match self.negate()? {
                Some(guard) => Some(guard),
                None => {
                    debug!("no satisfiable negation this cycle");
                    return Ok(());
                }
            },
        };

        if self.groups.is_empty() {
            return self.descend(&order, &mut Fixed::new());
        }

        let chosen = choose_disjuncts(&self.groups, &mut self.rng);
        self.groups.activate(&chosen);
        let session = self.session;
        let _activation = session.scope();
        for id in &chosen {
            if let Some(leaf) = self.compiled.leaf(*id) {
                session.assert_term(&leaf.term)?;
            }
        }
        debug!(?chosen, "disjuncts activated");
        match self.check() {
            CheckOutcome::Sat => self.descend(&order, &mut Fixed::new())?,
            outcome => debug!(?chosen, ?outcome, "activated disjuncts not satisfiable"),
        }
        Ok(())
    }

    /// Assert a random negation of the assertions on a new scope, retrying
    /// until one is satisfiable. The returned guard keeps it asserted.
    fn negate(&mut self) -> SymbolicResult<Option<ScopeGuard<'s>>> {
        let session = self.session;
        let assertions = &self.compiled.assertions;
        for attempt in 0..self.config.negation_attempts {
            let flips = loop {
                let flips: Vec<bool> = assertions
                    .iter()
                    .map(|_| self.rng.gen_ratio(1, 6))
                    .collect();
                if flips.contains(&true) {
                    break flips;
                }
            };
            let guard = session.scope();
            for (assertion, &flip) in assertions.iter().zip(&flips) {
                if flip {
                    session.assert_negated(&assertion.term)?;
                } else {
                    session.assert_term(&assertion.term)?;
                }
            }
            if self.check().is_sat() {
                let negated = flips.iter().filter(|f| **f).count();
                debug!(attempt, negated, "negation satisfiable");
                self.negations_found += 1;
                return Ok(Some(guard));
            }
        }
        Ok(None)
    }

    /// Narrow, sample and pin `order[0]`, then recurse on the rest.
    fn descend(&mut self, order: &[Term], fixed: &mut Fixed) -> SymbolicResult<()> {
        if self.exhausted() {
            return Ok(());
        }
        let Some((atom, rest)) = order.split_first() else {
            self.record();
            return Ok(());
        };

        let base = if atom.is_length() {
            Interval::new(self.config.length_range.0, self.config.length_range.1)
        } else {
            I32_RANGE
        };
        let leaves: Vec<&Term> = self
            .atoms
            .leaves_of(atom)
            .iter()
            .filter(|id| !self.groups.is_inactive(**id))
            .filter_map(|id| self.compiled.leaf(*id))
            .map(|leaf| &leaf.term)
            .collect();

        let range = match narrow::admissible(atom, leaves, fixed, base) {
            Admissible::Range(range) => range,
            Admissible::Solver => return self.descend(rest, fixed),
            Admissible::Empty => {
                debug!(%atom, "no admissible value");
                return Ok(());
            }
        };

        let session = self.session;
        for value in sample_distinct(range, self.config.samples_per_atom, &mut self.rng) {
            if self.exhausted() {
                break;
            }
            let _pin = session.scope();
            session.assert_term(&Term::cmp(CmpOp::Eq, atom.clone(), Term::Int(value)))?;
            if !self.check().is_sat() {
                continue;
            }
            debug!(%atom, value, "pinned");
            self.record();
            fixed.insert(atom.clone(), Rational::from_int(value));
            let result = self.descend(rest, fixed);
            fixed.remove(atom);
            result?;
        }
        Ok(())
    }

    fn check(&mut self) -> CheckOutcome {
        self.budget = self.budget.saturating_sub(1);
        self.session.check()
    }

    fn exhausted(&self) -> bool {
        self.budget == 0 || self.cases.is_full()
    }

    /// Extract the current model into the case set.
    fn record(&mut self) {
        match extract_case(self.session, self.compiled, &self.gaussians, &mut self.rng) {
            Ok(case) => {
                if self.cases.insert(case) {
                    debug!(cases = self.cases.len(), "case recorded");
                }
            }
            Err(e) => {
                self.extract_failures += 1;
                debug!(error = %e, "extraction skipped");
            }
        }
    }
}
