//! Worker pool: every worker runs the whole pipeline on its own share of
//! the requested cases.

use crate::writer::CaseWriter;
use casegen_eval::Validator;
use casegen_ir::{compile_with_options, CompileOptions, Mode};
use casegen_symbolic::{generate, GenerateConfig, GenerationStatus};
use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::thread;
use thiserror::Error;
use tracing::{error, info};

/// Added to a worker's seed for its negative run, so the two modes never
/// share a random stream.
const NEGATIVE_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

/// One worker's share of the cases and where its file indices start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPlan {
    pub worker: usize,
    pub positive: usize,
    pub negative: usize,
    pub positive_offset: usize,
    pub negative_offset: usize,
}

/// Split both counts across `workers`; the last worker takes the remainder.
pub fn plan_workers(positive: usize, negative: usize, workers: usize) -> Vec<WorkerPlan> {
    let workers = workers.max(1);
    let share = |total: usize, i: usize| {
        let base = total / workers;
        if i + 1 == workers {
            base + total % workers
        } else {
            base
        }
    };
    let mut plans = Vec::with_capacity(workers);
    let (mut positive_offset, mut negative_offset) = (0, 0);
    for worker in 0..workers {
        let plan = WorkerPlan {
            worker,
            positive: share(positive, worker),
            negative: share(negative, worker),
            positive_offset,
            negative_offset,
        };
        positive_offset += plan.positive;
        negative_offset += plan.negative;
        plans.push(plan);
    }
    plans
}

/// Everything a worker needs besides its plan.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: String,
    pub compile: CompileOptions,
    pub max_cycles: usize,
    /// Base seed; worker `i` uses `seed + i`. Random per worker when unset.
    pub seed: Option<u64>,
}

/// Why a worker stopped before finishing.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Parse(#[from] casegen_syntax::ParseError),

    #[error(transparent)]
    Compile(#[from] casegen_ir::CompileError),

    #[error(transparent)]
    Symbolic(#[from] casegen_symbolic::SymbolicError),

    #[error("worker panicked")]
    Panicked,
}

/// Results of one mode within one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeReport {
    pub mode: Mode,
    pub requested: usize,
    pub generated: usize,
    pub accepted: usize,
    pub dropped: usize,
    pub written: usize,
    pub status: GenerationStatus,
}

impl ModeReport {
    fn line(&self) -> String {
        let status = match &self.status {
            GenerationStatus::Complete => "complete".to_string(),
            GenerationStatus::BudgetExhausted => "cycle budget exhausted".to_string(),
            GenerationStatus::Unsatisfiable => "unsatisfiable".to_string(),
            GenerationStatus::Unknown(reason) => format!("solver unknown: {reason}"),
        };
        format!(
            "  {}: {}/{} generated, {} accepted, {} dropped, {} written ({status})",
            self.mode,
            self.generated,
            self.requested,
            self.accepted,
            self.dropped,
            self.written
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker: usize,
    pub seed: u64,
    pub modes: Vec<ModeReport>,
}

impl WorkerReport {
    pub fn written(&self) -> usize {
        self.modes.iter().map(|m| m.written).sum()
    }
}

/// Run one worker to completion: parse, compile, then generate, validate
/// and write positive cases followed by negative cases.
pub fn run_worker(
    plan: &WorkerPlan,
    options: &RunOptions,
    writer: &CaseWriter,
    seed: u64,
) -> Result<WorkerReport, WorkerError> {
    info!(worker = plan.worker, seed, positive = plan.positive, negative = plan.negative, "worker started");
    let unit = casegen_syntax::parse(&options.source)?;
    let compiled = compile_with_options(&unit, &options.source, options.compile)?;
    let validator = Validator::new(&compiled.predicates);

    let mut modes = Vec::new();
    let runs = [
        (Mode::Positive, plan.positive, plan.positive_offset, seed),
        (
            Mode::Negative,
            plan.negative,
            plan.negative_offset,
            seed.wrapping_add(NEGATIVE_SEED_OFFSET),
        ),
    ];
    for (mode, quota, offset, mode_seed) in runs {
        if quota == 0 {
            continue;
        }
        let config = GenerateConfig {
            count: quota,
            max_cycles: options.max_cycles,
            ..GenerateConfig::default()
        };
        let generation = generate(&compiled, mode, &config, mode_seed)?;
        let generated = generation.cases.len();
        let validation = validator.validate(generation.cases, mode);
        let mut written = 0;
        for (i, case) in validation.accepted.iter().enumerate() {
            if writer.write_or_echo(mode, offset + i, case) {
                written += 1;
            }
        }
        modes.push(ModeReport {
            mode,
            requested: quota,
            generated,
            accepted: validation.accepted.len(),
            dropped: validation.mismatched + validation.errors,
            written,
            status: generation.status,
        });
    }

    let report = WorkerReport {
        worker: plan.worker,
        seed,
        modes,
    };
    info!(worker = plan.worker, written = report.written(), "worker finished");
    Ok(report)
}

/// Process-wide sink for the human-readable worker reports.
pub struct Console<W> {
    sink: Mutex<W>,
}

impl<W: Write> Console<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Write one block of text without interleaving with other workers.
    pub fn print(&self, block: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.write_all(block.as_bytes());
        let _ = sink.flush();
    }

    pub fn into_inner(self) -> W {
        self.sink.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Totals over the whole pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub workers: usize,
    pub failed: usize,
    pub written: usize,
}

/// Run every plan on its own thread and wait for all of them.
pub fn run_pool<W: Write + Send>(
    plans: &[WorkerPlan],
    options: &RunOptions,
    writer: &CaseWriter,
    console: &Console<W>,
) -> PoolSummary {
    let results: Vec<Result<WorkerReport, WorkerError>> = thread::scope(|scope| {
        let handles: Vec<_> = plans
            .iter()
            .map(|plan| {
                let seed = worker_seed(options.seed, plan.worker);
                scope.spawn(move || {
                    let result = run_worker(plan, options, writer, seed);
                    console.print(&render(plan, seed, &result));
                    result
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(Err(WorkerError::Panicked)))
            .collect()
    });

    let mut summary = PoolSummary {
        workers: plans.len(),
        ..PoolSummary::default()
    };
    for (plan, result) in plans.iter().zip(&results) {
        match result {
            Ok(report) => summary.written += report.written(),
            Err(e) => {
                error!(worker = plan.worker, error = %e, "worker failed");
                summary.failed += 1;
            }
        }
    }
    console.print("ALL DONE\n");
    summary
}

fn worker_seed(base: Option<u64>, worker: usize) -> u64 {
    match base {
        Some(seed) => seed.wrapping_add(worker as u64),
        None => rand::random(),
    }
}

fn render(plan: &WorkerPlan, seed: u64, result: &Result<WorkerReport, WorkerError>) -> String {
    let mut out = format!("worker {} (seed {seed})\n", plan.worker);
    match result {
        Ok(report) => {
            for mode in &report.modes {
                let _ = writeln!(out, "{}", mode.line());
            }
            if report.modes.is_empty() {
                out.push_str("  nothing to generate\n");
            }
        }
        Err(e) => {
            let _ = writeln!(out, "  failed: {e}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn options(source: &str) -> RunOptions {
        RunOptions {
            source: source.to_string(),
            compile: CompileOptions::default(),
            max_cycles: 64,
            seed: Some(5),
        }
    }

    #[test]
    fn test_plan_remainder_goes_last() {
        let plans = plan_workers(10, 3, 4);
        let pos: Vec<_> = plans.iter().map(|p| p.positive).collect();
        let neg: Vec<_> = plans.iter().map(|p| p.negative).collect();
        assert_eq!(pos, vec![2, 2, 2, 4]);
        assert_eq!(neg, vec![0, 0, 0, 3]);
        let offsets: Vec<_> = plans.iter().map(|p| p.positive_offset).collect();
        assert_eq!(offsets, vec![0, 2, 4, 6]);
        assert_eq!(plans[3].negative_offset, 0);
    }

    #[test]
    fn test_plan_zero_workers_means_one() {
        let plans = plan_workers(3, 2, 0);
        assert_eq!(plans.len(), 1);
        assert_eq!((plans[0].positive, plans[0].negative), (3, 2));
    }

    #[test]
    fn test_worker_seeds() {
        assert_eq!(worker_seed(Some(10), 3), 13);
        assert_eq!(worker_seed(Some(u64::MAX), 1), 0);
    }

    #[test]
    fn test_run_worker_writes_both_modes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaseWriter::create(dir.path()).unwrap();
        let plan = WorkerPlan {
            worker: 0,
            positive: 3,
            negative: 2,
            positive_offset: 4,
            negative_offset: 0,
        };
        let report = run_worker(
            &plan,
            &options("int a;\nint _CONSTRAINT(void) { a > 5 && a < 10; }"),
            &writer,
            5,
        )
        .unwrap();
        assert_eq!(report.modes.len(), 2);
        assert_eq!(report.modes[0].written, 3);
        assert_eq!(report.modes[1].written, 2);
        for name in ["P00004.json", "P00005.json", "P00006.json", "N00000.json", "N00001.json"] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }
    }

    #[test]
    fn test_run_worker_counts_only_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cases");
        let writer = CaseWriter::create(&out).unwrap();
        std::fs::remove_dir(&out).unwrap();
        let plan = WorkerPlan {
            worker: 0,
            positive: 2,
            negative: 0,
            positive_offset: 0,
            negative_offset: 0,
        };
        let report = run_worker(
            &plan,
            &options("int a;\nint _CONSTRAINT(void) { a > 5 && a < 10; }"),
            &writer,
            5,
        )
        .unwrap();
        assert_eq!(report.modes.len(), 1);
        assert_eq!(report.modes[0].accepted, 2);
        assert_eq!(report.modes[0].written, 0);
        assert_eq!(report.written(), 0);
    }

    #[test]
    fn test_pool_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaseWriter::create(dir.path()).unwrap();
        let console = Console::new(Vec::new());
        let plans = plan_workers(2, 0, 2);
        let summary = run_pool(&plans, &options("int a;\nint _CONSTRAINT(void) { b > 1; }"), &writer, &console);
        assert_eq!(summary.failed, 2);
        let text = String::from_utf8(console.into_inner()).unwrap();
        assert!(text.contains("worker 0"));
        assert!(text.contains("worker 1"));
        assert!(text.ends_with("ALL DONE\n"));
    }

    #[test]
    fn test_pool_writes_disjoint_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaseWriter::create(dir.path()).unwrap();
        let console = Console::new(Vec::new());
        let plans = plan_workers(6, 0, 3);
        let summary = run_pool(
            &plans,
            &options("int a;\nint _CONSTRAINT(void) { a > 0 && a < 1000; }"),
            &writer,
            &console,
        );
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.written, 6);
        for i in 0..6 {
            assert!(dir.path().join(CaseWriter::file_name(Mode::Positive, i)).is_file());
        }
    }

    proptest! {
        #[test]
        fn prop_plans_partition_counts(pos in 0usize..5000, neg in 0usize..5000, workers in 1usize..64) {
            let plans = plan_workers(pos, neg, workers);
            prop_assert_eq!(plans.len(), workers);
            prop_assert_eq!(plans.iter().map(|p| p.positive).sum::<usize>(), pos);
            prop_assert_eq!(plans.iter().map(|p| p.negative).sum::<usize>(), neg);
            for pair in plans.windows(2) {
                prop_assert_eq!(pair[1].positive_offset, pair[0].positive_offset + pair[0].positive);
                prop_assert_eq!(pair[1].negative_offset, pair[0].negative_offset + pair[0].negative);
            }
            for plan in &plans[..workers - 1] {
                prop_assert_eq!(plan.positive, pos / workers);
            }
        }
    }
}
