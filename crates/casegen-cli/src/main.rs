//! Command-line interface for the constraint-driven test case generator.

mod pipeline;
mod writer;

use casegen_ir::{compile_with_options, CompileOptions, IntWidth};
use casegen_syntax::{parse, ExternalDecl, CONSTRAINT_FUNCTION};
use clap::{Args, Parser, Subcommand};
use miette::{Diagnostic, NamedSource, SourceSpan};
use pipeline::{plan_workers, run_pool, Console, RunOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use writer::CaseWriter;

const MAX_THREADS: u32 = 65535;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read {path}: {message}")]
    IoError { path: String, message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(casegen::parse_error))]
    ParseError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("compile error: {message}")]
    #[diagnostic(code(casegen::compile_error))]
    CompileError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("cannot create output directory {path}: {message}")]
    OutputError { path: String, message: String },

    #[error("{failed} of {workers} workers failed")]
    #[diagnostic(help("rerun with --verbose for details"))]
    WorkersFailed { failed: usize, workers: usize },
}

impl CliError {
    fn from_parse_error(e: casegen_syntax::ParseError, source: Arc<String>, filename: &str) -> Self {
        let span = e.span();
        CliError::ParseError {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: (span.start, span.end.saturating_sub(span.start)).into(),
        }
    }

    fn from_compile_error(e: casegen_ir::CompileError, source: Arc<String>, filename: &str) -> Self {
        let span = e.span();
        CliError::CompileError {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: (span.start, span.end.saturating_sub(span.start)).into(),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "casegen", version, long_version = long_version())]
#[command(about = "Generate JSON test cases from C constraint declarations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate positive and negative cases into an output directory
    Generate(GenerateArgs),

    /// Parse a constraint source and report its declarations
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Compile a constraint source and print symbols, leaves and atoms
    Compile {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Integer width for char/short/int/signed
        #[arg(long, default_value = "32", value_parser = parse_int_width)]
        int_width: IntWidth,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Total number of cases
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=65536))]
    num_cases: u32,

    /// Fraction of cases that satisfy the constraints
    #[arg(short = 'p', long, default_value = "0.5", value_parser = parse_ratio)]
    pos_ratio: f64,

    /// Constraint source file
    #[arg(short = 'c', long, value_name = "FILE")]
    cons: PathBuf,

    /// Output directory (created if absent)
    #[arg(short = 'o', long, default_value = "out")]
    output: PathBuf,

    /// Number of worker threads
    #[arg(short = 'j', long, default_value = "1")]
    threads: u32,

    /// Base random seed; worker i uses seed + i
    #[arg(long)]
    seed: Option<u64>,

    /// Generation cycles per mode before giving up
    #[arg(long, default_value = "256")]
    max_cycles: usize,

    /// Integer width for char/short/int/signed
    #[arg(long, default_value = "32", value_parser = parse_int_width)]
    int_width: IntWidth,
}

fn long_version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), " (", env!("CASEGEN_GIT_HASH"), ")")
}

fn parse_ratio(s: &str) -> Result<f64, String> {
    let ratio: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("{ratio} is not in 0.0..=1.0"))
    }
}

fn parse_int_width(s: &str) -> Result<IntWidth, String> {
    match s {
        "32" => Ok(IntWidth::W32),
        "64" => Ok(IntWidth::W64),
        _ => Err(format!("unsupported integer width {s}, expected 32 or 64")),
    }
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Generate(args) => cmd_generate(&args),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Compile { file, int_width } => cmd_compile(&file, int_width),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn read_source(file: &Path) -> CliResult<Arc<String>> {
    fs::read_to_string(file)
        .map(Arc::new)
        .map_err(|e| CliError::IoError {
            path: file.display().to_string(),
            message: e.to_string(),
        })
}

fn cmd_parse(file: &Path) -> CliResult<()> {
    let filename = file.display().to_string();
    let source = read_source(file)?;
    let unit =
        parse(&source).map_err(|e| CliError::from_parse_error(e, source.clone(), &filename))?;

    let declarations = unit
        .items
        .iter()
        .filter(|item| matches!(item, ExternalDecl::Declaration(_)))
        .count();
    println!("{filename}");
    println!("  {declarations} declarations");
    match unit.function(CONSTRAINT_FUNCTION) {
        Some(f) => println!(
            "  {CONSTRAINT_FUNCTION}: {} statements",
            f.body.items.len()
        ),
        None => println!("  {CONSTRAINT_FUNCTION}: not found"),
    }
    println!("parse: ok");
    Ok(())
}

fn cmd_compile(file: &Path, int_width: IntWidth) -> CliResult<()> {
    let filename = file.display().to_string();
    let source = read_source(file)?;
    let unit =
        parse(&source).map_err(|e| CliError::from_parse_error(e, source.clone(), &filename))?;
    let compiled = compile_with_options(&unit, &source, CompileOptions { int_width })
        .map_err(|e| CliError::from_compile_error(e, source.clone(), &filename))?;

    println!("globals:");
    for entry in &compiled.globals {
        println!("  {entry}");
    }
    if !compiled.blueprints.is_empty() {
        println!("structs:");
        for blueprint in &compiled.blueprints {
            println!("  {blueprint}");
        }
    }
    println!("leaves:");
    for leaf in &compiled.leaves {
        let group = compiled
            .disjunctions
            .tag_of(leaf.id)
            .map(|tag| format!("  [group {}]", tag.group()))
            .unwrap_or_default();
        println!("  #{} {}{group}", leaf.id, leaf.term);
    }
    println!("atoms:");
    for atom in compiled.atoms.atoms() {
        let leaves = compiled
            .atoms
            .leaves_of(atom)
            .iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {atom}  <- {leaves}");
    }
    for gaussian in &compiled.gaussians {
        println!(
            "gaussian: {} ~ N({}, {})",
            gaussian.target, gaussian.mean, gaussian.std_dev
        );
    }
    println!(
        "compile: ok ({} assertions, {} disjunction groups)",
        compiled.assertions.len(),
        compiled.disjunctions.groups().len()
    );
    Ok(())
}

fn cmd_generate(args: &GenerateArgs) -> CliResult<()> {
    let filename = args.cons.display().to_string();
    let source = read_source(&args.cons)?;
    let compile = CompileOptions {
        int_width: args.int_width,
    };

    // Fail once, with context, before any worker starts.
    let unit =
        parse(&source).map_err(|e| CliError::from_parse_error(e, source.clone(), &filename))?;
    compile_with_options(&unit, &source, compile)
        .map_err(|e| CliError::from_compile_error(e, source.clone(), &filename))?;

    let writer = CaseWriter::create(&args.output).map_err(|e| CliError::OutputError {
        path: args.output.display().to_string(),
        message: e.to_string(),
    })?;

    let total = args.num_cases as usize;
    let positive = ((total as f64) * args.pos_ratio).round() as usize;
    let positive = positive.min(total);
    let negative = total - positive;
    let threads = args.threads.clamp(1, MAX_THREADS) as usize;
    let plans = plan_workers(positive, negative, threads);
    info!(
        file = %filename,
        positive,
        negative,
        threads,
        output = %writer.dir().display(),
        "generating"
    );

    let options = RunOptions {
        source: source.as_str().to_owned(),
        compile,
        max_cycles: args.max_cycles,
        seed: args.seed,
    };
    let start = Instant::now();
    let console = Console::new(std::io::stdout());
    let summary = run_pool(&plans, &options, &writer, &console);
    info!(
        written = summary.written,
        failed = summary.failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "finished"
    );

    if summary.failed > 0 {
        return Err(CliError::WorkersFailed {
            failed: summary.failed,
            workers: summary.workers,
        });
    }
    Ok(())
}
