//! loopdep Command Line Interface
//!
//! Usage:
//!   loopdep [OPTIONS] <input-file>
//!   loopdep --help
//!
//! Examples:
//!   loopdep saxpy.lir                       # Verdict for the loop
//!   loopdep --format=json saxpy.lir         # Machine-readable report
//!   loopdep --emit=optimized saxpy.lir      # IR after CSE and copy propagation
//!   loopdep --emit=cfg saxpy.lir | dot -Tsvg > cfg.svg

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use loopdep::cfg::build_loop_cfg;
use loopdep::utils::pretty::PrettyPrint;
use loopdep::AnalysisConfig;
use std::fs;
use std::path::PathBuf;

/// loopdep - Loop-carried dependence verifier
#[derive(Parser, Debug)]
#[command(name = "loopdep")]
#[command(version)]
#[command(about = "Decides whether a counted loop is safe to parallelize", long_about = None)]
struct Cli {
    /// Input file (.lir format)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, default_value = "text")]
    format: FormatArg,

    /// What to emit
    #[arg(long, default_value = "verdict")]
    emit: EmitKind,

    /// Verify the IR as written, without CSE and copy propagation
    #[arg(long)]
    no_optimize: bool,

    /// Leave procedure calls unresolved instead of stitching callees
    #[arg(long)]
    intraprocedural: bool,

    /// Cap on optimizer rounds per procedure
    #[arg(long, value_name = "N")]
    max_opt_iterations: Option<usize>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    /// Analysis report
    Verdict,
    /// The IR as parsed
    Ir,
    /// The IR after the optimizer
    Optimized,
    /// Control-flow graph (DOT format)
    Cfg,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("loopdep v{}", loopdep::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;

    info!("Parsing...");
    let program = loopdep::parse(&source).with_context(|| format!("Failed to parse {:?}", cli.input))?;

    let config = build_config(&cli);
    debug!("Analysis config: {:?}", config);

    let output = match cli.emit {
        EmitKind::Ir => render_program(&program, cli.format)?,
        EmitKind::Optimized => {
            let (optimized, rewrites, _) = loopdep::optimized(&program, &config)
                .with_context(|| "Optimizer failed")?;
            info!("{} rewrites", rewrites);
            render_program(&optimized, cli.format)?
        }
        EmitKind::Cfg => {
            let (optimized, _, _) = loopdep::optimized(&program, &config)
                .with_context(|| "Optimizer failed")?;
            let (graph, _) = build_loop_cfg(&optimized, config.interprocedural)
                .with_context(|| "Failed to build the control-flow graph")?;
            graph.to_dot()
        }
        EmitKind::Verdict => {
            info!("Analyzing...");
            let report = loopdep::analyze(&program, &config);
            match cli.format {
                FormatArg::Json => serde_json::to_string_pretty(&report)?,
                FormatArg::Text => report.to_string(),
            }
        }
    };

    write_output(&cli.output, &output)
}

fn build_config(cli: &Cli) -> AnalysisConfig {
    let config = AnalysisConfig::default()
        .with_optimize(!cli.no_optimize)
        .with_interprocedural(!cli.intraprocedural);
    match cli.max_opt_iterations {
        Some(iterations) => config.with_max_optimizer_iterations(iterations),
        None => config,
    }
}

fn render_program(program: &loopdep::ir::LoopProgram, format: FormatArg) -> Result<String> {
    match format {
        FormatArg::Json => Ok(serde_json::to_string_pretty(program)?),
        FormatArg::Text => Ok(program.pretty()),
    }
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content).with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
