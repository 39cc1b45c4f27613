//! # sheetlogic-cli
//!
//! Command-line interface for compiling classified workbook snapshots.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sheetlogic_core::{CompilationOutput, Compiler, CompilerOptions, Issue, WorkbookSnapshot};
use tracing_subscriber::EnvFilter;

/// sheetlogic - compile spreadsheet logic into a verified computation graph
#[derive(Parser)]
#[command(name = "sheetlogic")]
#[command(author, version, about = "Spreadsheet formula compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a classified workbook snapshot (JSON)
    Compile {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Compiler options file (.yaml, .yml, or .json)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long = "format", default_value = "summary")]
        format: OutputFormat,

        /// Write the JSON output to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Parse and evaluate on the current thread only
        #[arg(long)]
        no_parallel: bool,
    },
}

/// Output format for results.
#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    /// Full compilation output as JSON
    Json,
    /// Colored human-readable summary (default)
    #[default]
    Summary,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compile {
            snapshot,
            config,
            format,
            output,
            no_parallel,
        } => {
            let mut options = match config {
                Some(path) => CompilerOptions::load(&path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?,
                None => CompilerOptions::default(),
            };
            if no_parallel {
                options.parallel = false;
            }
            let compiled = compile(&snapshot, options)?;

            match (format, output) {
                (_, Some(path)) => {
                    write_json(&compiled, &path)?;
                    print_summary(&compiled);
                }
                (OutputFormat::Json, None) => {
                    println!("{}", serde_json::to_string_pretty(&compiled)?);
                }
                (OutputFormat::Summary, None) => print_summary(&compiled),
            }

            Ok(if compiled.can_proceed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

fn compile(path: &Path, options: CompilerOptions) -> Result<CompilationOutput> {
    let snapshot = WorkbookSnapshot::from_path(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    Compiler::new(options)
        .compile(&snapshot)
        .with_context(|| format!("Failed to compile {}", path.display()))
}

fn write_json(compiled: &CompilationOutput, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(compiled)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write output: {}", path.display()))
}

fn print_summary(compiled: &CompilationOutput) {
    let graph = &compiled.graph;
    println!(
        "{} {} cells, {} edges, {} clusters, {} cycles",
        "Compiled".green().bold(),
        graph.nodes().len(),
        graph.edges().len(),
        graph.clusters().len(),
        graph.circular_refs().len()
    );

    for result in &compiled.results {
        println!(
            "  {} {}: {} inputs, {} outputs, {} formulas, {} tests",
            "cluster".cyan(),
            result.cluster_id,
            result.inputs.len(),
            result.outputs.len(),
            result.cells.len(),
            result.tests.len()
        );
        for cell in result.cells.values().filter(|c| c.inferred.needs_review) {
            println!(
                "    {} {} has mixed result types",
                "review".yellow(),
                cell.coordinate
            );
        }
    }

    let errors = &compiled.errors;
    for issue in &errors.critical_errors {
        print_issue("critical".red().bold(), issue);
    }
    for issue in &errors.warnings {
        print_issue("warning".yellow(), issue);
    }

    let impact = &errors.impact_analysis;
    println!(
        "{} {}/{} cells affected ({:.1}%)",
        "Impact".bold(),
        impact.affected_cells,
        impact.total_cells,
        impact.percentage_affected
    );
    if errors.can_proceed {
        println!("{}", "Ready for code generation".green());
    } else {
        let blocked: Vec<String> = impact.blocked_outputs.iter().map(ToString::to_string).collect();
        println!("{} blocked outputs: {}", "Cannot proceed:".red().bold(), blocked.join(", "));
    }
}

fn print_issue(label: colored::ColoredString, issue: &Issue) {
    println!("  [{label}] {:?} at {}: {}", issue.kind, issue.cell, issue.message);
    if !issue.impacted.is_empty() {
        println!("      impacts {} cell(s)", issue.impacted.len());
    }
}
