//! ebc CLI: replay a chunk build's backtrace over a fixture graph.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use ebc_core::backtrace::{BacktraceStats, ExplanationChunker, TraceEvent};
use ebc_core::chunk_cond::ChunkCondSummary;
use ebc_core::config::EbcConfig;
use ebc_core::fixture::{GraphFixture, LoadedFixture};
use ebc_core::graph::ConditionId;
use ebc_core::unify::{RecordingUnifier, UnificationRequest};

#[derive(Parser)]
#[command(name = "ebc", version, about = "Explanation-based chunking backtracer")]
struct Cli {
    /// Chunker configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtrace from one instantiation of a fixture graph.
    Explain {
        /// Path to the JSON fixture.
        #[arg(long)]
        fixture: PathBuf,

        /// Fixture name of the instantiation that produced the result.
        #[arg(long)]
        instantiation: String,

        /// Further result-producing instantiations of the same build.
        #[arg(long)]
        extra: Vec<String>,

        /// Goal level of the result. Defaults to one above the instantiation's goal.
        #[arg(long)]
        grounds_level: Option<u16>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Serialize)]
struct ExplainReport {
    production: String,
    grounds_level: u16,
    reliable: bool,
    grounds: Vec<String>,
    locals: Vec<String>,
    negated: Vec<ChunkCondSummary>,
    unifications: Vec<UnificationRequest>,
    stats: BacktraceStats,
    events: Vec<TraceEvent>,
}

fn describe(loaded: &LoadedFixture, ids: &[ConditionId]) -> Result<Vec<String>> {
    ids.iter()
        .map(|&id| {
            let cond = loaded.graph.condition(id).into_diagnostic()?;
            Ok(match loaded.condition_name(id) {
                Some(name) => format!("[{name}] {cond}"),
                None => cond.to_string(),
            })
        })
        .collect()
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EbcConfig::load(path)?,
        None => EbcConfig::default(),
    };

    match cli.command {
        Commands::Explain {
            fixture,
            instantiation,
            extra,
            grounds_level,
            json,
        } => {
            let mut loaded = GraphFixture::load(&fixture)?.build()?;
            let base = loaded.instantiation(&instantiation)?;
            let extra = extra
                .iter()
                .map(|name| loaded.instantiation(name))
                .collect::<Result<Vec<_>, _>>()?;

            let inst = loaded.graph.instantiation(base)?;
            let production = inst.name().to_string();
            let grounds_level = grounds_level.unwrap_or_else(|| inst.match_goal_level.saturating_sub(1));

            let mut chunker = ExplanationChunker::new(config);
            let mut unifier = RecordingUnifier::new();
            let outcome = chunker.explain(&mut loaded.graph, &mut unifier, base, grounds_level, &extra)?;

            let report = ExplainReport {
                production,
                grounds_level,
                reliable: outcome.reliable,
                grounds: describe(&loaded, &outcome.grounds)?,
                locals: describe(&loaded, &outcome.locals)?,
                negated: outcome.negated.iter().map(ChunkCondSummary::from).collect(),
                unifications: unifier.into_requests(),
                stats: outcome.stats,
                events: outcome.events,
            };

            if json {
                let text = serde_json::to_string_pretty(&report).into_diagnostic()?;
                println!("{text}");
                return Ok(());
            }

            println!("Backtrace of {} (grounds level {})", report.production, report.grounds_level);
            println!("  reliable: {}", report.reliable);
            println!("  grounds ({}):", report.grounds.len());
            for ground in &report.grounds {
                println!("    {ground}");
            }
            println!("  locals ({}):", report.locals.len());
            for local in &report.locals {
                println!("    {local}");
            }
            println!("  negated ({}):", report.negated.len());
            for negated in &report.negated {
                println!("    {}", negated.condition);
            }
            println!("  unifications ({}):", report.unifications.len());
            for request in &report.unifications {
                println!("    {request}");
            }
            let stats = &report.stats;
            println!(
                "  instantiations: {} backtraced, {} already seen; {} locals dropped; {} CDPS traced",
                stats.instantiations_backtraced,
                stats.seen_instantiations_backtraced,
                stats.locals_dropped,
                stats.cdps_traced,
            );
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
