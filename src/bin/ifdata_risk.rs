//! IF.data risk CLI
//!
//! Usage:
//!   cargo run --features cli --bin ifdata_risk -- run --input rows.jsonl --store store.json
//!   cargo run --features cli --bin ifdata_risk -- audit --input history.jsonl --strict
//!   cargo run --features cli --bin ifdata_risk -- check-config
//!
//! Configuration is read from --config-dir, IFDATA_RISK_CONFIG_DIR, ./config
//! or the crate's own config/ directory, in that order.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use ifdata_risk::audit::audit;
use ifdata_risk::config::{ConfigLoader, RiskConfig};
use ifdata_risk::pipeline::RiskPipeline;
use ifdata_risk::source::read_source_file;
use ifdata_risk::store::JsonFileStore;

/// Exit status for a completed audit with findings
const EXIT_AUDIT_DEFECTS: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "ifdata_risk")]
#[command(version)]
#[command(about = "Normalize IF.data indicators and score bank risk")]
struct Cli {
    /// Directory holding dictionary.yaml and scoring.yaml
    #[arg(long, global = true, env = "IFDATA_RISK_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize, derive and score a batch of source rows
    Run {
        /// JSON array or JSON Lines of source rows
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Write the batch outcome here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Upsert canonical and scored records into this JSON store
        #[arg(long, short = 's')]
        store: Option<PathBuf>,
    },

    /// Check dictionary coverage against observed labels
    Audit {
        #[arg(long, short = 'i')]
        input: PathBuf,

        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Also fail on unmapped labels (ambiguous labels always fail)
        #[arg(long)]
        strict: bool,
    },

    /// Load and validate every configuration table, then exit
    CheckConfig,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::new(dir.clone()),
        None => ConfigLoader::from_env(),
    };

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            store,
        } => cmd_run(&loader, &input, output.as_deref(), store.as_deref()),
        Commands::Audit {
            input,
            output,
            strict,
        } => cmd_audit(&loader, &input, output.as_deref(), strict),
        Commands::CheckConfig => cmd_check_config(&loader),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn cmd_run(
    loader: &ConfigLoader,
    input: &Path,
    output: Option<&Path>,
    store: Option<&Path>,
) -> Result<ExitCode> {
    let config = loader.load()?;
    let batch = read_source_file(input)?;

    let outcome = RiskPipeline::from_config(&config).run(&batch.rows)?;

    if let Some(path) = store {
        let mut sink = JsonFileStore::open(path)?;
        let written = outcome.persist(&mut sink)?;
        info!("Upserted {} scored records into {}", written, path.display());
    }

    write_json(&outcome, output)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_audit(
    loader: &ConfigLoader,
    input: &Path,
    output: Option<&Path>,
    strict: bool,
) -> Result<ExitCode> {
    let dictionary = loader.load_dictionary()?;
    let batch = read_source_file(input)?;

    let report = audit(&batch.rows, &dictionary);
    write_json(&report, output)?;

    let failed = report.has_blocking_defects() || (strict && !report.is_clean());
    if failed {
        error!(
            "Audit failed: {} ambiguous, {} unmapped label(s)",
            report.ambiguous.len(),
            report.unmapped.len()
        );
        return Ok(ExitCode::from(EXIT_AUDIT_DEFECTS));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check_config(loader: &ConfigLoader) -> Result<ExitCode> {
    let RiskConfig {
        dictionary,
        derivations,
        scoring,
    } = loader.load()?;

    println!("config dir: {}", loader.config_dir().display());
    println!(
        "dictionary: {} ({} rules) sha256 {}",
        dictionary.version(),
        dictionary.mappings().len(),
        dictionary.fingerprint()
    );
    println!(
        "scoring:    {} ({} factors) sha256 {}",
        scoring.version(),
        scoring.factors().len(),
        scoring.fingerprint()
    );
    for spec in derivations.specs() {
        println!("derived:    {} = {}", spec.output, spec.description);
    }
    Ok(ExitCode::SUCCESS)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
