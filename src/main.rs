//! # mzUnify
//!
//! A command-line tool for unifying proteomics search engine output into a
//! single tabular schema.
//!
//! ## Usage
//!
//! ```bash
//! # Unify a Comet result file
//! mzunify unify results.mzid -p unify.toml -o results.unified.csv
//!
//! # Sniff the format of a result file
//! mzunify detect results.tsv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use mzunify::engines::{detect_format, EngineFormat};
use mzunify::params::UnifyParams;
use mzunify::unify::Unifier;

/// mzUnify - Unified Search Engine Output Tables
#[derive(Parser)]
#[command(name = "mzunify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unify one engine result file into the common schema
    Unify {
        /// Input result file (mzid, xml, tsv or csv)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output CSV path (defaults to stdout)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Unification parameters, TOML
        #[arg(short, long, value_name = "PARAMS")]
        params: Option<PathBuf>,

        /// Skip detection and force an input format
        /// (comet, msgfplus, xtandem, msfragger, flashlfq, tmtquant)
        #[arg(short, long, value_parser = parse_format)]
        format: Option<EngineFormat>,
    },

    /// Report the detected format of a result file
    Detect {
        /// Input result file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn parse_format(name: &str) -> Result<EngineFormat, String> {
    match name {
        "comet" => Ok(EngineFormat::CometMzid),
        "msgfplus" => Ok(EngineFormat::MsgfPlusMzid),
        "xtandem" => Ok(EngineFormat::XTandemXml),
        "msfragger" => Ok(EngineFormat::MsFraggerTsv),
        "flashlfq" => Ok(EngineFormat::FlashLfqTsv),
        "tmtquant" => Ok(EngineFormat::TmtQuantCsv),
        other => Err(format!("unknown format '{other}'")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Unify {
            input,
            output,
            params,
            format,
        } => run_unify(input, output, params, format),
        Commands::Detect { input } => run_detect(input),
    }
}

fn run_unify(
    input: PathBuf,
    output: Option<PathBuf>,
    params: Option<PathBuf>,
    format: Option<EngineFormat>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let params = match params {
        Some(path) => UnifyParams::from_file(&path)
            .with_context(|| format!("Failed to read parameters from {}", path.display()))?,
        None => UnifyParams::default(),
    };

    let unifier = Unifier::new(params).context("Failed to load side inputs")?;
    let table = unifier
        .unify_path(&input, format)
        .with_context(|| format!("Unification of {} failed", input.display()))?;

    info!("{} unified rows", table.len());
    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            table.write_csv(std::io::BufWriter::new(file))?;
            info!("Wrote {}", path.display());
        }
        None => table.write_csv(std::io::stdout().lock())?,
    }
    Ok(())
}

fn run_detect(input: PathBuf) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    match detect_format(&input)? {
        Some(format) => println!("{format}"),
        None => anyhow::bail!("Could not detect the format of {}", input.display()),
    }
    Ok(())
}
