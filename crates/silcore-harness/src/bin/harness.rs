//! CLI entrypoint for the silcore stress harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use silcore_core::PlatformVariant;
use silcore_core::debug::{log_file_close, log_file_configure, log_file_open};
use silcore_harness::scenarios::{self, ScenarioReport, StressOptions};
use silcore_harness::{HarnessError, LogEmitter, LogEntry, LogLevel};

/// Stress and fault-injection tooling for silcore.
#[derive(Debug, Parser)]
#[command(name = "silcore-harness")]
#[command(about = "Stress and fault-injection harness for silcore")]
struct Cli {
    /// Structured JSONL output path (stdout when omitted).
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    /// Run identifier embedded in trace ids.
    #[arg(long, global = true, default_value = "run")]
    run_id: String,
    /// Tee the core debug log into this file.
    #[arg(long, global = true)]
    debug_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the compiled core configuration.
    Config,
    /// Churn a shared handle table from several threads.
    IdStress {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,
        /// Slots per table segment (at least 2).
        #[arg(long, default_value_t = 16)]
        expand_by: usize,
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF", value_parser = parse_seed)]
        seed: u64,
    },
    /// Broadcast rounds over a condition variable.
    Broadcast {
        /// `native`, `critical-section`, `semaphore-only` or `all`.
        #[arg(long, default_value = "all")]
        variant: String,
        /// Number of waiting threads.
        #[arg(long, default_value_t = 10)]
        threads: usize,
        #[arg(long, default_value_t = 20)]
        rounds: usize,
    },
    /// Fail every allocation point of a composite workload in turn.
    FaultSweep {
        #[arg(long, default_value_t = 10_000)]
        max_points: usize,
    },
    /// Random alloc/realloc/free traffic from several threads.
    AllocStorm {
        #[arg(long, default_value_t = 4)]
        threads: usize,
        #[arg(long, default_value_t = 20_000)]
        iterations: usize,
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF", value_parser = parse_seed)]
        seed: u64,
    },
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|e| format!("invalid seed '{raw}': {e}"))
}

fn parse_variants(raw: &str) -> Result<Vec<PlatformVariant>, HarnessError> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(PlatformVariant::all().to_vec());
    }
    PlatformVariant::from_str_loose(raw)
        .map(|v| vec![v])
        .ok_or_else(|| HarnessError::InvalidArgument(format!("unknown platform variant '{raw}'")))
}

fn run(command: Command) -> Result<Vec<ScenarioReport>, HarnessError> {
    match command {
        Command::Config => Ok(Vec::new()),
        Command::IdStress {
            threads,
            iterations,
            expand_by,
            seed,
        } => {
            let opts = StressOptions {
                threads,
                iterations,
                seed,
            };
            Ok(vec![scenarios::id_stress(&opts, expand_by)?])
        }
        Command::Broadcast {
            variant,
            threads,
            rounds,
        } => parse_variants(&variant)?
            .into_iter()
            .map(|v| scenarios::broadcast(v, threads, rounds))
            .collect(),
        Command::FaultSweep { max_points } => {
            #[cfg(feature = "include-tests")]
            {
                Ok(vec![scenarios::fault_sweep(max_points)?])
            }
            #[cfg(not(feature = "include-tests"))]
            {
                let _ = max_points;
                Err(HarnessError::InvalidArgument(
                    "fault-sweep needs the `include-tests` feature".to_string(),
                ))
            }
        }
        Command::AllocStorm {
            threads,
            iterations,
            seed,
        } => {
            let opts = StressOptions {
                threads,
                iterations,
                seed,
            };
            Ok(vec![scenarios::alloc_storm(&opts)?])
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(path) = &cli.debug_log {
        log_file_configure();
        log_file_open(Box::new(std::fs::File::create(path)?))?;
    }
    let mut emitter = match &cli.output {
        Some(path) => LogEmitter::to_file(path, &cli.run_id)?,
        None => LogEmitter::to_stdout(&cli.run_id),
    };

    let is_config = matches!(cli.command, Command::Config);
    emitter.emit_entry(
        LogEntry::new("", LogLevel::Info, "config").with_details(scenarios::config_report()),
    )?;
    if is_config {
        emitter.flush()?;
        return Ok(());
    }

    let reports = run(cli.command)?;
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.scenario)
        .collect();
    for report in &reports {
        emitter.emit_entry(report.to_log_entry())?;
    }
    emitter.flush()?;
    if cli.debug_log.is_some() {
        log_file_close()?;
    }

    if let Some(path) = &cli.output {
        eprintln!("Wrote {} scenario record(s) to {}", reports.len(), path.display());
    }
    if !failed.is_empty() {
        return Err(format!("failed scenarios: {}", failed.join(", ")).into());
    }
    Ok(())
}
