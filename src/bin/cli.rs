use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use searchwatch::storage::read_report;
use searchwatch::{Engine, Event, Params, ReportSink, Reporter, SearchBatch, SnapshotLog};

#[derive(Parser)]
#[command(name = "searchwatch", about = "Search result validation and latency SLA checker")]
struct Cli {
    /// TOML configuration; reference defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay JSON-lines events and check the run against the thresholds.
    Check {
        /// Event file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        input: String,
        /// Write the final JSON report here (`-` for stdout).
        #[arg(long)]
        report: Option<String>,
        /// Append periodic snapshots to a bincode log.
        #[arg(long)]
        snapshot_log: Option<String>,
        #[arg(long)]
        expected_count: Option<usize>,
        #[arg(long)]
        p95_ms: Option<f64>,
        #[arg(long)]
        sub_stage_p95_ms: Option<f64>,
        #[arg(long)]
        max_samples: Option<usize>,
    },
    /// Validate one batch, or an array of batches, from JSON.
    Validate {
        #[arg(long, default_value = "-")]
        input: String,
        #[arg(long)]
        expected_count: Option<usize>,
    },
    /// Print the snapshot series stored in a snapshot log.
    History {
        #[arg(long)]
        log: String,
    },
    /// Print a saved JSON report's compact summary.
    Summary {
        #[arg(long)]
        report: String,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchInput {
    One(SearchBatch),
    Many(Vec<SearchBatch>),
}

fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let file = File::open(path).with_context(|| format!("opening {path}"))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

fn exit_status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut params = match &cli.config {
        Some(path) => Params::load(path)?,
        None => Params::default(),
    };

    match cli.command {
        Commands::Check {
            input,
            report,
            snapshot_log,
            expected_count,
            p95_ms,
            sub_stage_p95_ms,
            max_samples,
        } => {
            if let Some(v) = p95_ms {
                params.thresholds.total_latency_p95_ms = v;
            }
            if let Some(v) = sub_stage_p95_ms {
                params.thresholds.sub_stage_latency_p95_ms = v;
            }
            if let Some(v) = max_samples {
                params.retention.max_samples = v;
            }
            let engine = Arc::new(Engine::new(params)?);
            let sink = report.as_deref().map(ReportSink::parse);

            let log = snapshot_log
                .as_deref()
                .map(|path| SnapshotLog::create(path, &engine.run_id()))
                .transpose()?;
            let reporter = if sink.is_some() || log.is_some() {
                Some(Reporter::spawn(Arc::clone(&engine), sink.clone(), log)?)
            } else {
                None
            };

            let mut skipped = 0usize;
            for (lineno, line) in open_input(&input)?.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let event: Event = match serde_json::from_str(&line) {
                    Ok(e) => e,
                    Err(err) => {
                        tracing::warn!(line = lineno + 1, "skipping malformed event: {err}");
                        skipped += 1;
                        continue;
                    }
                };
                if let Err(err) = engine.ingest(event, expected_count) {
                    tracing::warn!(line = lineno + 1, "event rejected: {err}");
                    skipped += 1;
                }
            }

            if let Some(reporter) = reporter {
                reporter.stop()?;
            }
            let final_report = engine.finalize();
            if let Some(sink) = &sink {
                sink.write(&final_report)?;
            }
            if let Some(path) = &snapshot_log {
                let (log, _, _) = SnapshotLog::open(path)?;
                log.append(&final_report)?;
            }
            print!("{}", final_report.summary_table());
            if skipped > 0 {
                println!("skipped {skipped} input lines");
            }
            Ok(exit_status(final_report.all_requirements_met))
        }
        Commands::Validate {
            input,
            expected_count,
        } => {
            params.validate()?;
            let validator = searchwatch::ResultValidator::new(
                params.validation.expected_source.clone(),
                params.thresholds,
            );
            let mut text = String::new();
            open_input(&input)?.read_to_string(&mut text)?;
            let parsed: BatchInput = serde_json::from_str(&text).context("parsing batch JSON")?;
            let valid = match parsed {
                BatchInput::One(batch) => {
                    let result = validator.validate(&batch, expected_count);
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    result.valid
                }
                BatchInput::Many(batches) => {
                    let result = validator.validate_batch_performance(&batches);
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    result.valid
                }
            };
            Ok(exit_status(valid))
        }
        Commands::History { log } => {
            let (_, header, reports) = SnapshotLog::open(&log)?;
            println!("run {} ({} reports)", header.run_id, reports.len());
            for r in &reports {
                let p95s: Vec<String> = r
                    .endpoints
                    .iter()
                    .map(|(k, s)| format!("{k}={:.2}", s.total.p95))
                    .collect();
                println!(
                    "#{:<4} {:?} t={} {} {}",
                    r.run.sequence,
                    r.kind,
                    r.run.generated_at_ms,
                    if r.all_requirements_met { "PASS" } else { "FAIL" },
                    p95s.join(" ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Summary { report } => {
            let report = read_report(&report)?;
            print!("{}", report.summary_table());
            Ok(exit_status(report.all_requirements_met))
        }
        Commands::Config => {
            print!("{}", params.to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
