//! CLI entrypoint for the canarystack harness.

use std::path::PathBuf;

use canarystack::DumpSink;
use canarystack_harness::structured_log::{LogEmitter, LogLevel, Outcome};
use canarystack_harness::{CorruptTarget, HarnessError, StackRunner};
use clap::{Parser, Subcommand};

/// Driving program for guarded stacks.
#[derive(Debug, Parser)]
#[command(name = "canarystack-harness")]
#[command(about = "Exercise guarded stacks and log what they report")]
struct Cli {
    /// JSONL log destination (stdout when omitted).
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Diagnostic dump destination (CANARYSTACK_DUMP or stderr when omitted).
    #[arg(long, global = true)]
    dump: Option<PathBuf>,
    /// Run identifier used in trace ids.
    #[arg(long, global = true, default_value = "local")]
    run_id: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Push 0..9, dump the stack twice, pop everything, destroy.
    Scenario,
    /// Inject one fault and observe the report. Aborts when the build
    /// classifies corruption as fatal.
    Corrupt {
        #[arg(long, value_enum)]
        target: CorruptTarget,
    },
    /// Random push/pop against a model with invariant checks.
    Stress {
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xC0FF_EE00")]
        seed: String,
        /// Number of operations to run.
        #[arg(long, default_value_t = 10_000)]
        steps: usize,
    },
}

impl Command {
    const fn suite(&self) -> &'static str {
        match self {
            Self::Scenario => "scenario",
            Self::Corrupt { .. } => "corrupt",
            Self::Stress { .. } => "stress",
        }
    }
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|err| format!("invalid seed '{raw}': {err}"))
}

/// Flush what was logged, then abort without unwinding.
fn abort_after(runner: StackRunner, why: &str) -> ! {
    let mut emitter = runner.into_emitter();
    let entry = emitter
        .entry(LogLevel::Fatal, "abort")
        .with_outcome(Outcome::Abort)
        .with_details(serde_json::json!({ "reason": why }));
    let _ = emitter.emit_entry(entry);
    let _ = emitter.flush();
    eprintln!("canarystack-harness: {why}; aborting");
    std::process::abort();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let suite = cli.command.suite();

    let emitter = match &cli.log {
        Some(path) => LogEmitter::to_file(path, suite, &cli.run_id)?,
        None => LogEmitter::to_stdout(suite, &cli.run_id),
    };
    let dump_sink = cli
        .dump
        .clone()
        .map_or_else(canarystack::config::default_dump_sink, DumpSink::File);
    let mut runner = StackRunner::new(emitter, dump_sink);

    let result = match cli.command {
        Command::Scenario => runner.scenario().map(|summary| {
            eprintln!(
                "Scenario complete: pushes={}, pops={}, peak_capacity={}",
                summary.pushes, summary.pops, summary.peak_capacity
            );
        }),
        Command::Corrupt { target } => match runner.corrupt(target) {
            Ok(report) => {
                if let Some(err) = &report.observed {
                    eprintln!("Corruption of {} reported: {err}", target.as_str());
                    if err.is_fatal() {
                        abort_after(runner, &err.to_string());
                    }
                }
                if report.applied && target.detectable() && !report.detected() {
                    runner.emitter_mut().flush()?;
                    return Err(format!("corruption of {} went undetected", target.as_str()).into());
                }
                Ok(())
            }
            Err(err) => Err(err),
        },
        Command::Stress { seed, steps } => {
            let seed = parse_seed(&seed)?;
            runner.stress(seed, steps).map(|summary| {
                eprintln!(
                    "Stress complete: seed={seed:#x}, steps={}, peak_capacity={}",
                    summary.steps, summary.peak_capacity
                );
            })
        }
    };

    match result {
        Ok(()) => {
            runner.emitter_mut().flush()?;
            Ok(())
        }
        Err(err) if err.is_fatal() => abort_after(runner, &err.to_string()),
        Err(err) => {
            let entry = runner
                .emitter_mut()
                .entry(LogLevel::Error, "run_failed")
                .with_outcome(Outcome::Fail)
                .with_details(serde_json::json!({ "error": err.to_string() }));
            let entry = match &err {
                HarnessError::Stack(stack_err) => entry.with_error(stack_err),
                _ => entry,
            };
            runner.emitter_mut().emit_entry(entry)?;
            runner.emitter_mut().flush()?;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_parse_in_both_bases() {
        assert_eq!(parse_seed("42"), Ok(42));
        assert_eq!(parse_seed("0xC0FF_EE00"), Ok(0xC0FF_EE00));
        assert_eq!(parse_seed("0X10"), Ok(16));
        assert!(parse_seed("0xZZ").is_err());
    }

    #[test]
    fn cli_parses_corrupt_target() {
        let cli = Cli::try_parse_from(["harness", "corrupt", "--target", "buffer-trailing"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Corrupt {
                target: CorruptTarget::BufferTrailing
            }
        ));
    }
}
