use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use swarm_agents::{DebateCoordinator, PaperExecutionSink, StaticMarketIntel};
use swarm_models::{DebateStatus, DecisionRequest, TriggerContext};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "swarm", about = "Multi-agent deliberation and weighted-consensus decisions")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/swarm.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Debate a trigger read as JSON from a file or stdin and print the full trace
    Debate {
        /// Read TriggerContext JSON from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Paper-execute actionable decisions at or above this confidence
        #[arg(long)]
        execute_above: Option<Decimal>,
    },
    /// Snapshot the market for a symbol, debate it and print the decision
    Decide {
        #[arg(long)]
        symbol: String,

        /// JSON file of market snapshots keyed by symbol
        #[arg(long)]
        market: String,

        #[arg(long)]
        balance: Option<Decimal>,

        #[arg(long)]
        requester: Option<String>,

        /// Paper-execute actionable decisions at or above this confidence
        #[arg(long)]
        execute_above: Option<Decimal>,
    },
    /// Print the full trace of one debate
    Show { debate_id: Uuid },
    /// List recent debates, newest first
    List {
        #[arg(long)]
        status: Option<DebateStatus>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Debate and decision counters
    Stats,
    /// Recent decisions, resolved outcomes, patterns and learnings
    Memory {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Mark a decision as executed (or not, with --undo)
    Executed {
        decision_id: Uuid,

        #[arg(long)]
        undo: bool,
    },
    /// Record the realized price change for a decision
    Resolve {
        decision_id: Uuid,

        /// Realized change in percent, e.g. -2.4
        #[arg(long, allow_hyphen_values = true)]
        change_pct: Decimal,

        #[arg(long)]
        note: Option<String>,
    },
    /// Finalize debates a previous run left in progress
    Recover,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

fn read_trigger(input: Option<&str>) -> Result<TriggerContext> {
    let trigger_json = if let Some(input_path) = input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    serde_json::from_str(&trigger_json).context("Failed to parse TriggerContext JSON")
}

fn with_execution(coordinator: DebateCoordinator, execute_above: Option<Decimal>) -> DebateCoordinator {
    match execute_above {
        Some(threshold) => {
            coordinator.with_execution_sink(Arc::new(PaperExecutionSink::new(threshold)))
        }
        None => coordinator,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = swarm::load_config(&cli.config)?;
    let coordinator =
        swarm::build_coordinator(&config).context("Failed to build coordinator")?;

    match cli.command {
        Command::Debate {
            input,
            execute_above,
        } => {
            let trigger = read_trigger(input.as_deref())?;
            let record = with_execution(coordinator, execute_above)
                .run_debate(trigger)
                .await
                .context("Debate failed")?;
            print_json(&record, cli.pretty)
        }
        Command::Decide {
            symbol,
            market,
            balance,
            requester,
            execute_above,
        } => {
            let intel = StaticMarketIntel::from_json_file(&market)
                .context("Failed to load market snapshots")?;
            let decision = with_execution(coordinator, execute_above)
                .with_market_intel(Arc::new(intel))
                .decide(DecisionRequest {
                    symbol,
                    requester_id: requester,
                    account_balance: balance,
                })
                .await
                .context("Decision failed")?;
            print_json(&decision, cli.pretty)
        }
        Command::Show { debate_id } => {
            let record = coordinator
                .get_debate(debate_id)
                .await?
                .with_context(|| format!("No debate {debate_id}"))?;
            print_json(&record, cli.pretty)
        }
        Command::List { status, limit } => {
            print_json(&coordinator.list_debates(status, limit)?, cli.pretty)
        }
        Command::Stats => print_json(&coordinator.stats()?, cli.pretty),
        Command::Memory { limit } => print_json(&coordinator.memory_snapshot(limit)?, cli.pretty),
        Command::Executed { decision_id, undo } => {
            let decision = coordinator.report_execution(decision_id, !undo).await?;
            print_json(&decision, cli.pretty)
        }
        Command::Resolve {
            decision_id,
            change_pct,
            note,
        } => {
            let report = coordinator
                .record_outcome(decision_id, change_pct, note)
                .await?
                .with_context(|| format!("Outcome already recorded for {decision_id}"))?;
            print_json(&report, cli.pretty)
        }
        Command::Recover => print_json(&coordinator.recover().await?, cli.pretty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_resolve_with_negative_change() {
        let cli = Cli::parse_from([
            "swarm",
            "--pretty",
            "resolve",
            "6f1c2a8e-6a43-4f0e-9d55-0b3c6b1f7a10",
            "--change-pct",
            "-2.4",
            "--note",
            "stopped out",
        ]);
        assert!(cli.pretty);
        match cli.command {
            Command::Resolve {
                change_pct, note, ..
            } => {
                assert_eq!(change_pct, Decimal::new(-24, 1));
                assert_eq!(note.as_deref(), Some("stopped out"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_list_status_filter() {
        let cli = Cli::parse_from(["swarm", "list", "--status", "in_progress", "--limit", "5"]);
        match cli.command {
            Command::List { status, limit } => {
                assert_eq!(status, Some(DebateStatus::InProgress));
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
