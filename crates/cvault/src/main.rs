use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvault::agents::RoundEvent;
use cvault::models::EnvSnapshot;
use cvault::watch::{WatchConfig, Watcher};
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cvault",
    about = "Consensus Vault - polls independent LLM analysts and issues a trading signal only when four agree"
)]
struct Cli {
    /// Path to configuration file (built-in defaults when missing)
    #[arg(short, long, default_value = "config/cvault.toml", global = true)]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one consensus round and print the result
    Analyze {
        /// Asset symbol, e.g. BTC
        #[arg(short, long)]
        asset: String,

        /// Free-text market context passed to every analyst
        #[arg(long)]
        context: Option<String>,

        /// Print each vote as it arrives, then the result
        #[arg(long)]
        stream: bool,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Show analyst resolution, validation errors and statistics
    Analysts {
        #[arg(long)]
        pretty: bool,
    },

    /// Run rounds periodically until Ctrl-C or the round limit
    Watch {
        #[arg(short, long)]
        asset: String,

        #[arg(long)]
        context: Option<String>,

        #[arg(long, default_value_t = 300)]
        interval_seconds: u64,

        /// Stop after this many rounds
        #[arg(long)]
        rounds: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = cvault::load_config(&cli.config)?;
    let engine = cvault::build_engine(&config, EnvSnapshot::from_process())
        .context("Failed to build consensus engine")?;

    match cli.command {
        Command::Analyze {
            asset,
            context,
            stream,
            pretty,
        } => {
            if !stream {
                let result = engine
                    .run_round(&asset, context.as_deref())
                    .await
                    .map_err(|e| anyhow::anyhow!("Round failed: {e}"))?;
                print_json(&result, pretty)?;
                return Ok(());
            }

            let cancel = shutdown_on_ctrl_c();
            let events = engine
                .stream_round(&asset, context.as_deref(), cancel)
                .map_err(|e| anyhow::anyhow!("Round failed: {e}"))?;
            let mut events = Box::pin(events);
            while let Some(event) = events.next().await {
                match event {
                    RoundEvent::Vote(vote) => print_json(&vote, pretty)?,
                    RoundEvent::Consensus { result, summary } => {
                        print_json(&result, pretty)?;
                        print_json(&summary, pretty)?;
                    }
                }
            }
        }

        Command::Analysts { pretty } => {
            print_json(&cvault::analyst_report(&engine), pretty)?;
        }

        Command::Watch {
            asset,
            context,
            interval_seconds,
            rounds,
        } => {
            let watcher = Watcher::new(
                &engine,
                WatchConfig {
                    asset,
                    context,
                    interval: Duration::from_secs(interval_seconds),
                    rounds,
                },
            );
            let cancel = watcher.cancel_token();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
                cancel.cancel();
            });

            let outcome = watcher
                .run(|_, result| {
                    if let Err(e) = print_json(result, false) {
                        tracing::error!(error = %e, "Failed to print round result");
                    }
                })
                .await;

            print_json(&engine.health_summary(), true)?;
            outcome.map_err(|e| anyhow::anyhow!("Watch failed: {e}"))?;
        }
    }

    Ok(())
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        token.cancel();
    });
    cancel
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
