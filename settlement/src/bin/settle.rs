//! Settlement cycle runner
//!
//! Loads a JSON array of transactions into an in-memory store, runs one
//! settlement cycle over it and prints the response as JSON.

use anyhow::Context;
use clap::Parser;
use netting_core::Transaction;
use rust_decimal::Decimal;
use settlement::{
    Actor, Config, ErrorResponse, ProcessSettlementRequest, Role, SettlementEngine,
};
use std::path::PathBuf;

/// Run one multilateral netting settlement cycle
#[derive(Parser, Debug)]
#[command(name = "settle")]
#[command(version, about, long_about = None)]
struct Args {
    /// Transactions file (JSON array)
    #[arg(value_name = "FILE")]
    transactions: PathBuf,

    /// Preview without persisting
    #[arg(long)]
    simulate: bool,

    /// Configuration file path (TOML format)
    #[arg(short, long, value_name = "FILE", env = "SETTLEMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Quoted OTC spread as a fraction (0.005 = 0.5%)
    #[arg(long)]
    otc_spread: Option<Decimal>,

    /// Operator identity recorded in logs
    #[arg(long, default_value = "cli")]
    user: String,

    /// Emit logs as JSON
    #[arg(long, env = "SETTLEMENT_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    // stdout carries the response body
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    let raw = std::fs::read_to_string(&args.transactions)
        .with_context(|| format!("reading {}", args.transactions.display()))?;
    let transactions: Vec<Transaction> =
        serde_json::from_str(&raw).context("parsing transactions")?;

    let network = config.default_network.clone();
    let (engine, store) = SettlementEngine::in_memory(config)?;
    for tx in transactions {
        store.insert_transaction(&network, tx).await;
    }

    tracing::info!(
        network = %network,
        simulation = args.simulate,
        user = %args.user,
        "Running settlement"
    );

    let request = ProcessSettlementRequest {
        simulation: args.simulate,
        network: None,
        otc_spread: args.otc_spread,
    };
    let actor = Actor::new(args.user, Role::Operator);

    match engine.process_settlement(Some(&actor), &request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&err))?);
            anyhow::bail!("settlement failed with status {}: {}", err.status_code(), err)
        }
    }
}
