// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::Parser;
use scoutbot::app::config::Settings;
use scoutbot::app::logging::setup_logging;
use scoutbot::common::clock::{SharedClock, SystemClock};
use scoutbot::common::parsing::{parse_balance_map, parse_symbol_list};
use scoutbot::domain::error::AppError;
use scoutbot::infrastructure::data::db::Database;
use scoutbot::infrastructure::network::binance::BinanceRest;
use scoutbot::infrastructure::network::paper::PaperVenue;
use scoutbot::services::compactor::HistoryCompactor;
use scoutbot::services::precision::PrecisionResolver;
use scoutbot::services::scheduler::{Cadence, Scheduler};
use scoutbot::services::strategy::build_strategy;
use scoutbot::services::strategy::executor::{ExecutionContext, OrderExecutor};
use scoutbot::services::strategy::scout::ScoutEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "scoutbot bridge-rotation agent")]
struct Cli {
    /// Path to config file (default: ./config.toml when present)
    #[arg(long)]
    config: Option<String>,

    /// Reserve (bridge) asset symbol
    #[arg(long)]
    reserve: Option<String>,

    /// Supported assets, space or comma separated
    #[arg(long)]
    coins: Option<String>,

    /// Scout margin in percent
    #[arg(long)]
    scout_margin: Option<f64>,

    /// Starting paper balances, e.g. "USDT:100"
    #[arg(long)]
    paper_balances: Option<String>,

    /// SQLite URL (overrides config/env)
    #[arg(long)]
    database_url: Option<String>,

    #[arg(long, default_value_t = false)]
    debug: bool,

    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) -> Result<(), AppError> {
        if let Some(reserve) = &self.reserve {
            settings.reserve = reserve.trim().to_ascii_uppercase();
        }
        if let Some(coins) = &self.coins {
            settings.supported_coins = parse_symbol_list(coins);
        }
        if let Some(margin) = self.scout_margin {
            settings.scout_margin = margin;
        }
        if let Some(raw) = &self.paper_balances {
            settings.paper_balances = parse_balance_map(raw).map_err(AppError::Config)?;
        }
        if let Some(url) = &self.database_url {
            settings.database_url = Some(url.clone());
        }
        settings.debug |= self.debug;
        settings.log_json |= self.log_json;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let mut settings = Settings::load_with_path(cli.config.as_deref())?;
    cli.apply(&mut settings)?;
    setup_logging(settings.log_level(), settings.log_json);
    settings.validate()?;

    let database_url = settings.database_url();
    let db = Database::new(&database_url).await?;
    tracing::info!(
        target: "config",
        reserve = %settings.reserve,
        coins = settings.supported_coins.len(),
        scout_margin = settings.scout_margin,
        scout_secs = settings.scout_sleep_secs,
        database = %database_url,
        "Configuration loaded"
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let market = Arc::new(BinanceRest::new(&settings.api_base_url)?);
    if settings.paper_balances.is_empty() {
        tracing::warn!(target: "config", "paper_balances is empty; nothing to trade");
    }
    let paper = Arc::new(PaperVenue::new(
        settings.reserve.clone(),
        settings.fee_rate,
        settings.paper_balances.clone(),
        market.clone(),
        market.clone(),
        clock.clone(),
    ));
    let precision = Arc::new(PrecisionResolver::new(paper.clone()));

    let shutdown = CancellationToken::new();
    let executor = Arc::new(OrderExecutor::new(
        ExecutionContext {
            db: db.clone(),
            account: paper.clone(),
            venue: paper.clone(),
            prices: market.clone(),
            precision: precision.clone(),
            clock: clock.clone(),
        },
        settings.order_timeouts(),
        settings.retry_policy(),
        settings.order_poll_interval(),
        shutdown.clone(),
    ));
    let engine = Arc::new(ScoutEngine::new(
        db.clone(),
        market.clone(),
        paper.clone(),
        precision,
        executor,
        clock.clone(),
        settings.scout_config(),
    ));
    let strategy = build_strategy(settings.strategy_kind()?, engine.clone());
    strategy.initialize().await?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "scheduler", error = %e, "Failed to listen for ctrl-c");
            return;
        }
        tracing::info!(target: "scheduler", "Shutdown requested");
        signal_token.cancel();
    });

    let compactor = HistoryCompactor::new(db, clock, settings.scout_history_hours);
    Scheduler::new(
        strategy,
        engine,
        compactor,
        Cadence::with_scout_secs(settings.scout_sleep_secs),
        shutdown,
    )
    .run()
    .await
}
