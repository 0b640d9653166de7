// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use scoutbot::app::config::Settings;
use scoutbot::app::logging::setup_logging;
use scoutbot::common::parsing::parse_balance_map;
use scoutbot::domain::error::AppError;
use scoutbot::infrastructure::data::price_cache::PriceCache;
use scoutbot::infrastructure::network::binance::BinanceRest;
use scoutbot::services::backtest::{BacktestConfig, BacktestDriver};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay the scout strategy against historical prices")]
struct Cli {
    /// Path to config file (default: ./config.toml when present)
    #[arg(long)]
    config: Option<String>,

    /// Start time, RFC 3339 or YYYY-MM-DD (UTC midnight).
    #[arg(long)]
    start: String,

    /// End time; defaults to now.
    #[arg(long)]
    end: Option<String>,

    /// Virtual minutes advanced per tick.
    #[arg(long, default_value_t = 1)]
    step_minutes: i64,

    /// Ticks between value samples in the report.
    #[arg(long, default_value_t = 60)]
    sample_every: u64,

    /// Starting balances, e.g. "USDT:100". Falls back to paper_balances.
    #[arg(long)]
    balances: Option<String>,

    /// Output path for the JSON report.
    #[arg(long, default_value = "backtest-report.json")]
    out: PathBuf,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::Config(format!("invalid timestamp {raw:?}")))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = Settings::load_with_path(cli.config.as_deref())?;
    setup_logging(settings.log_level(), settings.log_json);
    settings.validate()?;

    let start = parse_time(&cli.start)?;
    let end = match cli.end.as_deref() {
        Some(raw) => parse_time(raw)?,
        None => Utc::now(),
    };
    let starting_balances: HashMap<String, f64> = match cli.balances.as_deref() {
        Some(raw) => parse_balance_map(raw).map_err(AppError::Config)?,
        None if !settings.paper_balances.is_empty() => settings.paper_balances.clone(),
        None => HashMap::from([(settings.reserve.clone(), 100.0)]),
    };

    let driver = BacktestDriver::new(BacktestConfig {
        scout: settings.scout_config(),
        strategy: settings.strategy_kind()?,
        start,
        end,
        step_minutes: cli.step_minutes,
        sample_every: cli.sample_every,
        fee_rate: settings.fee_rate,
        starting_balances,
    })?;

    let cache = PriceCache::open(&settings.price_cache_url()).await?;
    let market = Arc::new(BinanceRest::new(&settings.api_base_url)?);
    let report = driver.run(market.clone(), cache, market).await?;

    let json_out = serde_json::to_string_pretty(&report)
        .map_err(|e| AppError::Initialization(format!("Backtest report encode failed: {e}")))?;
    std::fs::write(&cli.out, json_out)
        .map_err(|e| AppError::Initialization(format!("Backtest report write failed: {e}")))?;

    println!(
        "Backtest completed: range=[{}..{}] ticks={} rotations={} report={}",
        report.start,
        report.end,
        report.ticks,
        report.rotations,
        cli.out.display()
    );
    println!(
        "Value {:.2} -> {:.2} {} ({:+.2}%), trades completed={} failed={}",
        report.starting_reserve_value,
        report.final_reserve_value,
        settings.reserve,
        report.change_pct,
        report.trades_completed,
        report.trades_failed
    );
    Ok(())
}
