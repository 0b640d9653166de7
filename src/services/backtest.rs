// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::{Clock, SharedClock, VirtualClock};
use crate::common::constants::{BTC_SYMBOL, KLINE_PAGE_LIMIT};
use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::domain::models::{TickerSnapshot, TradeState, market_symbol};
use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::price_cache::PriceCache;
use crate::infrastructure::network::paper::PaperVenue;
use crate::infrastructure::network::venue::{AccountSource, MarketRules, PriceSource};
use crate::services::precision::PrecisionResolver;
use crate::services::strategy::executor::{ExecutionContext, SimulatedExecutor};
use crate::services::strategy::scout::{ScoutConfig, ScoutEngine};
use crate::services::strategy::{StrategyKind, build_strategy};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const UPSTREAM_ATTEMPTS: usize = 3;

/// Prices "as of" the virtual clock, served from the price cache and filled
/// from `upstream` a page of one-minute klines at a time.
pub struct HistoricalPriceSource {
    upstream: Arc<dyn PriceSource>,
    cache: PriceCache,
    clock: SharedClock,
    markets: Vec<String>,
}

impl HistoricalPriceSource {
    pub fn new(
        upstream: Arc<dyn PriceSource>,
        cache: PriceCache,
        clock: SharedClock,
        markets: Vec<String>,
    ) -> Self {
        Self {
            upstream,
            cache,
            clock,
            markets,
        }
    }

    async fn price_at(&self, symbol: &str, at: DateTime<Utc>) -> Result<f64, AppError> {
        if let Some(price) = self.cache.get(symbol, at).await? {
            return Ok(price);
        }
        let points = retry_async(
            |_| {
                self.upstream
                    .historical_prices(symbol, at, None, KLINE_PAGE_LIMIT)
            },
            UPSTREAM_ATTEMPTS,
            std::time::Duration::from_millis(250),
        )
        .await?;
        tracing::debug!(
            target: "backtest",
            symbol,
            at = %at,
            fetched = points.len(),
            "Price cache miss"
        );
        self.cache.put_many(symbol, &points).await?;
        self.cache
            .get(symbol, at)
            .await?
            .ok_or_else(|| AppError::PriceUnavailable(symbol.to_string()))
    }
}

#[async_trait]
impl PriceSource for HistoricalPriceSource {
    async fn current_price(&self, symbol: &str) -> Result<f64, AppError> {
        self.price_at(symbol, self.clock.now()).await
    }

    async fn all_ticker_prices(&self) -> Result<TickerSnapshot, AppError> {
        let at = self.clock.now();
        let mut tickers = TickerSnapshot::default();
        for market in &self.markets {
            match self.price_at(market, at).await {
                Ok(price) => tickers.insert(market.clone(), price),
                Err(e) => tracing::debug!(target: "backtest", market = %market, error = %e, "No price"),
            }
        }
        Ok(tickers)
    }

    async fn historical_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, AppError> {
        self.upstream.historical_prices(symbol, from, to, limit).await
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub scout: ScoutConfig,
    pub strategy: StrategyKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Virtual minutes per tick.
    pub step_minutes: i64,
    /// Ticks between value samples in the report.
    pub sample_every: u64,
    pub fee_rate: f64,
    pub starting_balances: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValueSample {
    pub time: DateTime<Utc>,
    pub btc_value: Option<f64>,
    pub reserve_value: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BacktestReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ticks: u64,
    pub rotations: u64,
    pub trades_completed: usize,
    pub trades_failed: usize,
    pub starting_reserve_value: f64,
    pub final_reserve_value: f64,
    pub change_pct: f64,
    pub final_balances: HashMap<String, f64>,
    pub samples: Vec<ValueSample>,
}

/// Total portfolio value in the reserve and in BTC.
pub fn collate_values(
    balances: &HashMap<String, f64>,
    tickers: &TickerSnapshot,
    reserve: &str,
    at: DateTime<Utc>,
) -> ValueSample {
    let reserve_value = balances
        .iter()
        .filter(|(_, amount)| **amount > 0.0)
        .map(|(symbol, amount)| {
            if symbol == reserve {
                *amount
            } else {
                tickers
                    .pair_price(symbol, reserve)
                    .map(|p| p * amount)
                    .unwrap_or(0.0)
            }
        })
        .sum::<f64>();
    let btc_value = tickers
        .pair_price(BTC_SYMBOL, reserve)
        .map(|btc| reserve_value / btc);
    ValueSample {
        time: at,
        btc_value,
        reserve_value,
    }
}

/// Replays the live strategy against cached history on a virtual clock.
pub struct BacktestDriver {
    config: BacktestConfig,
}

impl BacktestDriver {
    pub fn new(config: BacktestConfig) -> Result<Self, AppError> {
        if config.end <= config.start {
            return Err(AppError::Validation {
                field: "end".into(),
                message: "backtest end must be after start".into(),
            });
        }
        if config.step_minutes <= 0 {
            return Err(AppError::Validation {
                field: "step_minutes".into(),
                message: "must be positive".into(),
            });
        }
        Ok(Self { config })
    }

    pub async fn run(
        self,
        upstream: Arc<dyn PriceSource>,
        cache: PriceCache,
        rules: Arc<dyn MarketRules>,
    ) -> Result<BacktestReport, AppError> {
        let cfg = self.config;
        let reserve = cfg.scout.reserve.clone();
        let clock = VirtualClock::new(cfg.start);
        let shared_clock: SharedClock = Arc::new(clock.clone());

        let mut markets: Vec<String> = cfg
            .scout
            .supported
            .iter()
            .map(|s| market_symbol(s, &reserve))
            .collect();
        let btc_market = market_symbol(BTC_SYMBOL, &reserve);
        if !markets.contains(&btc_market) && reserve != BTC_SYMBOL {
            markets.push(btc_market);
        }

        let db = Database::new("sqlite::memory:").await?;
        let prices: Arc<dyn PriceSource> = Arc::new(HistoricalPriceSource::new(
            upstream,
            cache,
            shared_clock.clone(),
            markets,
        ));
        let paper = Arc::new(PaperVenue::new(
            reserve.clone(),
            cfg.fee_rate,
            cfg.starting_balances.clone(),
            prices.clone(),
            rules,
            shared_clock.clone(),
        ));
        let precision = Arc::new(PrecisionResolver::new(paper.clone()));
        let executor = Arc::new(SimulatedExecutor::new(ExecutionContext {
            db: db.clone(),
            account: paper.clone(),
            venue: paper.clone(),
            prices: prices.clone(),
            precision: precision.clone(),
            clock: shared_clock.clone(),
        }));
        let engine = Arc::new(ScoutEngine::new(
            db.clone(),
            prices.clone(),
            paper.clone(),
            precision,
            executor,
            shared_clock.clone(),
            cfg.scout.clone(),
        ));
        let strategy = build_strategy(cfg.strategy, engine);
        strategy.initialize().await?;

        tracing::info!(
            target: "backtest",
            start = %cfg.start,
            end = %cfg.end,
            step_minutes = cfg.step_minutes,
            "Backtest started"
        );

        let step = Duration::minutes(cfg.step_minutes);
        let sample_every = cfg.sample_every.max(1);
        let mut samples = Vec::new();
        let mut ticks = 0u64;
        while clock.now() <= cfg.end {
            strategy.tick().await;
            if ticks % sample_every == 0 {
                let tickers = prices.all_ticker_prices().await?;
                let sample = collate_values(&paper.balances().await?, &tickers, &reserve, clock.now());
                tracing::info!(
                    target: "backtest",
                    time = %sample.time,
                    reserve_value = sample.reserve_value,
                    btc_value = ?sample.btc_value,
                    "Portfolio value"
                );
                samples.push(sample);
            }
            ticks += 1;
            clock.advance(step);
        }

        let final_balances = paper.balances().await?;
        clock.set(cfg.end);
        let final_tickers = prices.all_ticker_prices().await?;
        let final_sample = collate_values(&final_balances, &final_tickers, &reserve, cfg.end);
        let starting_reserve_value = samples
            .first()
            .map(|s| s.reserve_value)
            .unwrap_or(final_sample.reserve_value);
        let change_pct = if starting_reserve_value > 0.0 {
            (final_sample.reserve_value - starting_reserve_value) / starting_reserve_value * 100.0
        } else {
            0.0
        };

        let trades = db.trades().await?;
        let state = strategy.state().await;
        strategy.on_shutdown().await;

        Ok(BacktestReport {
            start: cfg.start,
            end: cfg.end,
            ticks,
            rotations: state.rotations,
            trades_completed: trades
                .iter()
                .filter(|t| t.state == TradeState::Complete)
                .count(),
            trades_failed: trades
                .iter()
                .filter(|t| t.state == TradeState::Failed)
                .count(),
            starting_reserve_value,
            final_reserve_value: final_sample.reserve_value,
            change_pct,
            final_balances,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn collate_sums_reserve_and_btc_values() {
        let tickers: TickerSnapshot = [
            ("BTCUSDT".to_string(), 40_000.0),
            ("ETHUSDT".to_string(), 2_000.0),
        ]
        .into_iter()
        .collect();
        let balances = HashMap::from([
            ("USDT".to_string(), 100.0),
            ("ETH".to_string(), 0.5),
            ("DOGE".to_string(), 1_000.0),
        ]);
        let at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let sample = collate_values(&balances, &tickers, "USDT", at);
        // DOGE has no price and contributes nothing
        assert_eq!(sample.reserve_value, 1_100.0);
        assert_eq!(sample.btc_value, Some(1_100.0 / 40_000.0));
    }
}
