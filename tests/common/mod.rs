// SPDX-License-Identifier: MIT
// Shared fakes for the integration tests: a settable price source and a
// paper-trading harness on an in-memory database.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use scoutbot::common::clock::{SharedClock, VirtualClock};
use scoutbot::common::retry::RetryPolicy;
use scoutbot::domain::error::AppError;
use scoutbot::domain::models::TickerSnapshot;
use scoutbot::infrastructure::data::db::Database;
use scoutbot::infrastructure::network::paper::PaperVenue;
use scoutbot::infrastructure::network::venue::{FixedRules, OrderVenue, PriceSource};
use scoutbot::services::precision::PrecisionResolver;
use scoutbot::services::strategy::executor::{ExecutionContext, OrderExecutor, OrderTimeouts};
use scoutbot::services::strategy::scout::{ScoutConfig, ScoutEngine};
use scoutbot::services::strategy::{Strategy, StrategyKind, build_strategy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const FEE: f64 = 0.00075;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
}

#[derive(Default)]
pub struct MockPrices {
    prices: Mutex<HashMap<String, f64>>,
}

impl MockPrices {
    pub fn with(prices: &[(&str, f64)]) -> Arc<Self> {
        let fake = Self::default();
        for (symbol, price) in prices {
            fake.set(symbol, *price);
        }
        Arc::new(fake)
    }

    pub fn set(&self, symbol: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    pub fn snapshot(&self) -> TickerSnapshot {
        self.prices
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

#[async_trait]
impl PriceSource for MockPrices {
    async fn current_price(&self, symbol: &str) -> Result<f64, AppError> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| AppError::PriceUnavailable(symbol.to_string()))
    }

    async fn all_ticker_prices(&self) -> Result<TickerSnapshot, AppError> {
        Ok(self.snapshot())
    }

    async fn historical_prices(
        &self,
        _symbol: &str,
        _from: DateTime<Utc>,
        _to: Option<DateTime<Utc>>,
        _limit: u32,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, AppError> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub db: Database,
    pub prices: Arc<MockPrices>,
    pub paper: Arc<PaperVenue>,
    pub clock: VirtualClock,
    pub engine: Arc<ScoutEngine>,
    pub strategy: Arc<dyn Strategy>,
}

/// Paper venue, live order executor and default strategy over `coins`
/// with USDT as the reserve.
pub async fn harness(
    coins: &[&str],
    prices: Arc<MockPrices>,
    balances: &[(&str, f64)],
    scout_margin: f64,
) -> Harness {
    harness_with(coins, prices, balances, scout_margin, |paper| -> Arc<dyn OrderVenue> {
        paper
    })
    .await
}

/// Like [`harness`], but orders go through whatever `wrap` builds around the
/// paper venue.
pub async fn harness_with(
    coins: &[&str],
    prices: Arc<MockPrices>,
    balances: &[(&str, f64)],
    scout_margin: f64,
    wrap: impl FnOnce(Arc<PaperVenue>) -> Arc<dyn OrderVenue>,
) -> Harness {
    let db = Database::new("sqlite::memory:").await.expect("db");
    let clock = VirtualClock::new(t0());
    let shared_clock: SharedClock = Arc::new(clock.clone());
    let balances: HashMap<String, f64> = balances
        .iter()
        .map(|(s, v)| (s.to_string(), *v))
        .collect();
    let paper = Arc::new(PaperVenue::new(
        "USDT",
        FEE,
        balances,
        prices.clone(),
        Arc::new(FixedRules::default()),
        shared_clock.clone(),
    ));
    let precision = Arc::new(PrecisionResolver::new(paper.clone()));
    let executor = Arc::new(OrderExecutor::new(
        ExecutionContext {
            db: db.clone(),
            account: paper.clone(),
            venue: wrap(paper.clone()),
            prices: prices.clone(),
            precision: precision.clone(),
            clock: shared_clock.clone(),
        },
        OrderTimeouts::from_minutes(0, 0),
        RetryPolicy::none(),
        Duration::from_millis(1),
        CancellationToken::new(),
    ));
    let engine = Arc::new(ScoutEngine::new(
        db.clone(),
        prices.clone(),
        paper.clone(),
        precision,
        executor,
        shared_clock,
        ScoutConfig {
            reserve: "USDT".into(),
            supported: coins.iter().map(|c| c.to_string()).collect(),
            scout_margin,
            initial_coin: None,
        },
    ));
    let strategy = build_strategy(StrategyKind::Default, engine.clone());
    strategy.initialize().await.expect("initialize");
    Harness {
        db,
        prices,
        paper,
        clock,
        engine,
        strategy,
    }
}
