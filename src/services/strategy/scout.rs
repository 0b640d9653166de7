// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::SharedClock;
use crate::common::error::AppError;
use crate::domain::constants::BTC_SYMBOL;
use crate::domain::models::{
    NewCoinValue, Pair, PairId, ScoutLogEntry, Side, TickerSnapshot, TradeState, market_symbol,
};
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::venue::{AccountSource, PriceSource};
use crate::services::precision::PrecisionResolver;
use crate::services::strategy::executor::TradeExecutor;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoutConfig {
    pub reserve: String,
    /// Configured asset order; breaks ties between equally good candidates.
    pub supported: Vec<String>,
    pub scout_margin: f64,
    pub initial_coin: Option<String>,
}

/// Mutable decision state, owned by the caller and threaded through `tick`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoutState {
    pub fee_rate: f64,
    pub ticks: u64,
    pub rotations: u64,
    pub last_outcome: Option<TickOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Busy,
    TickersUnavailable,
    PriceUnavailable,
    InsufficientFunds,
    NoBaseline,
    BootstrapIncomplete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Bootstrapped { symbol: String },
    Held { compared: usize, lowered: usize },
    Rotated { from: String, to: String },
    RotationIncomplete { from: String, to: String, leg: Side },
    BridgeBought { symbol: String },
    Error(String),
}

/// One pair compared against its stored reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub pair_id: PairId,
    pub to_symbol: String,
    pub from_price: f64,
    pub to_price: f64,
    pub raw: f64,
    pub live: f64,
    pub threshold: f64,
}

impl Evaluation {
    pub fn is_eligible(&self) -> bool {
        self.live > self.threshold
    }

    /// Fractional excess of the fee-adjusted ratio over its threshold.
    pub fn excess(&self) -> f64 {
        (self.live - self.threshold) / self.threshold
    }
}

/// `raw = to / from`; the live ratio pays the taker fee on both legs.
pub fn evaluate(
    pair_id: PairId,
    to_symbol: &str,
    stored_ratio: f64,
    from_price: f64,
    to_price: f64,
    scout_margin: f64,
    fee_rate: f64,
) -> Evaluation {
    let raw = to_price / from_price;
    Evaluation {
        pair_id,
        to_symbol: to_symbol.to_string(),
        from_price,
        to_price,
        raw,
        live: raw * (1.0 - fee_rate) * (1.0 - fee_rate),
        threshold: stored_ratio * (1.0 + scout_margin / 100.0),
    }
}

/// Greatest excess wins; the earliest entry wins a tie.
pub fn pick_winner(evaluations: &[Evaluation]) -> Option<&Evaluation> {
    let mut best: Option<&Evaluation> = None;
    for eval in evaluations.iter().filter(|e| e.is_eligible()) {
        match best {
            Some(current) if eval.excess() <= current.excess() => {}
            _ => best = Some(eval),
        }
    }
    best
}

pub struct ScoutEngine {
    db: Database,
    prices: Arc<dyn PriceSource>,
    account: Arc<dyn AccountSource>,
    precision: Arc<PrecisionResolver>,
    executor: Arc<dyn TradeExecutor>,
    clock: SharedClock,
    config: ScoutConfig,
}

impl ScoutEngine {
    pub fn new(
        db: Database,
        prices: Arc<dyn PriceSource>,
        account: Arc<dyn AccountSource>,
        precision: Arc<PrecisionResolver>,
        executor: Arc<dyn TradeExecutor>,
        clock: SharedClock,
        config: ScoutConfig,
    ) -> Self {
        Self {
            db,
            prices,
            account,
            precision,
            executor,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    fn order_index(&self, symbol: &str) -> usize {
        self.config
            .supported
            .iter()
            .position(|s| s == symbol)
            .unwrap_or(usize::MAX)
    }

    fn reserve(&self) -> &str {
        &self.config.reserve
    }

    /// Synchronise assets and pairs, seed unobserved ratios and read the fee.
    pub async fn initialize(&self, state: &mut ScoutState) -> Result<(), AppError> {
        self.db
            .set_coins(self.reserve(), &self.config.supported)
            .await?;
        state.fee_rate = self.account.taker_fee().await?;

        match self.prices.all_ticker_prices().await {
            Ok(tickers) => {
                let seeded = self.initialize_thresholds(&tickers).await?;
                tracing::info!(target: "scout", seeded, "Initial ratios seeded");
            }
            Err(e) => tracing::warn!(
                target: "scout",
                error = %e,
                "Ticker snapshot unavailable; ratios will be seeded on first observation"
            ),
        }
        Ok(())
    }

    async fn initialize_thresholds(&self, tickers: &TickerSnapshot) -> Result<usize, AppError> {
        let mut seeded = 0;
        for pair in self.db.pairs().await? {
            if !pair.enabled || pair.ratio.is_some() {
                continue;
            }
            if let Some(raw) = self.raw_ratio(&pair, tickers)
                && self.db.seed_pair_ratio(pair.id, raw).await?
            {
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    fn raw_ratio(&self, pair: &Pair, tickers: &TickerSnapshot) -> Option<f64> {
        let from = tickers.pair_price(&pair.from_symbol, self.reserve())?;
        let to = tickers.pair_price(&pair.to_symbol, self.reserve())?;
        Some(to / from)
    }

    /// One decision cycle. Errors are logged and folded into the outcome.
    pub async fn tick(&self, state: &mut ScoutState) -> TickOutcome {
        let started = Instant::now();
        state.ticks += 1;
        let outcome = match self.try_tick(state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(target: "scout", error = %e, "Scout tick failed");
                TickOutcome::Error(e.to_string())
            }
        };
        if matches!(
            outcome,
            TickOutcome::Rotated { .. } | TickOutcome::BridgeBought { .. }
        ) {
            state.rotations += 1;
        }
        tracing::debug!(
            target: "scout",
            tick = state.ticks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "Scout tick finished"
        );
        state.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn try_tick(&self, state: &ScoutState) -> Result<TickOutcome, AppError> {
        let tickers = match self.prices.all_ticker_prices().await {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => return Ok(TickOutcome::Skipped(SkipReason::TickersUnavailable)),
            Err(e) => {
                tracing::warn!(target: "scout", error = %e, "Ticker snapshot unavailable");
                return Ok(TickOutcome::Skipped(SkipReason::TickersUnavailable));
            }
        };

        let Some(holding) = self.db.current_holding().await? else {
            return self.bootstrap(&tickers).await;
        };
        let held = holding.symbol;

        if held == self.reserve() {
            return self.scout_from_reserve(state, &tickers).await;
        }

        let Some(from_price) = tickers.pair_price(&held, self.reserve()) else {
            tracing::debug!(target: "scout", asset = %held, "No price for held asset");
            return Ok(TickOutcome::Skipped(SkipReason::PriceUnavailable));
        };

        let market = market_symbol(&held, self.reserve());
        let held_value = self.account.balance(&held).await? * from_price;
        let min_notional = self.precision.rules(&market).await?.min_notional;
        if held_value < min_notional {
            return self.bridge_scout(state, &held, &tickers).await;
        }

        let evaluations = self.compare(state, &held, from_price, &tickers).await?;
        match pick_winner(&evaluations) {
            Some(winner) => {
                tracing::info!(
                    target: "scout",
                    from = %held,
                    to = %winner.to_symbol,
                    live = winner.live,
                    threshold = winner.threshold,
                    excess_pct = winner.excess() * 100.0,
                    "Rotation candidate found"
                );
                let to = winner.to_symbol.clone();
                self.rotate(&held, &to, &tickers).await
            }
            None => self.ratchet(&evaluations).await,
        }
    }

    /// No winner: move each compared reference down to its raw ratio.
    async fn ratchet(&self, evaluations: &[Evaluation]) -> Result<TickOutcome, AppError> {
        let mut lowered = 0;
        for eval in evaluations {
            if self.db.lower_pair_ratio(eval.pair_id, eval.raw).await? {
                lowered += 1;
            }
        }
        Ok(TickOutcome::Held {
            compared: evaluations.len(),
            lowered,
        })
    }

    /// Compare every enabled pair leaving `from` and log each comparison.
    /// Pairs never observed before are seeded instead of compared.
    async fn compare(
        &self,
        state: &ScoutState,
        from: &str,
        from_price: f64,
        tickers: &TickerSnapshot,
    ) -> Result<Vec<Evaluation>, AppError> {
        let mut pairs = self.db.pairs_from(from).await?;
        pairs.sort_by_key(|p| self.order_index(&p.to_symbol));

        let now = self.clock.now();
        let mut evaluations = Vec::with_capacity(pairs.len());
        let mut log = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let Some(to_price) = tickers.pair_price(&pair.to_symbol, self.reserve()) else {
                continue;
            };
            let Some(stored) = pair.ratio else {
                self.db.seed_pair_ratio(pair.id, to_price / from_price).await?;
                continue;
            };
            let eval = evaluate(
                pair.id,
                &pair.to_symbol,
                stored,
                from_price,
                to_price,
                self.config.scout_margin,
                state.fee_rate,
            );
            log.push(ScoutLogEntry {
                pair_id: pair.id,
                target_ratio: eval.threshold,
                current_coin_price: from_price,
                other_coin_price: to_price,
                timestamp: now,
            });
            evaluations.push(eval);
        }
        self.db.log_scouts(&log).await?;
        Ok(evaluations)
    }

    async fn rotate(
        &self,
        from: &str,
        to: &str,
        tickers: &TickerSnapshot,
    ) -> Result<TickOutcome, AppError> {
        if from != self.reserve() {
            let sell = self
                .executor
                .execute(Side::Sell, from, self.reserve(), tickers)
                .await?;
            if sell.state != TradeState::Complete {
                tracing::warn!(target: "scout", from, to, state = sell.state.as_str(), "Sell leg did not complete");
                return Ok(TickOutcome::RotationIncomplete {
                    from: from.to_string(),
                    to: to.to_string(),
                    leg: Side::Sell,
                });
            }
        }

        let bought = match self
            .executor
            .execute(Side::Buy, to, self.reserve(), tickers)
            .await
        {
            Ok(trade) => trade.state == TradeState::Complete,
            Err(e) => {
                tracing::warn!(target: "scout", from, to, error = %e, "Buy leg rejected");
                false
            }
        };
        if !bought {
            return Ok(TickOutcome::RotationIncomplete {
                from: from.to_string(),
                to: to.to_string(),
                leg: Side::Buy,
            });
        }

        self.db.set_current_holding(to, self.clock.now()).await?;
        self.reseed_from(to, tickers).await?;
        tracing::info!(target: "scout", from, to, "Rotation complete");
        Ok(TickOutcome::Rotated {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Reset the outgoing references of a freshly bought asset.
    async fn reseed_from(&self, symbol: &str, tickers: &TickerSnapshot) -> Result<(), AppError> {
        for pair in self.db.pairs_from(symbol).await? {
            if let Some(raw) = self.raw_ratio(&pair, tickers) {
                self.db.set_pair_ratio(pair.id, raw).await?;
            }
        }
        Ok(())
    }

    fn initial_coin(&self) -> Option<&str> {
        self.config
            .initial_coin
            .as_deref()
            .or_else(|| self.config.supported.first().map(String::as_str))
    }

    async fn bootstrap(&self, tickers: &TickerSnapshot) -> Result<TickOutcome, AppError> {
        let Some(symbol) = self.initial_coin().map(str::to_string) else {
            return Ok(TickOutcome::Skipped(SkipReason::NoBaseline));
        };
        let market = market_symbol(&symbol, self.reserve());
        let Some(price) = tickers.price(&market) else {
            return Ok(TickOutcome::Skipped(SkipReason::PriceUnavailable));
        };

        let held_value = self.account.balance(&symbol).await? * price;
        let min_notional = self.precision.rules(&market).await?.min_notional;
        if held_value <= 0.0 || held_value < min_notional {
            tracing::info!(target: "scout", asset = %symbol, "No holding yet; buying initial asset");
            let trade = match self
                .executor
                .execute(Side::Buy, &symbol, self.reserve(), tickers)
                .await
            {
                Ok(trade) => trade,
                Err(AppError::OrderTooSmall { .. }) => {
                    return Ok(TickOutcome::Skipped(SkipReason::InsufficientFunds));
                }
                Err(e) => return Err(e),
            };
            if trade.state != TradeState::Complete {
                return Ok(TickOutcome::Skipped(SkipReason::BootstrapIncomplete));
            }
        }

        self.db.set_current_holding(&symbol, self.clock.now()).await?;
        for pair in self.db.pairs_from(&symbol).await? {
            if let Some(raw) = self.raw_ratio(&pair, tickers) {
                self.db.seed_pair_ratio(pair.id, raw).await?;
            }
        }
        Ok(TickOutcome::Bootstrapped { symbol })
    }

    /// Holding names the reserve: compare from the asset of the last completed
    /// sell at its realised price.
    async fn scout_from_reserve(
        &self,
        state: &ScoutState,
        tickers: &TickerSnapshot,
    ) -> Result<TickOutcome, AppError> {
        let Some(last_sell) = self.db.last_completed_sell().await? else {
            return Ok(TickOutcome::Skipped(SkipReason::NoBaseline));
        };
        let Some(baseline_price) = last_sell.price.filter(|p| *p > 0.0) else {
            return Ok(TickOutcome::Skipped(SkipReason::NoBaseline));
        };
        let evaluations = self
            .compare(state, &last_sell.alt_symbol, baseline_price, tickers)
            .await?;
        match pick_winner(&evaluations) {
            Some(winner) => {
                let to = winner.to_symbol.clone();
                self.rotate(self.reserve(), &to, tickers).await
            }
            None => self.ratchet(&evaluations).await,
        }
    }

    /// The held balance is too small to trade. If the reserve can fund a
    /// buy, enter the first asset (configured order) that has no better
    /// target right now.
    async fn bridge_scout(
        &self,
        state: &ScoutState,
        held: &str,
        tickers: &TickerSnapshot,
    ) -> Result<TickOutcome, AppError> {
        let reserve_balance = self.account.balance(self.reserve()).await?;
        for candidate in &self.config.supported {
            let market = market_symbol(candidate, self.reserve());
            let Some(price) = tickers.price(&market) else {
                continue;
            };
            let min_notional = self.precision.rules(&market).await?.min_notional;
            if reserve_balance <= 0.0 || reserve_balance < min_notional {
                continue;
            }

            let mut pairs = self.db.pairs_from(candidate).await?;
            pairs.sort_by_key(|p| self.order_index(&p.to_symbol));
            let any_better = pairs.iter().any(|pair| {
                let (Some(stored), Some(to_price)) =
                    (pair.ratio, tickers.pair_price(&pair.to_symbol, self.reserve()))
                else {
                    return false;
                };
                evaluate(
                    pair.id,
                    &pair.to_symbol,
                    stored,
                    price,
                    to_price,
                    self.config.scout_margin,
                    state.fee_rate,
                )
                .is_eligible()
            });
            if any_better {
                continue;
            }

            tracing::info!(target: "scout", held, candidate = %candidate, "Bridge scout buying from reserve");
            return match self.rotate(self.reserve(), candidate, tickers).await? {
                TickOutcome::Rotated { to, .. } => Ok(TickOutcome::BridgeBought { symbol: to }),
                other => Ok(other),
            };
        }
        tracing::debug!(target: "scout", asset = %held, "Insufficient funds; waiting");
        Ok(TickOutcome::Skipped(SkipReason::InsufficientFunds))
    }

    /// Record a MINUTELY value snapshot for every asset with a balance.
    pub async fn update_values(&self) -> Result<usize, AppError> {
        let tickers = self.prices.all_ticker_prices().await?;
        let balances = self.account.balances().await?;
        let btc_price = tickers.pair_price(BTC_SYMBOL, self.reserve());
        let now = self.clock.now();

        let mut values: Vec<NewCoinValue> = balances
            .into_iter()
            .filter(|(_, balance)| *balance > 0.0)
            .map(|(symbol, balance)| {
                let reserve_value = if symbol == self.reserve() {
                    Some(balance)
                } else {
                    tickers
                        .pair_price(&symbol, self.reserve())
                        .map(|p| p * balance)
                };
                let btc_value = reserve_value.zip(btc_price).map(|(v, btc)| v / btc);
                NewCoinValue {
                    symbol,
                    balance,
                    btc_value,
                    reserve_value,
                    timestamp: now,
                }
            })
            .collect();
        values.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        self.db.insert_coin_values(&values).await?;
        Ok(values.len())
    }

    /// Re-resolve trading rules for every supported market; returns the
    /// current taker fee.
    pub async fn warmup(&self) -> Result<f64, AppError> {
        let markets: Vec<String> = self
            .config
            .supported
            .iter()
            .map(|s| market_symbol(s, self.reserve()))
            .collect();
        let resolved = self.precision.warmup(&markets).await;
        tracing::debug!(target: "scout", resolved, total = markets.len(), "Trading rules warmed");
        self.account.taker_fee().await
    }
}
