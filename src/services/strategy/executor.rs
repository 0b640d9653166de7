// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::SharedClock;
use crate::common::error::AppError;
use crate::common::retry::RetryPolicy;
use crate::domain::models::{
    OrderReport, OrderStatus, Side, TickerSnapshot, Trade, TradeId, TradeState, market_symbol,
};
use crate::infrastructure::data::db::{Database, TradeUpdate};
use crate::infrastructure::network::venue::{AccountSource, OrderVenue, PriceSource};
use crate::services::precision::PrecisionResolver;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns a trading decision into a terminal [`Trade`].
///
/// `Ok` always carries a trade in COMPLETE, CANCELED or FAILED. `Err` means
/// no trade was recorded (`OrderTooSmall`, missing price, unreadable balances).
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(
        &self,
        side: Side,
        alt: &str,
        reserve: &str,
        tickers: &TickerSnapshot,
    ) -> Result<Trade, AppError>;
}

/// Collaborators shared by every executor flavour.
#[derive(Clone)]
pub struct ExecutionContext {
    pub db: Database,
    pub account: Arc<dyn AccountSource>,
    pub venue: Arc<dyn OrderVenue>,
    pub prices: Arc<dyn PriceSource>,
    pub precision: Arc<PrecisionResolver>,
    pub clock: SharedClock,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderPlan {
    alt: String,
    symbol: String,
    side: Side,
    quantity: f64,
    price: f64,
    alt_balance: f64,
    reserve_balance: f64,
}

#[derive(Debug)]
enum Outcome {
    Filled(OrderReport),
    Canceled(OrderReport),
    Failed(String),
}

impl ExecutionContext {
    async fn plan(
        &self,
        side: Side,
        alt: &str,
        reserve: &str,
        tickers: &TickerSnapshot,
    ) -> Result<OrderPlan, AppError> {
        let symbol = market_symbol(alt, reserve);
        let price = tickers
            .price(&symbol)
            .ok_or_else(|| AppError::PriceUnavailable(symbol.clone()))?;
        let alt_balance = self.account.balance(alt).await?;
        let reserve_balance = self.account.balance(reserve).await?;
        let raw_quantity = match side {
            Side::Buy => reserve_balance / price,
            Side::Sell => alt_balance,
        };
        let quantity = self.precision.floor_quantity(&symbol, raw_quantity).await?;
        self.precision
            .check_notional(&symbol, quantity, price)
            .await?;
        Ok(OrderPlan {
            alt: alt.to_string(),
            symbol,
            side,
            quantity,
            price,
            alt_balance,
            reserve_balance,
        })
    }

    async fn mark_ordered(&self, id: TradeId, plan: &OrderPlan) -> Result<Trade, AppError> {
        self.db
            .transition_trade(
                id,
                TradeState::Ordered,
                TradeUpdate {
                    alt_starting_balance: Some(plan.alt_balance),
                    crypto_starting_balance: Some(plan.reserve_balance),
                    alt_trade_amount: Some(plan.quantity),
                    ..TradeUpdate::default()
                },
                self.clock.now(),
            )
            .await
    }

    /// Close the trade. A store failure here leaves the row open while the
    /// venue side is settled, so both ids are logged for reconciliation.
    async fn finish(
        &self,
        id: TradeId,
        plan: &OrderPlan,
        order_id: Option<&str>,
        outcome: Outcome,
    ) -> Result<Trade, AppError> {
        let state = match &outcome {
            Outcome::Filled(_) => TradeState::Complete,
            Outcome::Canceled(_) => TradeState::Canceled,
            Outcome::Failed(_) => TradeState::Failed,
        };
        self.record_outcome(id, plan, outcome).await.inspect_err(|e| {
            tracing::error!(
                target: "executor",
                trade_id = id,
                order_id = order_id.unwrap_or("-"),
                symbol = %plan.symbol,
                state = state.as_str(),
                error = %e,
                "Trade outcome not recorded"
            );
        })
    }

    async fn record_outcome(
        &self,
        id: TradeId,
        plan: &OrderPlan,
        outcome: Outcome,
    ) -> Result<Trade, AppError> {
        let now = self.clock.now();
        let trade = match outcome {
            Outcome::Filled(report) => {
                let price = if report.executed_qty > 0.0 {
                    report.cumulative_quote_qty / report.executed_qty
                } else {
                    report.price
                };
                self.db
                    .transition_trade(
                        id,
                        TradeState::Complete,
                        TradeUpdate {
                            crypto_trade_amount: Some(report.cumulative_quote_qty),
                            price: Some(price),
                            ..TradeUpdate::default()
                        },
                        now,
                    )
                    .await?
            }
            Outcome::Canceled(report) => {
                self.db
                    .transition_trade(
                        id,
                        TradeState::Canceled,
                        TradeUpdate {
                            crypto_trade_amount: Some(report.cumulative_quote_qty),
                            ..TradeUpdate::default()
                        },
                        now,
                    )
                    .await?
            }
            Outcome::Failed(reason) => {
                let err = AppError::ExecutionFailed {
                    symbol: plan.symbol.clone(),
                    reason,
                };
                tracing::warn!(target: "executor", trade_id = id, error = %err, "Trade failed");
                self.db
                    .transition_trade(id, TradeState::Failed, TradeUpdate::default(), now)
                    .await?
            }
        };
        tracing::info!(
            target: "executor",
            trade_id = trade.id,
            symbol = %plan.symbol,
            side = %plan.side,
            state = trade.state.as_str(),
            quantity = plan.quantity,
            price = trade.price.unwrap_or(plan.price),
            "Trade finished"
        );
        Ok(trade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTimeouts {
    pub buy: Option<Duration>,
    pub sell: Option<Duration>,
}

impl OrderTimeouts {
    /// Zero minutes disables cancellation for that side.
    pub fn from_minutes(buy_mins: u64, sell_mins: u64) -> Self {
        let to_duration = |mins: u64| (mins > 0).then(|| Duration::minutes(mins as i64));
        Self {
            buy: to_duration(buy_mins),
            sell: to_duration(sell_mins),
        }
    }

    pub fn for_side(&self, side: Side) -> Option<Duration> {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }
}

/// Local cancellation rule for an open order.
///
/// A partially filled BUY past its timeout is kept while the market, net of
/// fee, is still at or below the limit price.
pub fn should_cancel(
    side: Side,
    status: OrderStatus,
    elapsed: Duration,
    timeout: Option<Duration>,
    limit_price: f64,
    current_price: Option<f64>,
    fee_rate: f64,
) -> bool {
    let Some(timeout) = timeout else {
        return false;
    };
    if elapsed < timeout {
        return false;
    }
    match (side, status) {
        (Side::Sell, OrderStatus::New | OrderStatus::PartiallyFilled) => true,
        (Side::Buy, OrderStatus::New) => true,
        (Side::Buy, OrderStatus::PartiallyFilled) => {
            current_price.is_some_and(|p| p * (1.0 - fee_rate) > limit_price)
        }
        _ => false,
    }
}

/// Live executor: limit order, bounded retries, poll until terminal.
pub struct OrderExecutor {
    ctx: ExecutionContext,
    timeouts: OrderTimeouts,
    retry: RetryPolicy,
    poll_interval: std::time::Duration,
    shutdown: CancellationToken,
}

impl OrderExecutor {
    pub fn new(
        ctx: ExecutionContext,
        timeouts: OrderTimeouts,
        retry: RetryPolicy,
        poll_interval: std::time::Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            timeouts,
            retry,
            poll_interval,
            shutdown,
        }
    }

    async fn wait_for_order(&self, plan: &OrderPlan, mut report: OrderReport) -> Outcome {
        let started = self.ctx.clock.now();
        let timeout = self.timeouts.for_side(plan.side);
        // Only a partially filled BUY needs the fee; without it the order stays open.
        let fee_rate = match (plan.side, timeout) {
            (Side::Buy, Some(_)) => match self.retry.run(|_| self.ctx.account.taker_fee()).await {
                Ok(fee) => Some(fee),
                Err(e) => {
                    tracing::warn!(
                        target: "executor",
                        symbol = %plan.symbol,
                        error = %e,
                        "Taker fee unavailable; partial buys will not be cancelled"
                    );
                    None
                }
            },
            _ => None,
        };
        loop {
            match report.status {
                OrderStatus::Filled => return Outcome::Filled(report),
                OrderStatus::Canceled => return Outcome::Canceled(report),
                OrderStatus::New | OrderStatus::PartiallyFilled => {}
            }

            let elapsed = self.ctx.clock.now() - started;
            let timed_out = timeout.is_some_and(|t| elapsed >= t);
            let current_price = match fee_rate {
                Some(_)
                    if timed_out
                        && plan.side == Side::Buy
                        && report.status == OrderStatus::PartiallyFilled =>
                {
                    self.ctx.prices.current_price(&plan.symbol).await.ok()
                }
                _ => None,
            };
            if should_cancel(
                plan.side,
                report.status,
                elapsed,
                timeout,
                report.price,
                current_price,
                fee_rate.unwrap_or_default(),
            ) {
                tracing::info!(
                    target: "executor",
                    order_id = %report.handle.order_id,
                    status = ?report.status,
                    elapsed_secs = elapsed.num_seconds(),
                    "Order timed out; cancelling"
                );
                return self.cancel_order(plan, report).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!(
                        target: "executor",
                        order_id = %report.handle.order_id,
                        "Shutdown while waiting on order; cancelling"
                    );
                    return self.cancel_order(plan, report).await;
                }
            }

            let handle = report.handle.clone();
            match self.retry.run(|_| self.ctx.venue.order_status(&handle)).await {
                Ok(next) => report = next,
                Err(e) => {
                    tracing::warn!(
                        target: "executor",
                        order_id = %handle.order_id,
                        error = %e,
                        "Order status unavailable; cancelling"
                    );
                    return match self.cancel_order(plan, report).await {
                        Outcome::Canceled(_) => Outcome::Failed(format!("status polling failed: {e}")),
                        other => other,
                    };
                }
            }
        }
    }

    async fn cancel_order(&self, plan: &OrderPlan, report: OrderReport) -> Outcome {
        let handle = report.handle.clone();
        let canceled = match self.retry.run(|_| self.ctx.venue.cancel(&handle)).await {
            Ok(r) => r,
            Err(e) => return Outcome::Failed(format!("cancel failed: {e}")),
        };
        if canceled.status == OrderStatus::Filled {
            return Outcome::Filled(canceled);
        }
        if plan.side == Side::Buy && canceled.executed_qty > 0.0 {
            self.unwind_partial_buy(plan, &canceled).await;
        }
        Outcome::Canceled(canceled)
    }

    /// Sell whatever a cancelled BUY managed to acquire.
    async fn unwind_partial_buy(&self, plan: &OrderPlan, report: &OrderReport) {
        let acquired = match self.ctx.account.balance(&plan.alt).await {
            Ok(balance) => (balance - plan.alt_balance).max(0.0).min(report.executed_qty),
            Err(e) => {
                tracing::warn!(target: "executor", symbol = %plan.symbol, error = %e, "Balance unavailable for unwind");
                return;
            }
        };
        let quantity = match self.ctx.precision.floor_quantity(&plan.symbol, acquired).await {
            Ok(q) if q > 0.0 => q,
            _ => return,
        };
        match self
            .retry
            .run(|_| self.ctx.venue.market_sell(&plan.symbol, quantity))
            .await
        {
            Ok(sold) => tracing::info!(
                target: "executor",
                symbol = %plan.symbol,
                quantity = sold.executed_qty,
                "Sold partial fill of cancelled buy"
            ),
            Err(e) => tracing::warn!(
                target: "executor",
                symbol = %plan.symbol,
                quantity,
                error = %e,
                "Failed to sell partial fill of cancelled buy"
            ),
        }
    }
}

#[async_trait]
impl TradeExecutor for OrderExecutor {
    async fn execute(
        &self,
        side: Side,
        alt: &str,
        reserve: &str,
        tickers: &TickerSnapshot,
    ) -> Result<Trade, AppError> {
        let plan = self.ctx.plan(side, alt, reserve, tickers).await?;
        let trade = self
            .ctx
            .db
            .create_trade(alt, reserve, side == Side::Sell, self.ctx.clock.now())
            .await?;
        tracing::info!(
            target: "executor",
            trade_id = trade.id,
            symbol = %plan.symbol,
            side = %side,
            quantity = plan.quantity,
            price = plan.price,
            "Submitting limit order"
        );

        let submitted = self
            .retry
            .run(|_| {
                self.ctx
                    .venue
                    .submit_limit_order(&plan.symbol, side, plan.quantity, plan.price)
            })
            .await;
        let report = match submitted {
            Ok(report) => report,
            Err(e) => {
                return self
                    .ctx
                    .finish(trade.id, &plan, None, Outcome::Failed(e.to_string()))
                    .await;
            }
        };
        let order_id = report.handle.order_id.clone();

        if let Err(e) = self.ctx.mark_ordered(trade.id, &plan).await {
            tracing::error!(
                target: "executor",
                trade_id = trade.id,
                order_id = %order_id,
                error = %e,
                "Submitted order not recorded; withdrawing it"
            );
            let outcome = match report.status {
                OrderStatus::Filled => Outcome::Filled(report),
                _ => match self.cancel_order(&plan, report).await {
                    Outcome::Canceled(_) => Outcome::Failed(format!("order not recorded: {e}")),
                    other => other,
                },
            };
            return self.ctx.finish(trade.id, &plan, Some(&order_id), outcome).await;
        }
        let outcome = self.wait_for_order(&plan, report).await;
        self.ctx.finish(trade.id, &plan, Some(&order_id), outcome).await
    }
}

/// Backtest executor: one attempt, no polling. Orders that do not fill on
/// submission are cancelled straight away.
pub struct SimulatedExecutor {
    ctx: ExecutionContext,
    retry: RetryPolicy,
}

impl SimulatedExecutor {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            retry: RetryPolicy::none(),
        }
    }
}

#[async_trait]
impl TradeExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        side: Side,
        alt: &str,
        reserve: &str,
        tickers: &TickerSnapshot,
    ) -> Result<Trade, AppError> {
        let plan = self.ctx.plan(side, alt, reserve, tickers).await?;
        let trade = self
            .ctx
            .db
            .create_trade(alt, reserve, side == Side::Sell, self.ctx.clock.now())
            .await?;
        let submitted = self
            .retry
            .run(|_| {
                self.ctx
                    .venue
                    .submit_limit_order(&plan.symbol, side, plan.quantity, plan.price)
            })
            .await;
        let (order_id, outcome) = match submitted {
            Ok(report) => {
                // an unrecorded ORDERED step still ends in a terminal row below
                if let Err(e) = self.ctx.mark_ordered(trade.id, &plan).await {
                    tracing::warn!(target: "executor", trade_id = trade.id, error = %e, "Order step not recorded");
                }
                let order_id = report.handle.order_id.clone();
                let outcome = match report.status {
                    OrderStatus::Filled => Outcome::Filled(report),
                    _ => match self.ctx.venue.cancel(&report.handle).await {
                        Ok(r) if r.status == OrderStatus::Filled => Outcome::Filled(r),
                        Ok(r) => Outcome::Canceled(r),
                        Err(e) => Outcome::Failed(e.to_string()),
                    },
                };
                (Some(order_id), outcome)
            }
            Err(e) => (None, Outcome::Failed(e.to_string())),
        };
        self.ctx
            .finish(trade.id, &plan, order_id.as_deref(), outcome)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::VirtualClock;
    use crate::domain::models::OrderHandle;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mins(m: i64) -> Duration {
        Duration::minutes(m)
    }

    /// Accepts orders without filling them and, on submission, makes the
    /// store reject the ORDERED transition.
    struct BrokenStoreVenue {
        db: Database,
        cancels: AtomicUsize,
    }

    impl BrokenStoreVenue {
        fn report(&self, symbol: &str, status: OrderStatus) -> OrderReport {
            OrderReport {
                handle: OrderHandle {
                    symbol: symbol.to_string(),
                    order_id: "open-1".into(),
                },
                side: Side::Buy,
                status,
                price: 2_000.0,
                orig_qty: 0.05,
                executed_qty: 0.0,
                cumulative_quote_qty: 0.0,
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            }
        }
    }

    #[async_trait]
    impl AccountSource for BrokenStoreVenue {
        async fn balances(&self) -> Result<HashMap<String, f64>, AppError> {
            Ok(HashMap::from([("USDT".to_string(), 100.0)]))
        }

        async fn minimum_notional(&self, _symbol: &str) -> Result<f64, AppError> {
            Ok(10.0)
        }

        async fn trade_increment(&self, _symbol: &str) -> Result<Decimal, AppError> {
            Ok(Decimal::new(1, 4))
        }

        async fn taker_fee(&self) -> Result<f64, AppError> {
            Ok(0.001)
        }
    }

    #[async_trait]
    impl PriceSource for BrokenStoreVenue {
        async fn current_price(&self, _symbol: &str) -> Result<f64, AppError> {
            Ok(2_000.0)
        }

        async fn all_ticker_prices(&self) -> Result<TickerSnapshot, AppError> {
            Ok([("ETHUSDT".to_string(), 2_000.0)].into_iter().collect())
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

    #[async_trait]
    impl OrderVenue for BrokenStoreVenue {
        async fn submit_limit_order(
            &self,
            symbol: &str,
            _side: Side,
            _quantity: f64,
            _price: f64,
        ) -> Result<OrderReport, AppError> {
            sqlx::query(
                r#"
                CREATE TRIGGER reject_ordered BEFORE UPDATE ON trades
                WHEN NEW.state = 'ORDERED'
                BEGIN SELECT RAISE(ABORT, 'database is locked'); END
                "#,
            )
            .execute(self.db.pool())
            .await
            .map_err(AppError::from)?;
            Ok(self.report(symbol, OrderStatus::New))
        }

        async fn order_status(&self, handle: &OrderHandle) -> Result<OrderReport, AppError> {
            Ok(self.report(&handle.symbol, OrderStatus::New))
        }

        async fn cancel(&self, handle: &OrderHandle) -> Result<OrderReport, AppError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(self.report(&handle.symbol, OrderStatus::Canceled))
        }

        async fn market_sell(&self, symbol: &str, _quantity: f64) -> Result<OrderReport, AppError> {
            Ok(self.report(symbol, OrderStatus::Filled))
        }
    }

    #[tokio::test]
    async fn unrecorded_order_is_withdrawn_and_trade_closed() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let venue = Arc::new(BrokenStoreVenue {
            db: db.clone(),
            cancels: AtomicUsize::new(0),
        });
        let clock = VirtualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let executor = OrderExecutor::new(
            ExecutionContext {
                db: db.clone(),
                account: venue.clone(),
                venue: venue.clone(),
                prices: venue.clone(),
                precision: Arc::new(PrecisionResolver::new(venue.clone())),
                clock: Arc::new(clock),
            },
            OrderTimeouts::from_minutes(0, 0),
            RetryPolicy::none(),
            std::time::Duration::from_millis(1),
            CancellationToken::new(),
        );
        let tickers: TickerSnapshot = [("ETHUSDT".to_string(), 2_000.0)].into_iter().collect();

        let trade = executor
            .execute(Side::Buy, "ETH", "USDT", &tickers)
            .await
            .expect("trade is closed");

        assert_eq!(trade.state, TradeState::Failed);
        assert_eq!(venue.cancels.load(Ordering::SeqCst), 1);
        let stored = db.trades().await.expect("trades");
        assert_eq!(stored.len(), 1);
        assert!(stored[0].state.is_terminal());
    }

    #[test]
    fn zero_timeout_never_cancels() {
        let timeouts = OrderTimeouts::from_minutes(0, 0);
        assert!(!should_cancel(
            Side::Sell,
            OrderStatus::New,
            mins(10_000),
            timeouts.sell,
            100.0,
            None,
            0.001
        ));
    }

    #[test]
    fn sell_cancels_after_timeout_in_any_open_state() {
        let t = Some(mins(5));
        for status in [OrderStatus::New, OrderStatus::PartiallyFilled] {
            assert!(!should_cancel(Side::Sell, status, mins(4), t, 1.0, None, 0.0));
            assert!(should_cancel(Side::Sell, status, mins(5), t, 1.0, None, 0.0));
        }
    }

    #[test]
    fn partial_buy_waits_while_still_favorable() {
        let t = Some(mins(5));
        // market below the limit: keep waiting
        assert!(!should_cancel(
            Side::Buy,
            OrderStatus::PartiallyFilled,
            mins(30),
            t,
            100.0,
            Some(99.0),
            0.00075
        ));
        // market moved above the limit even after fees: give up
        assert!(should_cancel(
            Side::Buy,
            OrderStatus::PartiallyFilled,
            mins(30),
            t,
            100.0,
            Some(101.0),
            0.00075
        ));
        assert!(should_cancel(Side::Buy, OrderStatus::New, mins(5), t, 100.0, None, 0.0));
    }
}
