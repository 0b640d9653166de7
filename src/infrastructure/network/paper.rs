// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::SharedClock;
use crate::common::error::AppError;
use crate::domain::models::{OrderHandle, OrderReport, OrderStatus, Side};
use crate::infrastructure::network::venue::{AccountSource, MarketRules, OrderVenue, PriceSource};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// Absorbs float noise when a floored quantity equals the whole balance.
const BALANCE_EPSILON: f64 = 1e-12;

/// In-memory account that fills every limit order at its limit price and
/// charges a flat taker fee on the received asset.
pub struct PaperVenue {
    reserve: String,
    fee_rate: f64,
    balances: Mutex<HashMap<String, f64>>,
    orders: DashMap<String, OrderReport>,
    next_order_id: AtomicU64,
    prices: Arc<dyn PriceSource>,
    rules: Arc<dyn MarketRules>,
    clock: SharedClock,
}

impl PaperVenue {
    pub fn new(
        reserve: impl Into<String>,
        fee_rate: f64,
        balances: HashMap<String, f64>,
        prices: Arc<dyn PriceSource>,
        rules: Arc<dyn MarketRules>,
        clock: SharedClock,
    ) -> Self {
        Self {
            reserve: reserve.into(),
            fee_rate,
            balances: Mutex::new(balances),
            orders: DashMap::new(),
            next_order_id: AtomicU64::new(1),
            prices,
            rules,
            clock,
        }
    }

    fn base_asset<'a>(&self, symbol: &'a str) -> Result<&'a str, AppError> {
        symbol
            .strip_suffix(self.reserve.as_str())
            .filter(|base| !base.is_empty())
            .ok_or_else(|| AppError::Validation {
                field: "symbol".into(),
                message: format!("{symbol} is not quoted in {}", self.reserve),
            })
    }

    fn settle(&self, symbol: &str, side: Side, quantity: f64, price: f64) -> Result<(), AppError> {
        let base = self.base_asset(symbol)?;
        let mut balances = self.balances.lock().unwrap_or_else(|p| p.into_inner());
        let (pay_asset, pay, get_asset, get) = match side {
            Side::Buy => (
                self.reserve.as_str(),
                quantity * price,
                base,
                quantity * (1.0 - self.fee_rate),
            ),
            Side::Sell => (
                base,
                quantity,
                self.reserve.as_str(),
                quantity * price * (1.0 - self.fee_rate),
            ),
        };
        let available = balances.get(pay_asset).copied().unwrap_or(0.0);
        if pay > available + BALANCE_EPSILON {
            return Err(AppError::InsufficientFunds {
                required: format!("{pay} {pay_asset}"),
                available: format!("{available} {pay_asset}"),
            });
        }
        balances.insert(pay_asset.to_string(), (available - pay).max(0.0));
        *balances.entry(get_asset.to_string()).or_insert(0.0) += get;
        Ok(())
    }

    fn record_fill(&self, symbol: &str, side: Side, quantity: f64, price: f64) -> OrderReport {
        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        let report = OrderReport {
            handle: OrderHandle {
                symbol: symbol.to_string(),
                order_id: format!("paper-{id}"),
            },
            side,
            status: OrderStatus::Filled,
            price,
            orig_qty: quantity,
            executed_qty: quantity,
            cumulative_quote_qty: quantity * price,
            created_at: self.clock.now(),
        };
        self.orders
            .insert(report.handle.order_id.clone(), report.clone());
        report
    }
}

#[async_trait]
impl AccountSource for PaperVenue {
    async fn balances(&self) -> Result<HashMap<String, f64>, AppError> {
        Ok(self
            .balances
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone())
    }

    async fn minimum_notional(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.rules.symbol_rules(symbol).await?.min_notional)
    }

    async fn trade_increment(&self, symbol: &str) -> Result<Decimal, AppError> {
        Ok(self.rules.symbol_rules(symbol).await?.step_size)
    }

    async fn taker_fee(&self) -> Result<f64, AppError> {
        Ok(self.fee_rate)
    }
}

#[async_trait]
impl OrderVenue for PaperVenue {
    async fn submit_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReport, AppError> {
        self.settle(symbol, side, quantity, price)?;
        let report = self.record_fill(symbol, side, quantity, price);
        tracing::debug!(
            target: "paper",
            symbol,
            side = %side,
            quantity,
            price,
            order_id = %report.handle.order_id,
            "Paper order filled"
        );
        Ok(report)
    }

    async fn order_status(&self, handle: &OrderHandle) -> Result<OrderReport, AppError> {
        self.orders
            .get(&handle.order_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AppError::ExecutionFailed {
                symbol: handle.symbol.clone(),
                reason: format!("unknown order {}", handle.order_id),
            })
    }

    async fn cancel(&self, handle: &OrderHandle) -> Result<OrderReport, AppError> {
        let mut entry =
            self.orders
                .get_mut(&handle.order_id)
                .ok_or_else(|| AppError::ExecutionFailed {
                    symbol: handle.symbol.clone(),
                    reason: format!("unknown order {}", handle.order_id),
                })?;
        if entry.status != OrderStatus::Filled {
            entry.status = OrderStatus::Canceled;
        }
        Ok(entry.value().clone())
    }

    async fn market_sell(&self, symbol: &str, quantity: f64) -> Result<OrderReport, AppError> {
        let price = self.prices.current_price(symbol).await?;
        self.settle(symbol, Side::Sell, quantity, price)?;
        Ok(self.record_fill(symbol, Side::Sell, quantity, price))
    }
}
