// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

//! Collaborator seams between the trading core and the outside world.
//!
//! Live trading, paper trading and backtests differ only in which
//! implementations sit behind these traits.

use crate::common::error::AppError;
use crate::domain::models::{OrderHandle, OrderReport, Side, TickerSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, AppError>;

    async fn all_ticker_prices(&self) -> Result<TickerSnapshot, AppError>;

    /// One-minute prices in `[from, to]`, oldest first, at most `limit` points.
    async fn historical_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, AppError>;
}

/// Exchange-imposed quantisation for one market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolRules {
    pub step_size: Decimal,
    pub min_notional: f64,
}

#[async_trait]
pub trait MarketRules: Send + Sync {
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, AppError>;
}

/// Same rules for every market. Used by simulations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRules(pub SymbolRules);

impl Default for FixedRules {
    fn default() -> Self {
        Self(SymbolRules {
            step_size: Decimal::new(1, 6),
            min_notional: 10.0,
        })
    }
}

#[async_trait]
impl MarketRules for FixedRules {
    async fn symbol_rules(&self, _symbol: &str) -> Result<SymbolRules, AppError> {
        Ok(self.0)
    }
}

#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn balances(&self) -> Result<HashMap<String, f64>, AppError>;

    async fn balance(&self, asset: &str) -> Result<f64, AppError> {
        Ok(self.balances().await?.get(asset).copied().unwrap_or(0.0))
    }

    async fn minimum_notional(&self, symbol: &str) -> Result<f64, AppError>;

    async fn trade_increment(&self, symbol: &str) -> Result<Decimal, AppError>;

    async fn taker_fee(&self) -> Result<f64, AppError>;
}

#[async_trait]
pub trait OrderVenue: Send + Sync {
    async fn submit_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        price: f64,
    ) -> Result<OrderReport, AppError>;

    async fn order_status(&self, handle: &OrderHandle) -> Result<OrderReport, AppError>;

    async fn cancel(&self, handle: &OrderHandle) -> Result<OrderReport, AppError>;

    async fn market_sell(&self, symbol: &str, quantity: f64) -> Result<OrderReport, AppError>;
}
