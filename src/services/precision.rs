// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::infrastructure::network::venue::{AccountSource, SymbolRules};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Floor `qty` to a whole number of `step`s. Never rounds up.
pub fn floor_to_step(qty: f64, step: Decimal) -> f64 {
    if !qty.is_finite() || qty <= 0.0 {
        return 0.0;
    }
    let Some(exact) = Decimal::from_f64_retain(qty) else {
        return 0.0;
    };
    if step <= Decimal::ZERO {
        return qty;
    }
    exact
        .checked_div(step)
        .and_then(|steps| steps.floor().checked_mul(step))
        .and_then(|floored| floored.normalize().to_f64())
        .map(|v| v.min(qty))
        .unwrap_or(0.0)
}

/// Caches per-market quantisation rules resolved from the account source.
pub struct PrecisionResolver {
    account: Arc<dyn AccountSource>,
    cache: DashMap<String, SymbolRules>,
}

impl PrecisionResolver {
    pub fn new(account: Arc<dyn AccountSource>) -> Self {
        Self {
            account,
            cache: DashMap::new(),
        }
    }

    pub async fn rules(&self, symbol: &str) -> Result<SymbolRules, AppError> {
        if let Some(rules) = self.cache.get(symbol) {
            return Ok(*rules);
        }
        let step_size = self.account.trade_increment(symbol).await?;
        let min_notional = self.account.minimum_notional(symbol).await?;
        let rules = SymbolRules {
            step_size,
            min_notional,
        };
        self.cache.insert(symbol.to_string(), rules);
        Ok(rules)
    }

    pub async fn floor_quantity(&self, symbol: &str, qty: f64) -> Result<f64, AppError> {
        let rules = self.rules(symbol).await?;
        Ok(floor_to_step(qty, rules.step_size))
    }

    /// `OrderTooSmall` when `qty * price` is under the market minimum.
    pub async fn check_notional(&self, symbol: &str, qty: f64, price: f64) -> Result<(), AppError> {
        let minimum = self.rules(symbol).await?.min_notional;
        let notional = qty * price;
        if qty <= 0.0 || notional < minimum {
            return Err(AppError::OrderTooSmall {
                symbol: symbol.to_string(),
                notional,
                minimum,
            });
        }
        Ok(())
    }

    /// Drop cached rules and resolve them again for `symbols`. Returns the
    /// number of markets resolved.
    pub async fn warmup(&self, symbols: &[String]) -> usize {
        self.cache.clear();
        let mut resolved = 0;
        for symbol in symbols {
            match self.rules(symbol).await {
                Ok(_) => resolved += 1,
                Err(e) => tracing::warn!(
                    target: "precision",
                    symbol = %symbol,
                    error = %e,
                    "Failed to resolve trading rules"
                ),
            }
        }
        resolved
    }
}
