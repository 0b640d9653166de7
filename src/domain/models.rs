// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub type PairId = i64;
pub type TradeId = i64;

/// Venue market symbol for `base` quoted in `quote` (e.g. `ETHUSDT`).
pub fn market_symbol(base: &str, quote: &str) -> String {
    format!("{base}{quote}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub is_reserve: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pair {
    pub id: PairId,
    pub from_symbol: String,
    pub to_symbol: String,
    pub ratio: Option<f64>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentHolding {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    Created,
    Ordered,
    Complete,
    Canceled,
    Failed,
}

impl TradeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Ordered => "ORDERED",
            Self::Complete => "COMPLETE",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Failed)
    }

    /// Forward-only: CREATED → ORDERED → terminal, or CREATED → terminal.
    pub fn can_transition_to(&self, next: TradeState) -> bool {
        match (self, next) {
            (Self::Created, Self::Ordered) => true,
            (Self::Created, n) | (Self::Ordered, n) => n.is_terminal(),
            _ => false,
        }
    }
}

impl FromStr for TradeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "ORDERED" => Ok(Self::Ordered),
            "COMPLETE" => Ok(Self::Complete),
            "CANCELED" => Ok(Self::Canceled),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown trade state {other}")),
        }
    }
}

/// One buy or sell attempt of `alt_symbol` against `crypto_symbol` (the reserve).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: TradeId,
    pub alt_symbol: String,
    pub crypto_symbol: String,
    pub selling: bool,
    pub state: TradeState,
    pub alt_starting_balance: Option<f64>,
    pub crypto_starting_balance: Option<f64>,
    pub alt_trade_amount: Option<f64>,
    pub crypto_trade_amount: Option<f64>,
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn side(&self) -> Side {
        if self.selling { Side::Sell } else { Side::Buy }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoutLogEntry {
    pub pair_id: PairId,
    pub target_ratio: f64,
    pub current_coin_price: f64,
    pub other_coin_price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Minutely = 0,
    Hourly = 1,
    Daily = 2,
    Weekly = 3,
}

impl Tier {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Minutely),
            1 => Some(Self::Hourly),
            2 => Some(Self::Daily),
            3 => Some(Self::Weekly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinValueSnapshot {
    pub id: i64,
    pub symbol: String,
    pub balance: f64,
    pub btc_value: Option<f64>,
    pub reserve_value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub tier: Tier,
}

/// Value snapshot before it has been stored; always enters as MINUTELY.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoinValue {
    pub symbol: String,
    pub balance: f64,
    pub btc_value: Option<f64>,
    pub reserve_value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Tier promotions and deletions computed from one consistent read of the
/// value history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionPlan {
    pub promotions: Vec<(i64, Tier)>,
    pub deletions: Vec<i64>,
}

impl CompactionPlan {
    pub fn is_empty(&self) -> bool {
        self.promotions.is_empty() && self.deletions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    pub symbol: String,
    pub order_id: String,
}

/// Venue view of an order at the time it was queried.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReport {
    pub handle: OrderHandle,
    pub side: Side,
    pub status: OrderStatus,
    pub price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
    pub created_at: DateTime<Utc>,
}

/// Prices keyed by venue market symbol, taken once per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerSnapshot {
    prices: HashMap<String, f64>,
}

impl TickerSnapshot {
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices
            .get(symbol)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn pair_price(&self, base: &str, quote: &str) -> Option<f64> {
        self.price(&market_symbol(base, quote))
    }

    pub fn insert(&mut self, symbol: impl Into<String>, price: f64) {
        self.prices.insert(symbol.into(), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, f64)> for TickerSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_state_only_moves_forward() {
        use TradeState::*;
        assert!(Created.can_transition_to(Ordered));
        assert!(Created.can_transition_to(Complete));
        assert!(Ordered.can_transition_to(Canceled));
        assert!(!Ordered.can_transition_to(Created));
        assert!(!Ordered.can_transition_to(Ordered));
        for terminal in [Complete, Canceled, Failed] {
            for next in [Created, Ordered, Complete, Canceled, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn ticker_snapshot_ignores_non_positive_prices() {
        let mut tickers = TickerSnapshot::default();
        tickers.insert("ETHUSDT", 2000.0);
        tickers.insert("DEADUSDT", 0.0);
        assert_eq!(tickers.pair_price("ETH", "USDT"), Some(2000.0));
        assert_eq!(tickers.pair_price("DEAD", "USDT"), None);
        assert_eq!(tickers.pair_price("BTC", "USDT"), None);
    }

    #[test]
    fn tiers_order_from_fine_to_coarse() {
        assert!(Tier::Minutely < Tier::Hourly);
        assert!(Tier::Daily < Tier::Weekly);
        assert_eq!(Tier::from_i64(Tier::Daily.as_i64()), Some(Tier::Daily));
        assert_eq!(Tier::from_i64(9), None);
    }
}
