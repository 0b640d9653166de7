// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::from_millis;
use crate::domain::error::AppError;
use crate::domain::models::{
    Asset, CoinValueSnapshot, CurrentHolding, Pair, ScoutLogEntry, Tier, Trade, TradeState,
};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct AssetRecord {
    pub symbol: String,
    pub is_reserve: bool,
    pub enabled: bool,
}

impl From<AssetRecord> for Asset {
    fn from(r: AssetRecord) -> Self {
        Asset {
            symbol: r.symbol,
            is_reserve: r.is_reserve,
            enabled: r.enabled,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PairRecord {
    pub id: i64,
    pub from_symbol: String,
    pub to_symbol: String,
    pub ratio: Option<f64>,
    pub enabled: bool,
}

impl From<PairRecord> for Pair {
    fn from(r: PairRecord) -> Self {
        Pair {
            id: r.id,
            from_symbol: r.from_symbol,
            to_symbol: r.to_symbol,
            ratio: r.ratio,
            enabled: r.enabled,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct HoldingRecord {
    pub symbol: String,
    pub timestamp_ms: i64,
}

impl From<HoldingRecord> for CurrentHolding {
    fn from(r: HoldingRecord) -> Self {
        CurrentHolding {
            symbol: r.symbol,
            timestamp: from_millis(r.timestamp_ms),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub alt_symbol: String,
    pub crypto_symbol: String,
    pub selling: bool,
    pub state: String,
    pub alt_starting_balance: Option<f64>,
    pub crypto_starting_balance: Option<f64>,
    pub alt_trade_amount: Option<f64>,
    pub crypto_trade_amount: Option<f64>,
    pub price: Option<f64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl TryFrom<TradeRecord> for Trade {
    type Error = AppError;

    fn try_from(r: TradeRecord) -> Result<Self, Self::Error> {
        let state = r.state.parse::<TradeState>().map_err(|message| {
            AppError::Database(format!("trade {} has invalid state: {message}", r.id))
        })?;
        Ok(Trade {
            id: r.id,
            alt_symbol: r.alt_symbol,
            crypto_symbol: r.crypto_symbol,
            selling: r.selling,
            state,
            alt_starting_balance: r.alt_starting_balance,
            crypto_starting_balance: r.crypto_starting_balance,
            alt_trade_amount: r.alt_trade_amount,
            crypto_trade_amount: r.crypto_trade_amount,
            price: r.price,
            created_at: from_millis(r.created_at_ms),
            updated_at: from_millis(r.updated_at_ms),
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ScoutRecord {
    pub pair_id: i64,
    pub target_ratio: f64,
    pub current_coin_price: f64,
    pub other_coin_price: f64,
    pub timestamp_ms: i64,
}

impl From<ScoutRecord> for ScoutLogEntry {
    fn from(r: ScoutRecord) -> Self {
        ScoutLogEntry {
            pair_id: r.pair_id,
            target_ratio: r.target_ratio,
            current_coin_price: r.current_coin_price,
            other_coin_price: r.other_coin_price,
            timestamp: from_millis(r.timestamp_ms),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CoinValueRecord {
    pub id: i64,
    pub symbol: String,
    pub balance: f64,
    pub btc_value: Option<f64>,
    pub reserve_value: Option<f64>,
    pub timestamp_ms: i64,
    pub tier: i64,
}

impl TryFrom<CoinValueRecord> for CoinValueSnapshot {
    type Error = AppError;

    fn try_from(r: CoinValueRecord) -> Result<Self, Self::Error> {
        let tier = Tier::from_i64(r.tier).ok_or_else(|| {
            AppError::Database(format!("coin value {} has invalid tier {}", r.id, r.tier))
        })?;
        Ok(CoinValueSnapshot {
            id: r.id,
            symbol: r.symbol,
            balance: r.balance,
            btc_value: r.btc_value,
            reserve_value: r.reserve_value,
            timestamp: from_millis(r.timestamp_ms),
            tier,
        })
    }
}
