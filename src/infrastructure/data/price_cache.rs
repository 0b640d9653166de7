// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::clock::to_millis;
use crate::common::error::AppError;
use crate::infrastructure::data::db::Database;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Minute-resolution price store backing historical replays.
#[derive(Clone)]
pub struct PriceCache {
    db: Database,
}

/// Cache key time: the start of the minute containing `at`.
pub fn minute_key(at: DateTime<Utc>) -> i64 {
    to_millis(at.duration_trunc(TimeDelta::minutes(1)).unwrap_or(at))
}

impl PriceCache {
    pub async fn open(database_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            db: Database::new(database_url).await?,
        })
    }

    pub async fn get(&self, symbol: &str, at: DateTime<Utc>) -> Result<Option<f64>, AppError> {
        sqlx::query_scalar::<_, f64>(
            "SELECT price FROM price_cache WHERE symbol = ? AND timestamp_ms = ?",
        )
        .bind(symbol)
        .bind(minute_key(at))
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::Database(format!("price cache read: {e}")))
    }

    /// Insert or replace a batch of `(time, price)` points for one symbol.
    pub async fn put_many(
        &self,
        symbol: &str,
        points: &[(DateTime<Utc>, f64)],
    ) -> Result<usize, AppError> {
        if points.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("price cache begin: {e}")))?;
        for (at, price) in points {
            sqlx::query(
                "INSERT OR REPLACE INTO price_cache (symbol, timestamp_ms, price) VALUES (?, ?, ?)",
            )
            .bind(symbol)
            .bind(minute_key(*at))
            .bind(*price)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("price cache write: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("price cache commit: {e}")))?;
        tracing::debug!(target: "price_cache", symbol, stored = points.len(), "Cached klines");
        Ok(points.len())
    }
}
