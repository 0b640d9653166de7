// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::clock::to_millis;
use crate::common::error::AppError;
use crate::domain::models::{
    Asset, CoinValueSnapshot, CompactionPlan, CurrentHolding, NewCoinValue, Pair, PairId,
    ScoutLogEntry, Trade, TradeId, TradeState,
};
use crate::infrastructure::data::schema::{
    AssetRecord, CoinValueRecord, HoldingRecord, PairRecord, ScoutRecord, TradeRecord,
};
use chrono::{DateTime, Utc};
use sqlx::{
    Pool, QueryBuilder, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;
use std::time::Duration;

const FILE_POOL_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
// SQLite caps bound parameters per statement; stay well below it.
const DELETE_CHUNK: usize = 500;

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::Database(format!("{context}: {e}"))
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Fields an executor may fill in while moving a trade forward. `None` keeps
/// the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeUpdate {
    pub alt_starting_balance: Option<f64>,
    pub crypto_starting_balance: Option<f64>,
    pub alt_trade_amount: Option<f64>,
    pub crypto_trade_amount: Option<f64>,
    pub price: Option<f64>,
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let in_memory = is_in_memory(database_url);
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives exactly as long as its connection, so
        // the pool keeps a single one open for the lifetime of the process.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(FILE_POOL_CONNECTIONS)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        tracing::debug!(target: "db", url = %database_url, in_memory, "Database ready");
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Enable exactly `symbols` (plus the reserve), disable every other asset,
    /// create missing pairs and align pair flags with their endpoints.
    pub async fn set_coins(&self, reserve: &str, symbols: &[String]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err("set_coins begin"))?;

        sqlx::query("UPDATE assets SET enabled = 0, is_reserve = 0 WHERE symbol != ?")
            .bind(reserve)
            .execute(&mut *tx)
            .await
            .map_err(db_err("set_coins disable"))?;
        sqlx::query(
            r#"
            INSERT INTO assets (symbol, is_reserve, enabled) VALUES (?, 1, 1)
            ON CONFLICT(symbol) DO UPDATE SET is_reserve = 1, enabled = 1
            "#,
        )
        .bind(reserve)
        .execute(&mut *tx)
        .await
        .map_err(db_err("set_coins reserve"))?;

        for symbol in symbols.iter().filter(|s| s.as_str() != reserve) {
            sqlx::query(
                r#"
                INSERT INTO assets (symbol, is_reserve, enabled) VALUES (?, 0, 1)
                ON CONFLICT(symbol) DO UPDATE SET is_reserve = 0, enabled = 1
                "#,
            )
            .bind(symbol)
            .execute(&mut *tx)
            .await
            .map_err(db_err("set_coins asset"))?;
        }

        for from in symbols.iter().filter(|s| s.as_str() != reserve) {
            for to in symbols.iter().filter(|s| s.as_str() != reserve) {
                if from == to {
                    continue;
                }
                sqlx::query(
                    "INSERT OR IGNORE INTO pairs (from_symbol, to_symbol, enabled) VALUES (?, ?, 1)",
                )
                .bind(from)
                .bind(to)
                .execute(&mut *tx)
                .await
                .map_err(db_err("set_coins pair"))?;
            }
        }

        sqlx::query(
            r#"
            UPDATE pairs SET enabled = CASE
                WHEN from_symbol IN (SELECT symbol FROM assets WHERE enabled = 1 AND is_reserve = 0)
                 AND to_symbol IN (SELECT symbol FROM assets WHERE enabled = 1 AND is_reserve = 0)
                THEN 1 ELSE 0 END
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(db_err("set_coins pair flags"))?;

        tx.commit().await.map_err(db_err("set_coins commit"))?;
        tracing::info!(target: "db", reserve, count = symbols.len(), "Asset list synchronised");
        Ok(())
    }

    pub async fn assets(&self) -> Result<Vec<Asset>, AppError> {
        let rows = sqlx::query_as::<_, AssetRecord>(
            "SELECT symbol, is_reserve, enabled FROM assets ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("assets load"))?;
        Ok(rows.into_iter().map(Asset::from).collect())
    }

    pub async fn set_current_holding(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO current_holdings (symbol, timestamp_ms) VALUES (?, ?)")
            .bind(symbol)
            .bind(to_millis(at))
            .execute(&self.pool)
            .await
            .map_err(db_err("current holding insert"))?;
        Ok(())
    }

    pub async fn current_holding(&self) -> Result<Option<CurrentHolding>, AppError> {
        let row = sqlx::query_as::<_, HoldingRecord>(
            r#"
            SELECT symbol, timestamp_ms FROM current_holdings
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("current holding load"))?;
        Ok(row.map(CurrentHolding::from))
    }

    pub async fn pairs(&self) -> Result<Vec<Pair>, AppError> {
        let rows = sqlx::query_as::<_, PairRecord>(
            "SELECT id, from_symbol, to_symbol, ratio, enabled FROM pairs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("pairs load"))?;
        Ok(rows.into_iter().map(Pair::from).collect())
    }

    /// Enabled pairs leaving `from_symbol`.
    pub async fn pairs_from(&self, from_symbol: &str) -> Result<Vec<Pair>, AppError> {
        let rows = sqlx::query_as::<_, PairRecord>(
            r#"
            SELECT id, from_symbol, to_symbol, ratio, enabled FROM pairs
            WHERE from_symbol = ? AND enabled = 1
            ORDER BY id
            "#,
        )
        .bind(from_symbol)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("pairs_from load"))?;
        Ok(rows.into_iter().map(Pair::from).collect())
    }

    pub async fn pair(&self, from_symbol: &str, to_symbol: &str) -> Result<Option<Pair>, AppError> {
        let row = sqlx::query_as::<_, PairRecord>(
            r#"
            SELECT id, from_symbol, to_symbol, ratio, enabled FROM pairs
            WHERE from_symbol = ? AND to_symbol = ?
            "#,
        )
        .bind(from_symbol)
        .bind(to_symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("pair load"))?;
        Ok(row.map(Pair::from))
    }

    /// Unconditional overwrite; reserved for rotation re-seeding.
    pub async fn set_pair_ratio(&self, pair_id: PairId, ratio: f64) -> Result<(), AppError> {
        sqlx::query("UPDATE pairs SET ratio = ? WHERE id = ?")
            .bind(ratio)
            .bind(pair_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("pair ratio update"))?;
        Ok(())
    }

    /// Store `ratio` only when the pair has never been observed.
    pub async fn seed_pair_ratio(&self, pair_id: PairId, ratio: f64) -> Result<bool, AppError> {
        let done = sqlx::query("UPDATE pairs SET ratio = ? WHERE id = ? AND ratio IS NULL")
            .bind(ratio)
            .bind(pair_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("pair ratio seed"))?;
        Ok(done.rows_affected() > 0)
    }

    /// Ratchet: lower the stored ratio, never raise it. Returns whether the row
    /// changed.
    pub async fn lower_pair_ratio(&self, pair_id: PairId, ratio: f64) -> Result<bool, AppError> {
        let done = sqlx::query(
            "UPDATE pairs SET ratio = ? WHERE id = ? AND (ratio IS NULL OR ratio > ?)",
        )
        .bind(ratio)
        .bind(pair_id)
        .bind(ratio)
        .execute(&self.pool)
        .await
        .map_err(db_err("pair ratio ratchet"))?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn log_scouts(&self, entries: &[ScoutLogEntry]) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(db_err("scout log begin"))?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO scout_history
                    (pair_id, target_ratio, current_coin_price, other_coin_price, timestamp_ms)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.pair_id)
            .bind(entry.target_ratio)
            .bind(entry.current_coin_price)
            .bind(entry.other_coin_price)
            .bind(to_millis(entry.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(db_err("scout log insert"))?;
        }
        tx.commit().await.map_err(db_err("scout log commit"))?;
        Ok(())
    }

    pub async fn scout_log(&self) -> Result<Vec<ScoutLogEntry>, AppError> {
        let rows = sqlx::query_as::<_, ScoutRecord>(
            r#"
            SELECT pair_id, target_ratio, current_coin_price, other_coin_price, timestamp_ms
            FROM scout_history ORDER BY timestamp_ms, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("scout log load"))?;
        Ok(rows.into_iter().map(ScoutLogEntry::from).collect())
    }

    pub async fn prune_scout_log(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let done = sqlx::query("DELETE FROM scout_history WHERE timestamp_ms < ?")
            .bind(to_millis(before))
            .execute(&self.pool)
            .await
            .map_err(db_err("scout log prune"))?;
        Ok(done.rows_affected())
    }

    pub async fn create_trade(
        &self,
        alt_symbol: &str,
        crypto_symbol: &str,
        selling: bool,
        at: DateTime<Utc>,
    ) -> Result<Trade, AppError> {
        let at_ms = to_millis(at);
        let row = sqlx::query_as::<_, TradeRecord>(
            r#"
            INSERT INTO trades (alt_symbol, crypto_symbol, selling, state, created_at_ms, updated_at_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(alt_symbol)
        .bind(crypto_symbol)
        .bind(selling)
        .bind(TradeState::Created.as_str())
        .bind(at_ms)
        .bind(at_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("trade insert"))?;
        Trade::try_from(row)
    }

    /// Move a trade forward. Refuses backwards moves and any write to a
    /// terminal trade; the read and the guarded update share one transaction.
    pub async fn transition_trade(
        &self,
        id: TradeId,
        next: TradeState,
        update: TradeUpdate,
        at: DateTime<Utc>,
    ) -> Result<Trade, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_err("trade begin"))?;
        let current = sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("trade load"))?
            .ok_or_else(|| AppError::Validation {
                field: "trade_id".into(),
                message: format!("trade {id} does not exist"),
            })?;
        let current = Trade::try_from(current)?;
        if !current.state.can_transition_to(next) {
            return Err(AppError::Validation {
                field: "state".into(),
                message: format!(
                    "trade {id} cannot move from {} to {}",
                    current.state.as_str(),
                    next.as_str()
                ),
            });
        }

        let row = sqlx::query_as::<_, TradeRecord>(
            r#"
            UPDATE trades SET
                state = ?,
                alt_starting_balance = COALESCE(?, alt_starting_balance),
                crypto_starting_balance = COALESCE(?, crypto_starting_balance),
                alt_trade_amount = COALESCE(?, alt_trade_amount),
                crypto_trade_amount = COALESCE(?, crypto_trade_amount),
                price = COALESCE(?, price),
                updated_at_ms = ?
            WHERE id = ? AND state = ? AND state IN ('CREATED', 'ORDERED')
            RETURNING *
            "#,
        )
        .bind(next.as_str())
        .bind(update.alt_starting_balance)
        .bind(update.crypto_starting_balance)
        .bind(update.alt_trade_amount)
        .bind(update.crypto_trade_amount)
        .bind(update.price)
        .bind(to_millis(at))
        .bind(id)
        .bind(current.state.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("trade update"))?
        .ok_or_else(|| AppError::Validation {
            field: "state".into(),
            message: format!("trade {id} changed state concurrently"),
        })?;

        tx.commit().await.map_err(db_err("trade commit"))?;
        tracing::debug!(
            target: "db",
            trade_id = id,
            from = current.state.as_str(),
            to = next.as_str(),
            "Trade transition"
        );
        Trade::try_from(row)
    }

    pub async fn trade(&self, id: TradeId) -> Result<Option<Trade>, AppError> {
        sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("trade load"))?
            .map(Trade::try_from)
            .transpose()
    }

    pub async fn trades(&self) -> Result<Vec<Trade>, AppError> {
        let rows = sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("trades load"))?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    pub async fn last_completed_sell(&self) -> Result<Option<Trade>, AppError> {
        sqlx::query_as::<_, TradeRecord>(
            r#"
            SELECT * FROM trades
            WHERE selling = 1 AND state = 'COMPLETE'
            ORDER BY updated_at_ms DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("last sell load"))?
        .map(Trade::try_from)
        .transpose()
    }

    pub async fn insert_coin_values(&self, values: &[NewCoinValue]) -> Result<(), AppError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(db_err("coin values begin"))?;
        for value in values {
            sqlx::query(
                r#"
                INSERT INTO coin_values (symbol, balance, btc_value, reserve_value, timestamp_ms, tier)
                VALUES (?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(&value.symbol)
            .bind(value.balance)
            .bind(value.btc_value)
            .bind(value.reserve_value)
            .bind(to_millis(value.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(db_err("coin value insert"))?;
        }
        tx.commit().await.map_err(db_err("coin values commit"))?;
        Ok(())
    }

    /// Value history ordered by (symbol, timestamp, id).
    pub async fn coin_values(&self) -> Result<Vec<CoinValueSnapshot>, AppError> {
        let rows = sqlx::query_as::<_, CoinValueRecord>(
            r#"
            SELECT id, symbol, balance, btc_value, reserve_value, timestamp_ms, tier
            FROM coin_values ORDER BY symbol, timestamp_ms, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("coin values load"))?;
        rows.into_iter().map(CoinValueSnapshot::try_from).collect()
    }

    /// Apply a compaction plan atomically. Promotions only ever raise a tier.
    pub async fn apply_compaction(&self, plan: &CompactionPlan) -> Result<(u64, u64), AppError> {
        if plan.is_empty() {
            return Ok((0, 0));
        }
        let mut tx = self.pool.begin().await.map_err(db_err("compaction begin"))?;

        let mut promoted = 0u64;
        for (id, tier) in &plan.promotions {
            let done = sqlx::query("UPDATE coin_values SET tier = ? WHERE id = ? AND tier < ?")
                .bind(tier.as_i64())
                .bind(id)
                .bind(tier.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(db_err("compaction promote"))?;
            promoted += done.rows_affected();
        }

        let mut deleted = 0u64;
        for chunk in plan.deletions.chunks(DELETE_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM coin_values WHERE id IN (");
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");
            let done = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_err("compaction delete"))?;
            deleted += done.rows_affected();
        }

        tx.commit().await.map_err(db_err("compaction commit"))?;
        Ok((promoted, deleted))
    }
}
