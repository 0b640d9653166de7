// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use chrono::Duration;

pub const DEFAULT_FEE_RATE: f64 = 0.00075;
pub const DEFAULT_RESERVE: &str = "USDT";
pub const BTC_SYMBOL: &str = "BTC";
pub const DEFAULT_STRATEGY: &str = "default";

pub const DEFAULT_SUPPORTED_COINS: &[&str] = &[
    "ADA", "ATOM", "BAT", "BTT", "DASH", "DOGE", "EOS", "ETC", "ICX", "IOTA", "NEO", "OMG", "ONT",
    "QTUM", "TRX", "VET", "XLM", "XMR",
];

pub const DEFAULT_API_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_DATABASE_FILE: &str = "scoutbot.db";
pub const DEFAULT_PRICE_CACHE_FILE: &str = "backtest_cache.db";

/// Klines fetched per cache miss (venue page limit).
pub const KLINE_PAGE_LIMIT: u32 = 1000;

pub const VALUE_SNAPSHOT_INTERVAL_SECS: u64 = 60;
pub const SCOUT_PRUNE_INTERVAL_SECS: u64 = 60;
pub const COMPACTION_INTERVAL_SECS: u64 = 3_600;
pub const WARMUP_INTERVAL_SECS: u64 = 3_600;

pub fn minutely_retention() -> Duration {
    Duration::hours(24)
}

pub fn hourly_retention() -> Duration {
    Duration::days(28)
}

pub fn daily_retention() -> Duration {
    Duration::days(365)
}
