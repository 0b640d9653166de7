// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transient venue error from {venue}: {reason}")]
    TransientVenue { venue: String, reason: String },

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Order too small for {symbol}: notional {notional} < minimum {minimum}")]
    OrderTooSmall {
        symbol: String,
        notional: f64,
        minimum: f64,
    },

    #[error("Execution failed for {symbol}: {reason}")]
    ExecutionFailed { symbol: String, reason: String },

    #[error("Insufficient funds. Required: {required}, Available: {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Errors worth retrying at the venue boundary.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::TransientVenue { .. } | AppError::ApiCall { status: 429, .. }
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Initialization(format!("DB Migration failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_network_errors_are_transient() {
        let rate_limited = AppError::ApiCall {
            provider: "binance".into(),
            status: 429,
        };
        let network = AppError::TransientVenue {
            venue: "paper".into(),
            reason: "connection reset".into(),
        };
        let too_small = AppError::OrderTooSmall {
            symbol: "ETHUSDT".into(),
            notional: 1.0,
            minimum: 10.0,
        };
        assert!(rate_limited.is_transient());
        assert!(network.is_transient());
        assert!(!too_small.is_transient());
    }
}
