// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::from_millis;
use crate::common::error::AppError;
use crate::domain::models::TickerSnapshot;
use crate::infrastructure::network::venue::{MarketRules, PriceSource, SymbolRules};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const PROVIDER: &str = "binance";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize, Debug)]
struct BinanceTicker {
    symbol: String,
    price: String,
}

#[derive(Deserialize, Debug)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize, Debug)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: String },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: String },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: String },
    #[serde(other)]
    Other,
}

/// Public (unauthenticated) Binance spot market data.
#[derive(Clone)]
pub struct BinanceRest {
    client: Client,
    base: Url,
}

impl BinanceRest {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base = Url::parse(base_url).map_err(|e| AppError::Config(format!(
            "invalid api_base_url {base_url}: {e}"
        )))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Initialization(format!("HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| AppError::Config(format!("bad endpoint {path}: {e}")))?;
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::TransientVenue {
                venue: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(AppError::TransientVenue {
                venue: PROVIDER.into(),
                reason: format!("{path} returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(AppError::ApiCall {
                provider: PROVIDER.into(),
                status: status.as_u16(),
            });
        }
        resp.json::<T>().await.map_err(|_| AppError::ApiCall {
            provider: format!("{PROVIDER} JSON"),
            status: 0,
        })
    }
}

fn parse_price(symbol: &str, raw: &str) -> Result<f64, AppError> {
    raw.parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| AppError::PriceUnavailable(symbol.to_string()))
}

fn kline_point(symbol: &str, row: &[serde_json::Value]) -> Option<(DateTime<Utc>, f64)> {
    let open_time = row.first()?.as_i64()?;
    let open = row.get(1)?.as_str()?;
    let price = parse_price(symbol, open).ok()?;
    Some((from_millis(open_time), price))
}

#[async_trait]
impl PriceSource for BinanceRest {
    async fn current_price(&self, symbol: &str) -> Result<f64, AppError> {
        let ticker: BinanceTicker = self
            .get_json("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        parse_price(&ticker.symbol, &ticker.price)
    }

    async fn all_ticker_prices(&self) -> Result<TickerSnapshot, AppError> {
        let tickers: Vec<BinanceTicker> = self.get_json("/api/v3/ticker/price", &[]).await?;
        Ok(tickers
            .into_iter()
            .filter_map(|t| parse_price(&t.symbol, &t.price).ok().map(|p| (t.symbol, p)))
            .collect())
    }

    async fn historical_prices(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, AppError> {
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", "1m".to_string()),
            ("startTime", from.timestamp_millis().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(to) = to {
            query.push(("endTime", to.timestamp_millis().to_string()));
        }
        let rows: Vec<Vec<serde_json::Value>> = self.get_json("/api/v3/klines", &query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| kline_point(symbol, row))
            .collect())
    }
}

#[async_trait]
impl MarketRules for BinanceRest {
    async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, AppError> {
        let info: ExchangeInfo = self
            .get_json("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await?;
        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| AppError::PriceUnavailable(symbol.to_string()))?;
        rules_from_filters(symbol, &entry.filters)
    }
}

fn rules_from_filters(symbol: &str, filters: &[SymbolFilter]) -> Result<SymbolRules, AppError> {
    let mut step_size = None;
    let mut min_notional = None;
    for filter in filters {
        match filter {
            SymbolFilter::LotSize { step_size: raw } => {
                step_size = Decimal::from_str(raw).ok().map(|d| d.normalize());
            }
            SymbolFilter::MinNotional { min_notional: raw }
            | SymbolFilter::Notional { min_notional: raw } => {
                min_notional = raw.parse::<f64>().ok();
            }
            SymbolFilter::Other => {}
        }
    }
    let step_size = step_size
        .filter(|s| !s.is_zero())
        .ok_or_else(|| AppError::Validation {
            field: format!("{symbol}.LOT_SIZE"),
            message: "missing or zero step size".into(),
        })?;
    Ok(SymbolRules {
        step_size,
        min_notional: min_notional.unwrap_or(0.0),
    })
}
