// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::data_path::{resolve_data_path, sqlite_url_for};
use crate::common::parsing::{parse_balance_map, parse_symbol_list};
use crate::common::retry::RetryPolicy;
use crate::domain::constants;
use crate::domain::error::AppError;
use crate::services::strategy::StrategyKind;
use crate::services::strategy::executor::OrderTimeouts;
use crate::services::strategy::scout::ScoutConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    // Trading
    #[serde(default = "default_reserve", alias = "bridge")]
    pub reserve: String,
    #[serde(
        default = "default_supported_coins",
        deserialize_with = "deserialize_symbol_list"
    )]
    pub supported_coins: Vec<String>,
    pub current_coin: Option<String>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Percent a candidate ratio must beat its stored reference by.
    #[serde(default = "default_scout_margin")]
    pub scout_margin: f64,
    #[serde(default = "default_scout_sleep_secs")]
    pub scout_sleep_secs: u64,
    #[serde(default = "default_scout_history_hours")]
    pub scout_history_hours: u64,
    /// Minutes before an open BUY is cancelled, 0 disables.
    #[serde(default)]
    pub buy_timeout_mins: u64,
    #[serde(default)]
    pub sell_timeout_mins: u64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    // Storage
    pub database_url: Option<String>,
    pub data_dir: Option<String>,
    pub price_cache_path: Option<String>,

    // Venue
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default, deserialize_with = "deserialize_balances")]
    pub paper_balances: HashMap<String, f64>,
    #[serde(default = "default_order_poll_ms")]
    pub order_poll_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    // Logging
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_json: bool,
}

fn default_reserve() -> String {
    constants::DEFAULT_RESERVE.to_string()
}
fn default_supported_coins() -> Vec<String> {
    constants::DEFAULT_SUPPORTED_COINS
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_strategy() -> String {
    constants::DEFAULT_STRATEGY.to_string()
}
fn default_scout_margin() -> f64 {
    5.0
}
fn default_scout_sleep_secs() -> u64 {
    5
}
fn default_scout_history_hours() -> u64 {
    1
}
fn default_fee_rate() -> f64 {
    constants::DEFAULT_FEE_RATE
}
fn default_api_base_url() -> String {
    constants::DEFAULT_API_BASE_URL.to_string()
}
fn default_order_poll_ms() -> u64 {
    1_000
}
fn default_retry_attempts() -> usize {
    5
}
fn default_retry_initial_delay_ms() -> u64 {
    200
}

fn deserialize_symbol_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{SeqAccess, Visitor};
    use std::fmt;

    struct SymbolsVisitor;

    impl<'de> Visitor<'de> for SymbolsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence of symbols or a space/comma separated string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(parse_symbol_list(v))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut raw = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                raw.push(elem);
            }
            Ok(parse_symbol_list(&raw.join(",")))
        }
    }

    deserializer.deserialize_any(SymbolsVisitor)
}

fn deserialize_balances<'de, D>(deserializer: D) -> Result<HashMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{Error, MapAccess, Visitor};
    use std::fmt;

    struct BalancesVisitor;

    impl<'de> Visitor<'de> for BalancesVisitor {
        type Value = HashMap<String, f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a table of balances or a string like \"USDT:100,BTC:0.5\"")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            parse_balance_map(v).map_err(E::custom)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out = HashMap::new();
            while let Some((symbol, amount)) = map.next_entry::<String, f64>()? {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(A::Error::custom(format!(
                        "balance for {symbol} must be a non-negative number"
                    )));
                }
                out.insert(symbol.trim().to_ascii_uppercase(), amount);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(BalancesVisitor)
}

impl Settings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.normalize();
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    fn normalize(&mut self) {
        self.reserve = self.reserve.trim().to_ascii_uppercase();
        self.current_coin = self
            .current_coin
            .as_deref()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty());
    }

    /// Reject settings the agent cannot start with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.reserve.is_empty() {
            return Err(AppError::Config("reserve symbol is empty".into()));
        }
        if self.supported_coins.is_empty() {
            return Err(AppError::Config("supported_coins is empty".into()));
        }
        if self.supported_coins.contains(&self.reserve) {
            return Err(AppError::Config(format!(
                "reserve {} must not be listed in supported_coins",
                self.reserve
            )));
        }
        if !self.scout_margin.is_finite() || self.scout_margin < 0.0 {
            return Err(AppError::Config(format!(
                "scout_margin must be a non-negative percentage, got {}",
                self.scout_margin
            )));
        }
        if !self.fee_rate.is_finite() || !(0.0..1.0).contains(&self.fee_rate) {
            return Err(AppError::Config(format!(
                "fee_rate must be in [0, 1), got {}",
                self.fee_rate
            )));
        }
        if let Some(coin) = &self.current_coin
            && !self.supported_coins.contains(coin)
        {
            return Err(AppError::Config(format!(
                "current_coin {coin} is not in supported_coins"
            )));
        }
        if self.scout_sleep_secs == 0 {
            return Err(AppError::Config("scout_sleep_secs must be positive".into()));
        }
        Url::parse(&self.api_base_url)
            .map_err(|e| AppError::Config(format!("invalid api_base_url: {e}")))?;
        self.strategy_kind()?;
        Ok(())
    }

    pub fn strategy_kind(&self) -> Result<StrategyKind, AppError> {
        StrategyKind::from_str(&self.strategy)
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| {
                let path = resolve_data_path(constants::DEFAULT_DATABASE_FILE, self.data_dir.as_deref());
                sqlite_url_for(&path)
            })
    }

    pub fn price_cache_url(&self) -> String {
        let raw = self
            .price_cache_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(constants::DEFAULT_PRICE_CACHE_FILE);
        if raw.starts_with("sqlite:") {
            return raw.to_string();
        }
        sqlite_url_for(&resolve_data_path(raw, self.data_dir.as_deref()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }

    pub fn order_timeouts(&self) -> OrderTimeouts {
        OrderTimeouts::from_minutes(self.buy_timeout_mins, self.sell_timeout_mins)
    }

    pub fn order_poll_interval(&self) -> Duration {
        Duration::from_millis(self.order_poll_ms.max(10))
    }

    pub fn scout_config(&self) -> ScoutConfig {
        ScoutConfig {
            reserve: self.reserve.clone(),
            supported: self.supported_coins.clone(),
            scout_margin: self.scout_margin,
            initial_coin: self.current_coin.clone(),
        }
    }

    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn base_settings() -> Settings {
        Settings {
            reserve: default_reserve(),
            supported_coins: vec!["BTC".into(), "ETH".into()],
            current_coin: None,
            strategy: default_strategy(),
            scout_margin: default_scout_margin(),
            scout_sleep_secs: default_scout_sleep_secs(),
            scout_history_hours: default_scout_history_hours(),
            buy_timeout_mins: 0,
            sell_timeout_mins: 0,
            fee_rate: default_fee_rate(),
            database_url: None,
            data_dir: None,
            price_cache_path: None,
            api_base_url: default_api_base_url(),
            paper_balances: HashMap::new(),
            order_poll_ms: default_order_poll_ms(),
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            debug: false,
            log_json: false,
        }
    }

    fn write_config(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("scoutbot-{}-{name}.toml", std::process::id()));
        std::fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn file_values_accept_string_lists_and_bridge_alias() {
        let _env_lock = env_lock_guard();
        let path = write_config(
            "lists",
            r#"
bridge = "busd"
supported_coins = "ada link, eth"
scout_margin = 0.8
paper_balances = "BUSD:250"
"#,
        );
        let settings = Settings::load_with_path(path.to_str()).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(settings.reserve, "BUSD");
        assert_eq!(settings.supported_coins, vec!["ADA", "LINK", "ETH"]);
        assert_eq!(settings.scout_margin, 0.8);
        assert_eq!(settings.paper_balances.get("BUSD"), Some(&250.0));
        assert_eq!(settings.scout_sleep_secs, 5);
        settings.validate().expect("valid");
    }

    #[test]
    fn table_balances_and_sequence_lists_are_accepted() {
        let _env_lock = env_lock_guard();
        let path = write_config(
            "tables",
            r#"
supported_coins = ["btc", "eth", "BTC"]
current_coin = "eth"

[paper_balances]
usdt = 100.0
"#,
        );
        let settings = Settings::load_with_path(path.to_str()).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(settings.supported_coins, vec!["BTC", "ETH"]);
        assert_eq!(settings.current_coin.as_deref(), Some("ETH"));
        assert_eq!(settings.paper_balances.get("USDT"), Some(&100.0));
    }

    #[test]
    fn env_overrides_file() {
        let _env_lock = env_lock_guard();
        let path = write_config("env", "scout_margin = 1.0\n");
        let old = std::env::var("SCOUT_MARGIN").ok();
        unsafe { std::env::set_var("SCOUT_MARGIN", "2.5") };

        let settings = Settings::load_with_path(path.to_str()).expect("load");

        match old {
            Some(v) => unsafe { std::env::set_var("SCOUT_MARGIN", v) },
            None => unsafe { std::env::remove_var("SCOUT_MARGIN") },
        }
        let _ = std::fs::remove_file(&path);
        assert_eq!(settings.scout_margin, 2.5);
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut settings = base_settings();
        settings.supported_coins.push("USDT".into());
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));

        let mut settings = base_settings();
        settings.supported_coins.clear();
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));

        let mut settings = base_settings();
        settings.scout_margin = -1.0;
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));

        let mut settings = base_settings();
        settings.current_coin = Some("DOGE".into());
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));

        let mut settings = base_settings();
        settings.strategy = "momentum".into();
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));

        assert!(base_settings().validate().is_ok());
    }

    #[test]
    fn derived_values() {
        let mut settings = base_settings();
        settings.buy_timeout_mins = 3;
        settings.data_dir = Some("/srv/scoutbot".into());
        settings.price_cache_path = Some("sqlite::memory:".into());

        let timeouts = settings.order_timeouts();
        assert_eq!(timeouts.buy, Some(chrono::Duration::seconds(180)));
        assert_eq!(timeouts.sell, None);
        assert_eq!(settings.price_cache_url(), "sqlite::memory:");
        assert_eq!(settings.retry_policy().max_attempts, 5);

        settings.database_url = Some("sqlite::memory:".into());
        assert_eq!(settings.database_url(), "sqlite::memory:");
        assert_eq!(settings.scout_config().supported, vec!["BTC", "ETH"]);
    }
}
