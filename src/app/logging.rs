// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const QUIET_MODULES: &[&str] = &[
    "h2=info",
    "hyper=info",
    "hyper_util=info",
    "reqwest=info",
    "rustls=info",
    "sqlx=warn",
];

/// Build the filter directive string for `log_level`.
///
/// A bare level gets the quiet-module defaults appended; anything containing
/// `,` or `=` is taken as a full directive string.
pub fn filter_directives(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.contains(',') || normalized.contains('=') {
        return normalized.to_string();
    }
    let base = if normalized.is_empty() {
        "info"
    } else {
        normalized
    };
    format!("{base},{}", QUIET_MODULES.join(","))
}

pub fn setup_logging(log_level: &str, json_format: bool) {
    let filter_spec = filter_directives(log_level);
    let filter = EnvFilter::from_str(&filter_spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    // try_init so the backtest binary and tests can call this more than once
    let installed = if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        subscriber.with(json_layer).try_init().is_ok()
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).try_init().is_ok()
    };
    if !installed {
        return;
    }

    let base = filter_spec.split(',').next().unwrap_or("info");
    tracing::info!(
        base,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_gets_quiet_defaults() {
        let spec = filter_directives("debug");
        assert!(spec.starts_with("debug,"));
        assert!(spec.contains("sqlx=warn"));
        assert_eq!(filter_directives(" "), format!("info,{}", QUIET_MODULES.join(",")));
    }

    #[test]
    fn custom_directives_pass_through() {
        assert_eq!(filter_directives("scout=trace,info"), "scout=trace,info");
    }
}
