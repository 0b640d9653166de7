// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::collections::HashMap;

/// Split a symbol list on whitespace or commas, uppercase it and drop duplicates
/// while keeping the first-seen order.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in raw.split(|c: char| c.is_whitespace() || c == ',') {
        let symbol = token.trim().to_ascii_uppercase();
        if symbol.is_empty() || out.contains(&symbol) {
            continue;
        }
        out.push(symbol);
    }
    out
}

/// Parse `USDT:100,BTC:0.5` (or whitespace separated) into a balance map.
pub fn parse_balance_map(raw: &str) -> Result<HashMap<String, f64>, String> {
    let mut out = HashMap::new();
    for token in raw.split(|c: char| c.is_whitespace() || c == ',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (symbol, amount) = token
            .split_once(['=', ':'])
            .ok_or_else(|| format!("expected SYMBOL:AMOUNT, got {token:?}"))?;
        let amount: f64 = amount
            .trim()
            .parse()
            .map_err(|e| format!("invalid amount for {symbol}: {e}"))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(format!("amount for {symbol} must be a non-negative number"));
        }
        out.insert(symbol.trim().to_ascii_uppercase(), amount);
    }
    Ok(out)
}
