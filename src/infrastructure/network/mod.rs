// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod venue;
pub use venue::{AccountSource, MarketRules, OrderVenue, PriceSource};

pub mod binance;
pub mod paper;
