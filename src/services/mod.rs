// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

pub mod backtest;
pub mod compactor;
pub mod precision;
pub mod scheduler;
pub mod strategy;
