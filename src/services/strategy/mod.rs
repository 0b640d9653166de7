// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

pub mod default_strategy;
pub mod executor;
pub mod scout;

use crate::common::error::AppError;
use crate::services::strategy::default_strategy::DefaultStrategy;
use crate::services::strategy::scout::{ScoutEngine, ScoutState, TickOutcome};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

/// Decision strategy driven by the scheduler or the backtest loop.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&self) -> Result<(), AppError>;

    /// Never fails; overlapping calls are skipped.
    async fn tick(&self) -> TickOutcome;

    /// Refresh cached trading rules and fee.
    async fn warmup(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn on_shutdown(&self);

    /// Copy of the current decision state, for reporting.
    async fn state(&self) -> ScoutState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Default,
}

impl FromStr for StrategyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            other => Err(AppError::Config(format!("unknown strategy {other:?}"))),
        }
    }
}

pub fn build_strategy(kind: StrategyKind, engine: Arc<ScoutEngine>) -> Arc<dyn Strategy> {
    match kind {
        StrategyKind::Default => Arc::new(DefaultStrategy::new(engine)),
    }
}
