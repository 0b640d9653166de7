// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::AppError;
use crate::services::strategy::Strategy;
use crate::services::strategy::scout::{ScoutEngine, ScoutState, SkipReason, TickOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Single-holding bridge rotation over the scout engine.
pub struct DefaultStrategy {
    engine: Arc<ScoutEngine>,
    state: Mutex<ScoutState>,
    // Warmup publishes the latest fee here; the next tick picks it up.
    fee: watch::Sender<Option<f64>>,
}

impl DefaultStrategy {
    pub fn new(engine: Arc<ScoutEngine>) -> Self {
        let (fee, _) = watch::channel(None);
        Self {
            engine,
            state: Mutex::new(ScoutState::default()),
            fee,
        }
    }
}

#[async_trait]
impl Strategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn initialize(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        self.engine.initialize(&mut state).await?;
        tracing::info!(
            target: "strategy",
            strategy = self.name(),
            reserve = %self.engine.config().reserve,
            coins = self.engine.config().supported.len(),
            fee_rate = state.fee_rate,
            "Strategy initialized"
        );
        Ok(())
    }

    async fn tick(&self) -> TickOutcome {
        let Ok(mut state) = self.state.try_lock() else {
            tracing::debug!(target: "strategy", "Previous tick still running; skipping");
            return TickOutcome::Skipped(SkipReason::Busy);
        };
        let published_fee = *self.fee.borrow();
        if let Some(fee) = published_fee {
            state.fee_rate = fee;
        }
        self.engine.tick(&mut state).await
    }

    async fn warmup(&self) -> Result<(), AppError> {
        let fee = self.engine.warmup().await?;
        self.fee.send_replace(Some(fee));
        Ok(())
    }

    async fn on_shutdown(&self) {
        let state = self.state.lock().await;
        tracing::info!(
            target: "strategy",
            ticks = state.ticks,
            rotations = state.rotations,
            "Strategy stopped"
        );
    }

    async fn state(&self) -> ScoutState {
        self.state.lock().await.clone()
    }
}
