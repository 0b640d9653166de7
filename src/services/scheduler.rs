// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::constants::{
    COMPACTION_INTERVAL_SECS, SCOUT_PRUNE_INTERVAL_SECS, VALUE_SNAPSHOT_INTERVAL_SECS,
    WARMUP_INTERVAL_SECS,
};
use crate::common::error::AppError;
use crate::services::compactor::HistoryCompactor;
use crate::services::strategy::Strategy;
use crate::services::strategy::scout::ScoutEngine;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub scout: Duration,
    pub values: Duration,
    pub scout_prune: Duration,
    pub compaction: Duration,
    pub warmup: Duration,
}

impl Cadence {
    pub fn with_scout_secs(scout_secs: u64) -> Self {
        Self {
            scout: Duration::from_secs(scout_secs.max(1)),
            values: Duration::from_secs(VALUE_SNAPSHOT_INTERVAL_SECS),
            scout_prune: Duration::from_secs(SCOUT_PRUNE_INTERVAL_SECS),
            compaction: Duration::from_secs(COMPACTION_INTERVAL_SECS),
            warmup: Duration::from_secs(WARMUP_INTERVAL_SECS),
        }
    }
}

type Job = Arc<dyn Fn() -> BoxFuture<'static, Result<(), AppError>> + Send + Sync>;

/// Runs the periodic jobs, each in its own task, until shutdown.
pub struct Scheduler {
    strategy: Arc<dyn Strategy>,
    engine: Arc<ScoutEngine>,
    compactor: HistoryCompactor,
    cadence: Cadence,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        strategy: Arc<dyn Strategy>,
        engine: Arc<ScoutEngine>,
        compactor: HistoryCompactor,
        cadence: Cadence,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            strategy,
            engine,
            compactor,
            cadence,
            shutdown,
        }
    }

    fn spawn_job(
        &self,
        tasks: &mut JoinSet<()>,
        name: &'static str,
        period: Duration,
        job: Job,
    ) {
        let shutdown = self.shutdown.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // A run that overruns its period swallows the missed ticks.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let started = Instant::now();
                if let Err(e) = job().await {
                    tracing::warn!(target: "scheduler", job = name, error = %e, "Job failed");
                }
                tracing::debug!(
                    target: "scheduler",
                    job = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job finished"
                );
            }
            tracing::debug!(target: "scheduler", job = name, "Job stopped");
        });
    }

    pub async fn run(self) -> Result<(), AppError> {
        let mut tasks = JoinSet::new();

        let strategy = self.strategy.clone();
        self.spawn_job(
            &mut tasks,
            "scout",
            self.cadence.scout,
            Arc::new(move || {
                let strategy = strategy.clone();
                async move {
                    strategy.tick().await;
                    Ok::<(), AppError>(())
                }
                .boxed()
            }),
        );

        let engine = self.engine.clone();
        self.spawn_job(
            &mut tasks,
            "update_values",
            self.cadence.values,
            Arc::new(move || {
                let engine = engine.clone();
                async move { engine.update_values().await.map(|_| ()) }.boxed()
            }),
        );

        let compactor = self.compactor.clone();
        self.spawn_job(
            &mut tasks,
            "prune_scout_log",
            self.cadence.scout_prune,
            Arc::new(move || {
                let compactor = compactor.clone();
                async move { compactor.prune_scout_log().await.map(|_| ()) }.boxed()
            }),
        );

        let compactor = self.compactor.clone();
        self.spawn_job(
            &mut tasks,
            "compact_values",
            self.cadence.compaction,
            Arc::new(move || {
                let compactor = compactor.clone();
                async move { compactor.compact().await.map(|_| ()) }.boxed()
            }),
        );

        let strategy = self.strategy.clone();
        self.spawn_job(
            &mut tasks,
            "warmup",
            self.cadence.warmup,
            Arc::new(move || {
                let strategy = strategy.clone();
                async move { strategy.warmup().await }.boxed()
            }),
        );

        tracing::info!(
            target: "scheduler",
            scout_secs = self.cadence.scout.as_secs(),
            "Scheduler started"
        );

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(target: "scheduler", error = %e, "Job task panicked");
            }
        }
        self.strategy.on_shutdown().await;
        tracing::info!(target: "scheduler", "Scheduler stopped");
        Ok(())
    }
}
