// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::clock::SharedClock;
use crate::common::error::AppError;
use crate::domain::constants::{daily_retention, hourly_retention, minutely_retention};
use crate::domain::models::{CoinValueSnapshot, CompactionPlan, Tier};
use crate::infrastructure::data::db::Database;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Hour(i64),
    Day(NaiveDate),
    Week(i32, u32),
}

fn bucket_for(tier: Tier, ts: DateTime<Utc>) -> Option<Bucket> {
    match tier {
        Tier::Minutely => None,
        Tier::Hourly => Some(Bucket::Hour(ts.timestamp().div_euclid(3_600))),
        Tier::Daily => Some(Bucket::Day(ts.date_naive())),
        Tier::Weekly => {
            let week = ts.iso_week();
            Some(Bucket::Week(week.year(), week.week()))
        }
    }
}

fn expired(tier: Tier, ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let max_age = match tier {
        Tier::Minutely => minutely_retention(),
        Tier::Hourly => hourly_retention(),
        Tier::Daily => daily_retention(),
        Tier::Weekly => return false,
    };
    ts < now - max_age
}

/// Compute tier promotions and retention deletions for `snapshots`.
///
/// Per asset and per hour/day/ISO-week bucket, the earliest snapshot
/// (timestamp, then id) is promoted unless the bucket already holds one at that
/// tier or coarser. Tiers only go up. Running the plan twice yields an empty
/// second plan.
pub fn plan_compaction(snapshots: &[CoinValueSnapshot], now: DateTime<Utc>) -> CompactionPlan {
    let mut ordered: Vec<&CoinValueSnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| {
        (a.symbol.as_str(), a.timestamp, a.id).cmp(&(b.symbol.as_str(), b.timestamp, b.id))
    });

    let mut tiers: HashMap<i64, Tier> = ordered.iter().map(|s| (s.id, s.tier)).collect();

    for level in [Tier::Hourly, Tier::Daily, Tier::Weekly] {
        // (symbol, bucket) -> (earliest id, bucket already tagged)
        let mut buckets: HashMap<(&str, Bucket), (i64, bool)> = HashMap::new();
        for snap in &ordered {
            let Some(bucket) = bucket_for(level, snap.timestamp) else {
                continue;
            };
            let tier = tiers.get(&snap.id).copied().unwrap_or(snap.tier);
            let entry = buckets
                .entry((snap.symbol.as_str(), bucket))
                .or_insert((snap.id, false));
            if tier >= level {
                entry.1 = true;
            }
        }
        for ((_, _), (id, tagged)) in buckets {
            if !tagged {
                tiers.insert(id, level);
            }
        }
    }

    let mut plan = CompactionPlan::default();
    for snap in &ordered {
        let tier = tiers.get(&snap.id).copied().unwrap_or(snap.tier);
        if expired(tier, snap.timestamp, now) {
            plan.deletions.push(snap.id);
        } else if tier > snap.tier {
            plan.promotions.push((snap.id, tier));
        }
    }
    plan
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub promoted: u64,
    pub deleted: u64,
}

/// Tiers the value history and trims the scout log.
#[derive(Clone)]
pub struct HistoryCompactor {
    db: Database,
    clock: SharedClock,
    scout_history: Duration,
}

impl HistoryCompactor {
    pub fn new(db: Database, clock: SharedClock, scout_history_hours: u64) -> Self {
        Self {
            db,
            clock,
            scout_history: Duration::hours(scout_history_hours as i64),
        }
    }

    pub async fn compact(&self) -> Result<CompactionReport, AppError> {
        let now = self.clock.now();
        let snapshots = self.db.coin_values().await?;
        let plan = plan_compaction(&snapshots, now);
        let (promoted, deleted) = self.db.apply_compaction(&plan).await?;
        tracing::info!(
            target: "compactor",
            scanned = snapshots.len(),
            promoted,
            deleted,
            "Value history compacted"
        );
        Ok(CompactionReport { promoted, deleted })
    }

    pub async fn prune_scout_log(&self) -> Result<u64, AppError> {
        let cutoff = self.clock.now() - self.scout_history;
        let removed = self.db.prune_scout_log(cutoff).await?;
        if removed > 0 {
            tracing::debug!(target: "compactor", removed, "Scout log pruned");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snap(id: i64, symbol: &str, ts: DateTime<Utc>, tier: Tier) -> CoinValueSnapshot {
        CoinValueSnapshot {
            id,
            symbol: symbol.to_string(),
            balance: 1.0,
            btc_value: Some(1.0),
            reserve_value: Some(1.0),
            timestamp: ts,
            tier,
        }
    }

    #[test]
    fn earliest_of_each_bucket_is_promoted_per_asset() {
        // Monday 2024-01-01 00:00 starts ISO week 1
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = base + Duration::hours(2);
        let snaps = vec![
            snap(1, "BTC", base, Tier::Minutely),
            snap(2, "BTC", base + Duration::minutes(1), Tier::Minutely),
            snap(3, "BTC", base + Duration::minutes(61), Tier::Minutely),
            snap(4, "ETH", base + Duration::minutes(1), Tier::Minutely),
        ];
        let plan = plan_compaction(&snaps, now);
        let promoted: HashMap<i64, Tier> = plan.promotions.into_iter().collect();
        assert_eq!(promoted.get(&1), Some(&Tier::Weekly));
        assert_eq!(promoted.get(&2), None);
        assert_eq!(promoted.get(&3), Some(&Tier::Hourly));
        assert_eq!(promoted.get(&4), Some(&Tier::Weekly));
        assert!(plan.deletions.is_empty());
    }

    #[test]
    fn same_timestamp_ties_go_to_insertion_order() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let snaps = vec![
            snap(8, "BTC", at, Tier::Minutely),
            snap(7, "BTC", at, Tier::Minutely),
        ];
        let plan = plan_compaction(&snaps, at);
        assert_eq!(plan.promotions, vec![(7, Tier::Weekly)]);
    }

    #[test]
    fn tagged_buckets_are_left_alone() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        // a late write earlier than the existing hourly representative
        let snaps = vec![
            snap(1, "BTC", at + Duration::minutes(5), Tier::Weekly),
            snap(2, "BTC", at, Tier::Minutely),
        ];
        let plan = plan_compaction(&snaps, at + Duration::minutes(10));
        assert!(plan.is_empty(), "unexpected plan {plan:?}");
    }

    #[test]
    fn retention_drops_expired_fine_tiers_only() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let snaps = vec![
            snap(1, "BTC", now - Duration::days(400), Tier::Weekly),
            snap(2, "BTC", now - Duration::days(400) + Duration::minutes(1), Tier::Daily),
            snap(3, "BTC", now - Duration::days(30), Tier::Hourly),
            snap(4, "BTC", now - Duration::hours(25), Tier::Minutely),
            snap(5, "BTC", now - Duration::hours(1), Tier::Minutely),
        ];
        let plan = plan_compaction(&snaps, now);
        let mut deleted = plan.deletions.clone();
        deleted.sort();
        assert!(deleted.contains(&2));
        assert!(!deleted.contains(&1));
        assert!(!deleted.contains(&5));
    }

    #[test]
    fn second_plan_is_empty() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let now = start + Duration::days(3);
        let mut snaps: Vec<CoinValueSnapshot> = (0..(3 * 24 * 6))
            .map(|i| snap(i + 1, "BTC", start + Duration::minutes(10 * i), Tier::Minutely))
            .collect();

        let plan = plan_compaction(&snaps, now);
        let promoted: HashMap<i64, Tier> = plan.promotions.iter().copied().collect();
        snaps.retain(|s| !plan.deletions.contains(&s.id));
        for s in &mut snaps {
            if let Some(t) = promoted.get(&s.id) {
                s.tier = *t;
            }
        }
        assert!(plan_compaction(&snaps, now).is_empty());
    }
}
