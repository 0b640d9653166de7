// SPDX-License-Identifier: MIT
// Thirty days of per-minute value snapshots through the compactor.

mod common;

use chrono::{Datelike, Duration};
use common::t0;
use scoutbot::common::clock::{SharedClock, VirtualClock};
use scoutbot::domain::models::{NewCoinValue, Tier};
use scoutbot::infrastructure::data::db::Database;
use scoutbot::services::compactor::HistoryCompactor;
use std::collections::HashSet;
use std::sync::Arc;

const MINUTES_IN_30_DAYS: i64 = 30 * 24 * 60;

#[tokio::test]
async fn thirty_days_of_minutes_compacts_to_tiers() {
    let db = Database::new("sqlite::memory:").await.expect("db");
    let last = t0();
    let now = last + Duration::seconds(30);
    let clock: SharedClock = Arc::new(VirtualClock::new(now));

    let snapshots: Vec<NewCoinValue> = (0..MINUTES_IN_30_DAYS)
        .rev()
        .map(|k| NewCoinValue {
            symbol: "BTC".into(),
            balance: 0.01,
            btc_value: Some(0.01),
            reserve_value: Some(500.0),
            timestamp: last - Duration::minutes(k),
        })
        .collect();
    let expected_weeks: HashSet<(i32, u32)> = snapshots
        .iter()
        .map(|s| {
            let w = s.timestamp.iso_week();
            (w.year(), w.week())
        })
        .collect();
    db.insert_coin_values(&snapshots).await.expect("insert");

    let compactor = HistoryCompactor::new(db.clone(), clock, 1);
    let report = compactor.compact().await.expect("compact");
    assert!(report.promoted > 0);
    assert!(report.deleted > 0);

    let values = db.coin_values().await.expect("values");
    let day_ago = now - Duration::hours(24);

    let recent = values.iter().filter(|v| v.timestamp > day_ago).count();
    assert_eq!(recent, 1_440);
    assert!(
        values
            .iter()
            .filter(|v| v.tier == Tier::Minutely)
            .all(|v| v.timestamp >= day_ago)
    );

    let count = |tier: Tier| values.iter().filter(|v| v.tier == tier).count();
    assert!(count(Tier::Hourly) <= 28 * 24);
    assert!(count(Tier::Daily) <= 365);
    assert_eq!(count(Tier::Weekly), expected_weeks.len());

    // nothing left to do on a second pass
    let again = compactor.compact().await.expect("compact again");
    assert_eq!(again.promoted, 0);
    assert_eq!(again.deleted, 0);
}

#[tokio::test]
async fn scout_log_older_than_window_is_pruned() {
    use scoutbot::domain::models::ScoutLogEntry;

    let db = Database::new("sqlite::memory:").await.expect("db");
    db.set_coins("USDT", &["BTC".into(), "ETH".into()])
        .await
        .expect("coins");
    let pair = db.pair("BTC", "ETH").await.expect("pair").expect("some");
    let now = t0();
    let entry = |minutes_ago: i64| ScoutLogEntry {
        pair_id: pair.id,
        target_ratio: 0.05,
        current_coin_price: 50_000.0,
        other_coin_price: 2_500.0,
        timestamp: now - Duration::minutes(minutes_ago),
    };
    db.log_scouts(&[entry(90), entry(61), entry(30), entry(0)])
        .await
        .expect("log");

    let compactor = HistoryCompactor::new(db.clone(), Arc::new(VirtualClock::new(now)), 1);
    assert_eq!(compactor.prune_scout_log().await.expect("prune"), 2);
    assert_eq!(db.scout_log().await.expect("log").len(), 2);
}
