//! Background task that applies due upgrades and maturities.
//!
//! Reads already refresh investments on access; the sweeper makes sure
//! investments nobody looks at still complete on time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::db;
use crate::errors::Result;
use crate::lifecycle::{self, Refresh};

pub struct SweeperState {
    pub pool: SqlitePool,
    pub clock: Clock,
    pub interval_secs: u64,
}

/// Run until `shutdown` is cancelled.
pub async fn run(state: Arc<SweeperState>, shutdown: CancellationToken) {
    info!("Sweeper starting (every {}s)", state.interval_secs);

    loop {
        match sweep_once(&state.pool, &state.clock).await {
            Ok(0) => debug!("Sweep: nothing due"),
            Ok(n) => info!("Sweep: refreshed {n} investment(s)"),
            Err(e) => error!("Sweep error: {e}"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Sweeper stopped");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(state.interval_secs)) => {}
        }
    }
}

/// Refresh every due investment; returns how many changed.
pub async fn sweep_once(pool: &SqlitePool, clock: &Clock) -> Result<usize> {
    let now = clock.now();
    let due = db::investments::due_for_refresh(pool, now.timestamp()).await?;
    let mut changed = 0;

    for inv in due {
        if refresh_one(pool, inv.id, now).await?.is_some() {
            changed += 1;
        }
    }

    Ok(changed)
}

/// Re-read one investment inside a write transaction, refresh it and
/// persist the outcome. The due list is only a hint: rows can change
/// between the scan and this write.
pub async fn refresh_one(
    pool: &SqlitePool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Refresh>> {
    let mut tx = pool.begin().await?;
    let Some(mut inv) = db::investments::find(&mut *tx, id).await? else {
        return Ok(None);
    };
    let outcome = lifecycle::refresh(&mut inv, now);
    if !outcome.changed() {
        return Ok(None);
    }

    db::investments::save(&mut *tx, &inv).await?;
    if outcome.upgrade_activated {
        db::activity::audit(
            &mut *tx,
            Some(inv.user_id),
            Some(inv.id),
            "upgrade_activated",
            &json!({ "package": inv.package, "rate": inv.effective_rate }),
            now.timestamp(),
        )
        .await?;
    }
    if outcome.matured {
        db::activity::audit(
            &mut *tx,
            Some(inv.user_id),
            Some(inv.id),
            "investment_completed",
            &json!({ "accumulated_interest": inv.accumulated_interest }),
            now.timestamp(),
        )
        .await?;
    }
    tx.commit().await?;
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::lifecycle::tests::{at, pending_investment};
    use crate::models::{Investment, InvestmentStatus};
    use crate::packages::Package;

    async fn active(pool: &SqlitePool, amount: f64, months: i64) -> Investment {
        let uid = db::users::insert_user(pool, "s@x.io", "S", None, 0).await.unwrap();
        let mut inv = pending_investment(amount, months);
        inv.user_id = uid;
        inv.id = db::investments::insert(pool, &inv).await.unwrap();
        lifecycle::activate(&mut inv, at(2025, 1, 1)).unwrap();
        db::investments::save(pool, &inv).await.unwrap();
        inv
    }

    #[tokio::test]
    async fn completes_matured_investments() {
        let pool = memory_pool().await;
        let inv = active(&pool, 600.0, 3).await;

        let clock = Clock::manual(at(2025, 3, 1));
        assert_eq!(sweep_once(&pool, &clock).await.unwrap(), 0);

        clock.advance(chrono::Duration::days(40));
        assert_eq!(sweep_once(&pool, &clock).await.unwrap(), 1);

        let stored = db::investments::find(&pool, inv.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvestmentStatus::Completed);
        assert!((stored.accumulated_interest - 600.0 * 14.0 / 30.0 * 90.0 / 100.0).abs() < 1e-6);

        // Completed rows are no longer picked up.
        assert_eq!(sweep_once(&pool, &clock).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn activates_due_upgrades() {
        let pool = memory_pool().await;
        let mut inv = active(&pool, 990.0, 3).await;
        lifecycle::reinvest_profit(&mut inv, 20.0, at(2025, 1, 11)).unwrap();
        db::investments::save(&pool, &inv).await.unwrap();
        assert_eq!(inv.upgrade_activation_at, Some(at(2025, 1, 15).timestamp()));

        let clock = Clock::manual(at(2025, 1, 14));
        assert_eq!(sweep_once(&pool, &clock).await.unwrap(), 0);

        clock.advance(chrono::Duration::days(1));
        assert_eq!(sweep_once(&pool, &clock).await.unwrap(), 1);
        let stored = db::investments::find(&pool, inv.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvestmentStatus::Active);
        assert_eq!(stored.package, Package::Advanced);
        assert_eq!(stored.effective_rate, 17.0);
        assert!(stored.upgrade_activation_at.is_none());
        assert_eq!(stored.last_rebase_at, Some(at(2025, 1, 15).timestamp()));
    }

    #[tokio::test]
    async fn activates_upgrades_on_a_pinned_clock() {
        let pool = memory_pool().await;
        let mut inv = active(&pool, 990.0, 3).await;
        lifecycle::reinvest_profit(&mut inv, 20.0, at(2025, 1, 11)).unwrap();
        inv.simulated_now = Some(at(2025, 1, 20).timestamp());
        db::investments::save(&pool, &inv).await.unwrap();

        // The wall clock is before activation; the pinned one is past it.
        let clock = Clock::manual(at(2025, 1, 12));
        assert_eq!(sweep_once(&pool, &clock).await.unwrap(), 1);
        let stored = db::investments::find(&pool, inv.id).await.unwrap().unwrap();
        assert_eq!(stored.package, Package::Advanced);
        assert!(stored.pending_rate.is_none());
    }

    #[tokio::test]
    async fn refresh_rereads_rows_changed_after_the_scan() {
        let pool = memory_pool().await;
        let inv = active(&pool, 600.0, 3).await;
        let now = at(2025, 5, 1);
        let due = db::investments::due_for_refresh(&pool, now.timestamp()).await.unwrap();
        assert_eq!(due.len(), 1);

        // A profit reservation commits between the scan and the refresh.
        let mut current = db::investments::find(&pool, inv.id).await.unwrap().unwrap();
        current.withdrawn_profits = 50.0;
        db::investments::save(&pool, &current).await.unwrap();

        let outcome = refresh_one(&pool, due[0].id, now).await.unwrap().unwrap();
        assert!(outcome.matured);
        let stored = db::investments::find(&pool, inv.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvestmentStatus::Completed);
        assert_eq!(stored.withdrawn_profits, 50.0);

        // Nothing left to do for a completed row.
        assert!(refresh_one(&pool, inv.id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let pool = memory_pool().await;
        let token = CancellationToken::new();
        let state = Arc::new(SweeperState {
            pool,
            clock: Clock::System,
            interval_secs: 3600,
        });
        let handle = tokio::spawn(run(state, token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
