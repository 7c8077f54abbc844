/// Background task implementations
use crate::{context::AppContext, db, error::RentalResult, metrics};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::warn;

/// Counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub reclaimed: usize,
    pub failed: usize,
}

/// Run one sweep pass on its own task. A panic anywhere in the pass comes
/// back as a `JoinError` instead of unwinding into the caller's loop.
pub async fn guarded_sweep_at(
    ctx: &AppContext,
    now: DateTime<Utc>,
) -> Result<Option<SweepSummary>, JoinError> {
    let ctx = ctx.clone();
    tokio::spawn(async move { sweep_expired_rentals_at(&ctx, now).await }).await
}

/// Reclaim rentals expired as of `now` and notify their requesters.
///
/// Returns `None` without touching anything while the system is stopped.
pub async fn sweep_expired_rentals_at(ctx: &AppContext, now: DateTime<Utc>) -> Option<SweepSummary> {
    if !ctx.control.is_running() {
        return None;
    }

    let started = Instant::now();
    let report = ctx.manager.sweep_at(now).await;

    join_all(report.reclaimed.iter().map(|r| {
        ctx.notifier
            .on_reclaim(&r.rental, &r.account, &r.new_password, r.reason)
    }))
    .await;

    for (rental_id, reason) in &report.failures {
        warn!(rental_id = %rental_id, "Expired rental left open: {}", reason);
    }

    let status = if report.failures.is_empty() {
        "success"
    } else {
        "partial"
    };
    metrics::record_background_job("expiry_sweep", status, started.elapsed().as_secs_f64());

    Some(SweepSummary {
        reclaimed: report.reclaimed.len(),
        failed: report.failures.len(),
    })
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> RentalResult<()> {
    db::test_connection(&ctx.db).await
}
