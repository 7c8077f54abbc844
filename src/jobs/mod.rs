use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::{context::AppContext, metrics};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expiry_sweep_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Reclaim expired rentals on a fixed cadence. A failed or panicked pass
    /// is logged and the loop carries on.
    async fn expiry_sweep_job(scheduler: Arc<Self>) {
        let period = Duration::from_secs(scheduler.context.config.sweeper.interval_secs.max(1));
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry sweeper running every {:?}", period);

        loop {
            interval.tick().await;

            match tasks::guarded_sweep_at(&scheduler.context, Utc::now()).await {
                Ok(Some(summary)) if summary.reclaimed > 0 || summary.failed > 0 => {
                    info!(
                        "Expiry sweep reclaimed {} rentals ({} failed)",
                        summary.reclaimed, summary.failed
                    );
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    // System stopped
                }
                Err(e) => {
                    metrics::record_background_job("expiry_sweep", "panic", 0.0);
                    error!("Expiry sweep pass aborted, retrying next tick: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes by default)
    async fn health_check_job(scheduler: Arc<Self>) {
        let period =
            Duration::from_secs(scheduler.context.config.sweeper.health_interval_secs.max(1));
        let mut interval = interval(period);

        loop {
            interval.tick().await;
            let started = std::time::Instant::now();

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    metrics::record_background_job(
                        "health_check",
                        "success",
                        started.elapsed().as_secs_f64(),
                    );
                }
                Err(e) => {
                    metrics::record_background_job(
                        "health_check",
                        "failure",
                        started.elapsed().as_secs_f64(),
                    );
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
