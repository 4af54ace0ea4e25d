//! Cream Background Worker
//!
//! Runs the scheduled reconciliation checks:
//! - Trial ending scan (hourly at :00)
//! - Trial ended scan (hourly at :15)
//! - Invoice payment-failure scan (hourly at :30)
//! - Worker heartbeat (every 5 minutes)
//!
//! Each check is a run-to-completion task. A run that fails or overruns is
//! simply retried at the next tick; the overlapping check windows and the
//! notification flags make that safe.

use std::sync::Arc;

use cream_billing::{
    BigPoppaClient, RedisEventBus, ReconcilerService, RunReport, StripeConfig, StripeProvider,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Environment-derived worker configuration. Fails fast on startup when a
/// required variable is missing.
struct WorkerConfig {
    big_poppa_url: String,
    stripe_secret_key: String,
    redis_url: String,
    event_stream_key: String,
}

impl WorkerConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            big_poppa_url: require_var("BIG_POPPA_URL")?,
            stripe_secret_key: require_var("STRIPE_SECRET_KEY")?,
            redis_url: require_var("REDIS_URL")?,
            event_stream_key: std::env::var("EVENT_STREAM_KEY")
                .unwrap_or_else(|_| "cream.events".to_string()),
        })
    }
}

fn require_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))
}

/// Log the outcome of one reconciler run, including every skip reason.
fn log_run_result(check: &str, result: Result<RunReport, cream_billing::ReconcileError>) {
    match result {
        Ok(report) => {
            info!(
                check = check,
                processed = report.processed.len(),
                skipped = report.skipped.len(),
                "Check complete"
            );
            for skipped in &report.skipped {
                info!(
                    check = check,
                    org_id = skipped.organization_id,
                    reason = %skipped.reason,
                    "Organization skipped"
                );
            }
        }
        Err(e) => {
            error!(check = check, error = %e, "Check aborted");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Cream Worker");

    let config = WorkerConfig::from_env()?;

    let directory = Arc::new(BigPoppaClient::new(config.big_poppa_url));
    let provider = Arc::new(StripeProvider::new(StripeConfig {
        secret_key: config.stripe_secret_key,
    }));
    let bus = Arc::new(RedisEventBus::connect(&config.redis_url, config.event_stream_key).await?);

    let service = Arc::new(ReconcilerService::new(directory, provider, bus));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Trial ending scan (hourly at :00)
    let trial_ending_service = service.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let service = trial_ending_service.clone();
            Box::pin(async move {
                info!("Running trial ending check");
                log_run_result("trial-ending", service.trial.check_trial_ending().await);
            })
        })?)
        .await?;
    info!("Scheduled: Trial ending check (hourly at :00)");

    // Job 2: Trial ended scan (hourly at :15)
    let trial_ended_service = service.clone();
    scheduler
        .add(Job::new_async("0 15 * * * *", move |_uuid, _l| {
            let service = trial_ended_service.clone();
            Box::pin(async move {
                info!("Running trial ended check");
                log_run_result("trial-ended", service.trial.check_trial_ended().await);
            })
        })?)
        .await?;
    info!("Scheduled: Trial ended check (hourly at :15)");

    // Job 3: Invoice payment-failure scan (hourly at :30)
    let payment_service = service.clone();
    scheduler
        .add(Job::new_async("0 30 * * * *", move |_uuid, _l| {
            let service = payment_service.clone();
            Box::pin(async move {
                info!("Running invoice payment failure check");
                log_run_result(
                    "invoice-payment-failed",
                    service
                        .payment_failure
                        .check_invoice_payment_failed_for_24_hours()
                        .await,
                );
            })
        })?)
        .await?;
    info!("Scheduled: Invoice payment failure check (hourly at :30)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Cream Worker started successfully with 4 scheduled jobs");

    // Keep the main task running; the scheduler runs jobs in background
    // tasks.
    loop {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    }
}
