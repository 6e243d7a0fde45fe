//! Bureau automation worker runtime.

#![forbid(unsafe_code)]

mod runtime;
mod worker_config;

use std::sync::Arc;

use bureau_application::{AutomationEventQueue, AutomationService, SchedulerLeaseCoordinator};
use bureau_core::AppError;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::runtime::WorkerRuntime;
use crate::worker_config::WorkerConfig;

const SCHEDULER_LEASE_SCOPE: &str = "scheduler_tick";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let runtime = WorkerRuntime::build(&config).await?;
    let (event_queue, event_receiver) =
        AutomationEventQueue::bounded(config.event_queue_capacity)?;

    info!(
        worker_id = %config.worker_id,
        tick_seconds = config.tick_interval.as_secs(),
        lease_seconds = config.lease_seconds,
        event_queue_capacity = config.event_queue_capacity,
        "bureau-worker started"
    );

    let consumer_service = runtime.automation.clone();
    let consumer =
        tokio::spawn(async move { consumer_service.run_event_consumer(event_receiver).await });

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    let scheduler = run_scheduler(&runtime, &config, shutdown_receiver);
    tokio::pin!(scheduler);

    let interrupted = tokio::select! {
        () = &mut scheduler => false,
        signal = tokio::signal::ctrl_c() => {
            if let Err(error) = signal {
                error!(error = %error, "failed to listen for shutdown signal");
            }
            true
        }
    };

    if interrupted {
        info!(
            worker_id = %config.worker_id,
            "shutdown requested, letting the current tick finish"
        );
        shutdown_sender.send_replace(true);
        scheduler.await;
    }

    drop(event_queue);
    match consumer.await {
        Ok(consumed) => info!(consumed, "event consumer drained"),
        Err(error) => error!(error = %error, "event consumer task failed"),
    }

    Ok(())
}

/// Runs scheduler ticks until shutdown is signalled.
///
/// A tick in progress is never interrupted; the signal is honoured between ticks.
async fn run_scheduler(
    runtime: &WorkerRuntime,
    config: &WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        run_tick_under_lease(
            &runtime.automation,
            &runtime.lease_coordinator,
            config.worker_id.as_str(),
            config.lease_seconds,
        )
        .await;
    }

    info!(worker_id = %config.worker_id, "scheduler stopped");
}

async fn run_tick_under_lease(
    automation: &AutomationService,
    lease_coordinator: &Arc<dyn SchedulerLeaseCoordinator>,
    worker_id: &str,
    lease_seconds: u32,
) {
    let lease = match lease_coordinator
        .try_acquire_lease(SCHEDULER_LEASE_SCOPE, worker_id, lease_seconds)
        .await
    {
        Ok(Some(lease)) => lease,
        Ok(None) => {
            debug!(worker_id, "scheduler lease held elsewhere, skipping tick");
            return;
        }
        Err(error) => {
            warn!(worker_id, error = %error, "failed to acquire scheduler lease");
            return;
        }
    };

    match automation.run_scheduled_tick(Utc::now()).await {
        Ok(report) => info!(
            worker_id,
            tenants = report.tenants,
            executions = report.executions.len(),
            failed_tenants = report.failed_tenants,
            "scheduler tick finished"
        ),
        Err(error) => error!(worker_id, error = %error, "scheduler tick failed"),
    }

    if let Err(error) = lease_coordinator.release_lease(&lease).await {
        warn!(worker_id, error = %error, "failed to release scheduler lease");
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
