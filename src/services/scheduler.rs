//! Timer-driven writes.
//!
//! A `Scheduler` ticks on a fixed interval and, for every tick, performs the
//! scheduled entry point: one write registered as detached work on a
//! `TaskTracker`. Nothing awaits the write from the tick itself; the host
//! closes and waits on the tracker during shutdown so in-flight writes finish.

use crate::{models::payload::WritePayload, services::worker_service::WorkerService};
use chrono::Utc;
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

/// Describes one timer firing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduledController {
    /// Epoch milliseconds the trigger was scheduled for, when known.
    pub scheduled_time: Option<i64>,
}

impl ScheduledController {
    pub fn now() -> Self {
        Self {
            scheduled_time: Some(Utc::now().timestamp_millis()),
        }
    }
}

/// Handle a timer firing: spawn one write on `tracker` and return immediately.
///
/// A failed write is logged once by `WorkerService::write_object`; there is
/// no recovery.
pub fn scheduled(
    service: &WorkerService,
    tracker: &TaskTracker,
    controller: ScheduledController,
) -> JoinHandle<()> {
    info!(
        "cron processed at: {}",
        controller
            .scheduled_time
            .map_or_else(|| "unknown".to_string(), |ts| ts.to_string())
    );
    let ts = controller
        .scheduled_time
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    let payload = WritePayload::scheduled(ts);
    let service = service.clone();

    tracker.spawn(async move {
        let _ = service.write_object(&payload).await;
    })
}

pub struct Scheduler {
    service: WorkerService,
    tracker: TaskTracker,
    period: Duration,
}

impl Scheduler {
    pub fn new(service: WorkerService, tracker: TaskTracker, period: Duration) -> Self {
        Self {
            service,
            tracker,
            period,
        }
    }

    /// Spawns the timer loop. It stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(shutdown).await;
        })
    }

    async fn run_loop(&self, shutdown: CancellationToken) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Scheduler started (interval: {:?})", self.period);

        // Skip the first tick (fires immediately)
        timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler stopped");
                    break;
                }
                _ = timer.tick() => {
                    scheduled(&self.service, &self.tracker, ScheduledController::now());
                }
            }
        }
    }
}
