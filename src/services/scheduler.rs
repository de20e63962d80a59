//! Periodic background jobs.
//!
//! Each job is owned by a [`PeriodicTask`] that holds its interval, a tick
//! lock and the report of its last run. Ticks of the same task never overlap:
//! the timer loop awaits each tick, and [`PeriodicTask::run_now`] takes the
//! same lock as the timer.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Outcome of one tick of a background job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub job: &'static str,
    pub started_at: i64,
    pub finished_at: i64,
    /// Items (symbols or clients) discovered for this tick.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Margin calls raised during the tick.
    pub alerts: usize,
    /// Set when discovery itself failed and no items were processed.
    pub discovery_error: Option<String>,
}

impl TickReport {
    pub fn begin(job: &'static str) -> Self {
        Self {
            job,
            started_at: chrono::Utc::now().timestamp_millis(),
            finished_at: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            alerts: 0,
            discovery_error: None,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = chrono::Utc::now().timestamp_millis();
        self
    }
}

/// A unit of recurring work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Perform one full pass. Item-level failures are absorbed into the report.
    async fn tick(&self) -> TickReport;
}

/// Owns the schedule and last-run state of one job.
pub struct PeriodicTask<J: Job> {
    job: Arc<J>,
    interval: Duration,
    tick_lock: Mutex<()>,
    last_run: RwLock<Option<TickReport>>,
    runs: AtomicU64,
}

impl<J: Job> PeriodicTask<J> {
    pub fn new(job: Arc<J>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            job,
            interval,
            tick_lock: Mutex::new(()),
            last_run: RwLock::new(None),
            runs: AtomicU64::new(0),
        })
    }

    pub fn job(&self) -> &Arc<J> {
        &self.job
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of completed ticks.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Report of the most recent completed tick.
    pub async fn last_run(&self) -> Option<TickReport> {
        self.last_run.read().await.clone()
    }

    /// Run one tick now, waiting for any tick already in progress.
    pub async fn run_now(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;

        let report = self.job.tick().await;
        if report.failed > 0 || report.discovery_error.is_some() {
            warn!(
                "{} tick finished: {}/{} succeeded, {} failed, {} alerts",
                report.job, report.succeeded, report.attempted, report.failed, report.alerts
            );
        } else {
            info!(
                "{} tick finished: {}/{} succeeded, {} alerts",
                report.job, report.succeeded, report.attempted, report.alerts
            );
        }

        *self.last_run.write().await = Some(report.clone());
        self.runs.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Spawn the timer loop. The first tick fires one interval after start.
    ///
    /// Dropping the returned handle also stops the loop.
    pub fn start(self: Arc<Self>) -> TaskHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let name = self.job.name();
        let task = self.clone();

        let handle = tokio::spawn(async move {
            info!("Starting {} every {:?}", name, task.interval);

            let start = Instant::now() + task.interval;
            let mut ticker = tokio::time::interval_at(start, task.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        task.run_now().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Stopped {}", name);
        });

        TaskHandle {
            name,
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running [`PeriodicTask`] loop.
pub struct TaskHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop and wait for it. A tick in progress completes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!("{} task ended abnormally: {}", self.name, e);
        }
    }
}
