//! Timer-driven sweep scheduling
//!
//! Every sweep (plus the extraction health check) runs on its own task with
//! its own interval. A sweep never overlaps with itself: a tick that comes
//! due while the previous run is still going is delayed, not queued.
//! Different sweeps do run concurrently.

use crate::config::SchedulerConfig;
use crate::scan::{ScanOrchestrator, Sweep};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What one timer task runs
#[derive(Debug, Clone, Copy)]
enum Job {
    Sweep(Sweep),
    HealthCheck,
}

/// Runs the sweeps on fixed timers until shutdown
pub struct SweepScheduler {
    orchestrator: Arc<ScanOrchestrator>,
    config: SchedulerConfig,
}

impl SweepScheduler {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, config: &SchedulerConfig) -> Self {
        Self {
            orchestrator,
            config: config.clone(),
        }
    }

    fn period(&self, job: Job) -> Duration {
        let secs = match job {
            Job::Sweep(Sweep::DueParents) => self.config.parent_scan_interval_secs,
            Job::Sweep(Sweep::Retry) => self.config.retry_failed_interval_secs,
            Job::Sweep(Sweep::Pending) => self.config.process_pending_interval_secs,
            Job::Sweep(Sweep::StuckReset) => self.config.reset_stuck_interval_secs,
            Job::HealthCheck => self.config.health_check_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Spawns one task per sweep plus the health check
    ///
    /// The tasks stop when `shutdown` flips to `true` or its sender is
    /// dropped. A sweep in progress at that moment is cancelled; articles
    /// it left IN_PROGRESS are released later by the stuck-reset sweep.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let jobs = Sweep::all()
            .into_iter()
            .map(Job::Sweep)
            .chain(std::iter::once(Job::HealthCheck));

        jobs.map(|job| {
            let period = self.period(job);
            tracing::info!("Scheduling {:?} every {:?}", job, period);
            tokio::spawn(run_job(
                Arc::clone(&self.orchestrator),
                job,
                period,
                shutdown.clone(),
            ))
        })
        .collect()
    }
}

async fn run_once(orchestrator: &ScanOrchestrator, job: Job) {
    match job {
        Job::Sweep(sweep) => match orchestrator.run_sweep(sweep).await {
            Ok(summary) => tracing::debug!(
                "Sweep '{}' done: {} examined, {} succeeded, {} failed",
                sweep,
                summary.examined,
                summary.succeeded,
                summary.failed
            ),
            Err(e) => tracing::error!("Sweep '{}' failed: {}", sweep, e),
        },
        Job::HealthCheck => {
            if orchestrator.extraction_healthy().await {
                tracing::info!("Extraction service is healthy");
            } else {
                tracing::warn!("Extraction service is not responding");
            }
        }
    }
}

fn is_shutdown(changed: Result<(), watch::error::RecvError>, shutdown: &watch::Receiver<bool>) -> bool {
    changed.is_err() || *shutdown.borrow()
}

async fn run_job(
    orchestrator: Arc<ScanOrchestrator>,
    job: Job,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if is_shutdown(changed, &shutdown) {
                    break;
                }
                continue;
            }
        }

        tokio::select! {
            _ = run_once(&orchestrator, job) => {}
            changed = shutdown.changed() => {
                if is_shutdown(changed, &shutdown) {
                    tracing::info!("Cancelled {:?} for shutdown", job);
                    break;
                }
            }
        }
    }

    tracing::debug!("{:?} task stopped", job);
}
