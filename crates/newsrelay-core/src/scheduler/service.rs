use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pipeline::{CycleReport, PipelineRunner};
use crate::Result;

/// Events emitted after each scheduled cycle
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A cycle ran to completion
    CycleCompleted(CycleReport),
    /// A cycle was aborted (storage failure); the next tick retries
    CycleFailed { message: String },
}

/// Runs the pipeline immediately, then once per interval until shutdown
pub struct SchedulerService {
    runner: Arc<PipelineRunner>,
    interval: Duration,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl SchedulerService {
    pub fn new(runner: Arc<PipelineRunner>, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            event_tx: None,
        }
    }

    /// Set the event sender for cycle notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    /// Run cycles until `shutdown` becomes true or its sender is dropped.
    ///
    /// The interval is measured start to start. A cycle that overruns it is
    /// followed immediately by the next one; cycles never overlap. A stop
    /// request arriving mid-cycle takes effect once that cycle finishes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            sources = self.runner.source_count(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                info!("Scheduler received shutdown signal");
                break;
            }

            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    // Errors are reported through logs and events only
                    let _ = self.run_once().await;
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Run a single cycle now
    pub async fn run_once(&self) -> Result<CycleReport> {
        match self.runner.run_cycle().await {
            Ok(report) => {
                info!("Cycle complete: {}", report);
                self.send_event(SchedulerEvent::CycleCompleted(report.clone()));
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Cycle failed, retrying at next interval");
                self.send_event(SchedulerEvent::CycleFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
