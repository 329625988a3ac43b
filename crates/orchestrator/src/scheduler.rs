//! The perpetual drain loop feeding batches to the pipeline.

use std::{sync::Arc, time::Duration};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
    trinity_common::ChannelId,
    trinity_config::{SchedulePolicy, SchedulerConfig},
};

#[cfg(feature = "metrics")]
use trinity_metrics::{counter, pipeline as pipeline_metrics};

use crate::{
    intake::IntakeBuffer,
    pipeline::{PipelineOrchestrator, RunReport},
};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How long to wait when the buffer is empty.
    pub idle_interval: Duration,
    pub policy: SchedulePolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(5),
            policy: SchedulePolicy::Poll,
        }
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            idle_interval: cfg.idle_interval(),
            policy: cfg.policy,
        }
    }
}

/// Result of one drain.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Finished runs, in channel order.
    pub runs: Vec<RunReport>,
    /// Channels whose run ended in an error.
    pub failed: Vec<ChannelId>,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.runs.len() + self.failed.len()
    }
}

/// Drains the [`IntakeBuffer`] and runs one pipeline per channel batch,
/// lowest channel id first.
pub struct BatchScheduler {
    intake: Arc<IntakeBuffer>,
    pipeline: Arc<PipelineOrchestrator>,
    options: SchedulerOptions,
}

impl BatchScheduler {
    pub fn new(
        intake: Arc<IntakeBuffer>,
        pipeline: Arc<PipelineOrchestrator>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            intake,
            pipeline,
            options,
        }
    }

    /// Drain once and process every non-empty batch to completion.
    ///
    /// A failed run is logged and does not stop the remaining channels.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        if self.intake.is_empty() {
            return report;
        }

        let drained = self.intake.drain_all();
        debug!(channels = drained.len(), "drained intake");
        #[cfg(feature = "metrics")]
        counter!(pipeline_metrics::CYCLES_TOTAL).increment(1);

        for (channel_id, batch) in drained {
            if batch.is_empty() {
                continue;
            }
            info!(channel_id = %channel_id, messages = batch.len(), "processing batch");
            match self.pipeline.process_batch(batch).await {
                Ok(Some(run)) => report.runs.push(run),
                Ok(None) => {},
                Err(e) => {
                    error!(channel_id = %channel_id, error = %e, "pipeline run failed");
                    #[cfg(feature = "metrics")]
                    counter!(pipeline_metrics::RUN_ERRORS_TOTAL).increment(1);
                    report.failed.push(channel_id);
                },
            }
        }
        report
    }

    /// Loop until `cancel` fires. Cancellation is checked between cycles and
    /// interrupts the idle wait; a cycle in progress finishes first.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            idle_interval_ms = self.options.idle_interval.as_millis() as u64,
            policy = ?self.options.policy,
            "batch scheduler started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }

            if self.run_cycle().await.processed() > 0 {
                continue;
            }

            debug!("no messages, waiting");
            match self.options.policy {
                SchedulePolicy::Poll => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.options.idle_interval) => {},
                    }
                },
                SchedulePolicy::WakeOnEnqueue => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = self.intake.notified() => debug!("woken by enqueue"),
                        () = tokio::time::sleep(self.options.idle_interval) => {},
                    }
                },
            }
        }
        info!("batch scheduler stopped");
    }
}
