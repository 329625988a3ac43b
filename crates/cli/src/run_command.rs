use std::{sync::Arc, time::Duration};

use {
    anyhow::{Result, bail},
    clap::Args,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    trinity_agents::AgentSet,
    trinity_channels::{ChannelPlugin, InboundSink, console::ConsoleChannel},
    trinity_config::{SchedulePolicy, Severity, TrinityConfig, validate},
    trinity_metrics::{MetricsRecorderConfig, init_metrics},
    trinity_orchestrator::{
        BatchScheduler, IntakeBuffer, PipelineOrchestrator, PipelineSettings, SchedulerOptions,
    },
};

use crate::memory_commands;

/// Flags that override the loaded config for one run.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Seconds to wait between empty drains.
    #[arg(long)]
    pub idle_interval_secs: Option<u64>,
    /// Wake the scheduler as soon as a message arrives.
    #[arg(long, default_value_t = false)]
    pub wake_on_enqueue: bool,
    /// Do not mirror stage outputs to stderr.
    #[arg(long, default_value_t = false)]
    pub no_trace: bool,
    /// Keep memory in-process only.
    #[arg(long, default_value_t = false)]
    pub ephemeral: bool,
}

impl RunArgs {
    pub fn apply(&self, cfg: &mut TrinityConfig) {
        if let Some(secs) = self.idle_interval_secs {
            cfg.scheduler.idle_interval_secs = secs;
        }
        if self.wake_on_enqueue {
            cfg.scheduler.policy = SchedulePolicy::WakeOnEnqueue;
        }
        if self.no_trace {
            cfg.channels.trace = false;
        }
        if self.ephemeral {
            cfg.memory.backend = trinity_config::MemoryBackend::Memory;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupted,
    InputClosed,
}

pub async fn run(mut cfg: TrinityConfig, args: RunArgs) -> Result<()> {
    args.apply(&mut cfg);

    let diagnostics = validate::check(&cfg);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        bail!("invalid configuration, run `trinity config check` for details");
    }

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: cfg.metrics.enabled && cfg.metrics.prometheus,
        global_labels: vec![("bot".into(), cfg.identity.name.clone())],
    })?;

    let agents = AgentSet::from_config(&cfg)?;
    let memory = memory_commands::open_store(&cfg).await?;

    let intake = Arc::new(IntakeBuffer::new());
    let mut console = ConsoleChannel::new(cfg.identity.name.clone());
    console
        .start(Arc::clone(&intake) as Arc<dyn InboundSink>)
        .await?;

    let pipeline = Arc::new(
        PipelineOrchestrator::new(agents, memory, console.outbound())
            .with_settings(PipelineSettings::from_config(&cfg)),
    );
    let scheduler = Arc::new(BatchScheduler::new(
        Arc::clone(&intake),
        pipeline,
        SchedulerOptions::from(&cfg.scheduler),
    ));

    let cancel = CancellationToken::new();
    let worker = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    info!(
        bot = %cfg.identity.name,
        channel = console.id(),
        "listening, type `<channel_id> <author>: <text>` or /quit"
    );

    let reason = wait_for_shutdown(&console).await?;
    cancel.cancel();
    worker.await?;

    // Piped input ends with EOF; answer whatever arrived before it.
    if reason == Shutdown::InputClosed && !intake.is_empty() {
        let report = scheduler.run_cycle().await;
        debug!(runs = report.runs.len(), failed = report.failed.len(), "final drain");
    }

    console.stop().await?;
    let pending = intake.pending();
    if pending > 0 {
        warn!(pending, "exiting with unprocessed messages");
    }

    let rendered = metrics.render();
    if !rendered.is_empty() {
        debug!(metrics = %rendered, "final metrics");
    }
    info!(reason = ?reason, "trinity stopped");
    Ok(())
}

async fn wait_for_shutdown(console: &ConsoleChannel) -> Result<Shutdown> {
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupt received, shutting down");
                return Ok(Shutdown::Interrupted);
            },
            _ = tick.tick() => {
                if !console.is_running() {
                    info!("console input closed, shutting down");
                    return Ok(Shutdown::InputClosed);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let mut cfg = TrinityConfig::default();
        RunArgs {
            idle_interval_secs: Some(1),
            wake_on_enqueue: true,
            no_trace: true,
            ephemeral: true,
        }
        .apply(&mut cfg);

        assert_eq!(cfg.scheduler.idle_interval_secs, 1);
        assert_eq!(cfg.scheduler.policy, SchedulePolicy::WakeOnEnqueue);
        assert!(!cfg.channels.trace);
        assert_eq!(cfg.memory.backend, trinity_config::MemoryBackend::Memory);
    }

    #[test]
    fn no_flags_keep_config() {
        let mut cfg = TrinityConfig::default();
        RunArgs::default().apply(&mut cfg);
        assert_eq!(cfg.scheduler.idle_interval_secs, 5);
        assert!(cfg.channels.trace);
    }
}
