//! One run of the reply pipeline: select a message, walk it through
//! thought → theory → generate → reflection, then act on the reflection.

use std::sync::Arc;

use {
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
    trinity_agents::{AgentKind, AgentParams, AgentSet, ParamValue, param},
    trinity_channels::ChannelOutbound,
    trinity_common::{ChannelId, Message},
    trinity_config::TrinityConfig,
    trinity_memory::MemoryStore,
};

#[cfg(feature = "metrics")]
use trinity_metrics::{counter, histogram, labels, pipeline as pipeline_metrics};

use crate::{
    Result,
    cognition::{CognitionState, Stage, StageFailure, StageOutcome, split_categories},
    decision::{Action, Decision, ReflectionDecisionEngine, decide},
    parser::{LabeledLineParser, StructuredTextParser, format_batch},
    selector::{Selection, select_message},
};

/// Thought fields forwarded to later stages.
pub mod field {
    pub const CATEGORIES: &str = "Categories";
    pub const EMOTION: &str = "Emotion";
    pub const REASON: &str = "Reason";
    pub const INNER_THOUGHT: &str = "Inner Thought";
    pub const WHAT: &str = "What";
    pub const WHY: &str = "Why";
    pub const CHOICE: &str = "Choice";
}

/// Behaviour knobs for a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Sent instead of a reply when reflection chooses to stay quiet.
    pub placeholder: String,
    /// Mirror each stage's raw output to the transport's trace surface.
    pub trace: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            placeholder: "...".into(),
            trace: true,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &TrinityConfig) -> Self {
        Self {
            placeholder: cfg.channels.placeholder.clone(),
            trace: cfg.channels.trace,
        }
    }
}

/// Inputs shared by every stage of one run. Fetched once, read-only after.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub batch: Vec<Message>,
    pub selection: Selection,
    /// The batch as rendered for agents.
    pub formatted: String,
    /// Recent conversation in the selected message's channel.
    pub history: String,
    /// The author's own past messages, ranked against the selected message.
    pub user_history: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub channel_id: ChannelId,
    pub selection_index: usize,
    pub selection_fallback: bool,
    pub decision: Decision,
    pub action: Action,
}

/// Drives batches through selection, the four stages and the decision.
///
/// At most one batch is processed at a time, process-wide: concurrent
/// callers of [`process_batch`](Self::process_batch) queue on an async lock.
pub struct PipelineOrchestrator {
    agents: AgentSet,
    memory: Arc<dyn MemoryStore>,
    outbound: Arc<dyn ChannelOutbound>,
    parser: Arc<dyn StructuredTextParser>,
    settings: PipelineSettings,
    guard: Mutex<()>,
}

impl PipelineOrchestrator {
    pub fn new(
        agents: AgentSet,
        memory: Arc<dyn MemoryStore>,
        outbound: Arc<dyn ChannelOutbound>,
    ) -> Self {
        Self {
            agents,
            memory,
            outbound,
            parser: Arc::new(LabeledLineParser),
            settings: PipelineSettings::default(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn StructuredTextParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the whole pipeline for one channel's batch.
    ///
    /// Returns `Ok(None)` for an empty batch. Memory and transport failures,
    /// and a failed revision, abort the run with an error.
    pub async fn process_batch(&self, batch: Vec<Message>) -> Result<Option<RunReport>> {
        let _guard = self.guard.lock().await;
        if batch.is_empty() {
            return Ok(None);
        }

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();
        #[cfg(feature = "metrics")]
        histogram!(pipeline_metrics::BATCH_SIZE).record(batch.len() as f64);

        let formatted = format_batch(&batch);
        let choose = self.agents.get(AgentKind::Choose);
        let Some(selection) =
            select_message(choose.as_ref(), self.parser.as_ref(), &batch, &formatted).await
        else {
            return Ok(None);
        };

        let run = self.prepare(batch, selection, formatted).await?;
        let mut state = CognitionState::new();
        for stage in Stage::ALL {
            self.run_stage(stage, &run, &mut state).await;
            if stage == Stage::Thought {
                self.collect_categories(&mut state).await;
            }
        }

        let decision = decide(&state);
        info!(
            channel_id = %run.selection.message.channel_id,
            decision = decision.kind(),
            "reflection decided"
        );
        #[cfg(feature = "metrics")]
        counter!(pipeline_metrics::DECISIONS_TOTAL, labels::DECISION => decision.kind())
            .increment(1);

        let engine = ReflectionDecisionEngine {
            generate: self.agents.get(AgentKind::Generate).as_ref(),
            outbound: self.outbound.as_ref(),
            memory: self.memory.as_ref(),
            placeholder: &self.settings.placeholder,
        };
        let action = engine.execute(&decision, &run, &mut state).await?;

        #[cfg(feature = "metrics")]
        {
            counter!(pipeline_metrics::RUNS_TOTAL).increment(1);
            histogram!(pipeline_metrics::RUN_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }

        Ok(Some(RunReport {
            channel_id: run.selection.message.channel_id,
            selection_index: run.selection.index,
            selection_fallback: run.selection.fallback,
            decision,
            action,
        }))
    }

    async fn prepare(
        &self,
        batch: Vec<Message>,
        selection: Selection,
        formatted: String,
    ) -> Result<RunContext> {
        let message = &selection.message;
        let history = self
            .memory
            .fetch_history(&message.channel, None, false)
            .await?;
        let user_history = self
            .memory
            .fetch_history(&message.author, Some(&message.content), true)
            .await?;
        debug!(
            history_len = history.len(),
            user_history_len = user_history.len(),
            "history loaded"
        );
        Ok(RunContext {
            batch,
            selection,
            formatted,
            history,
            user_history,
        })
    }

    async fn run_stage(&self, stage: Stage, run: &RunContext, state: &mut CognitionState) {
        let params = stage_params(stage, run, state);
        info!(stage = %stage, "running stage");
        debug!(stage = %stage, params = ?params, "stage parameters");

        let agent = self.agents.get(stage.agent());
        let outcome = match agent.run(&params).await {
            Ok(raw) if !stage.is_structured() => StageOutcome::Raw { text: raw },
            Ok(raw) => match self.parser.parse(&raw) {
                Ok(fields) => StageOutcome::Parsed { fields, raw },
                Err(error) => {
                    warn!(stage = %stage, error = %error, raw = %raw, "stage reply did not parse");
                    #[cfg(feature = "metrics")]
                    counter!(pipeline_metrics::STAGE_PARSE_FAILURES_TOTAL, labels::STAGE => stage.as_str())
                        .increment(1);
                    StageOutcome::Failed {
                        failure: StageFailure::Parse { error },
                        raw,
                    }
                },
            },
            Err(e) => {
                warn!(stage = %stage, error = %e, "stage agent failed");
                StageOutcome::Failed {
                    failure: StageFailure::Agent {
                        message: e.to_string(),
                    },
                    raw: String::new(),
                }
            },
        };

        if let Some(raw) = outcome.raw()
            && !raw.is_empty()
        {
            info!(stage = %stage, response = %raw, "stage finished");
            self.mirror(stage, raw).await;
        }
        state.record(stage, outcome);
    }

    /// Extract the thought's categories and recall related memories.
    /// Nothing here can fail the run.
    async fn collect_categories(&self, state: &mut CognitionState) {
        let Some(raw) = state.field(Stage::Thought, field::CATEGORIES) else {
            debug!("thought gave no categories");
            return;
        };
        let categories = split_categories(raw);
        if categories.is_empty() {
            return;
        }
        match self.memory.recall(&categories).await {
            Ok(snippets) => {
                debug!(categories = ?categories, recalled = snippets.len(), "memories recalled");
                state.extend_memories(snippets);
            },
            Err(e) => warn!(error = %e, "memory recall failed"),
        }
        state.set_categories(categories);
    }

    async fn mirror(&self, stage: Stage, raw: &str) {
        if !self.settings.trace {
            return;
        }
        let text = format!("{} agent:\n```\n{raw}\n```", capitalize(stage.as_str()));
        if let Err(e) = self.outbound.send_trace(&text).await {
            warn!(stage = %stage, error = %e, "failed to mirror stage output");
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parameters every stage sees, filled from the run context and whatever
/// earlier stages produced.
pub fn stage_params(stage: Stage, run: &RunContext, state: &CognitionState) -> AgentParams {
    let message = &run.selection.message;
    let thought = |label| ParamValue::opt_text(state.field(Stage::Thought, label));
    let theory = |label| ParamValue::opt_text(state.field(Stage::Theory, label));

    AgentParams::new()
        .with(param::USER_MESSAGE, ParamValue::text(&message.content))
        .with(param::HISTORY, ParamValue::text(&run.history))
        .with(param::USER_HISTORY, ParamValue::text(&run.user_history))
        .with(param::USERNAME, ParamValue::text(&message.author))
        .with(param::NEW_MESSAGES, ParamValue::text(&run.formatted))
        .with(param::MEMORIES, ParamValue::list(state.memories().to_vec()))
        .with(param::EMOTION, thought(field::EMOTION))
        .with(param::REASON, thought(field::REASON))
        .with(param::THOUGHT, thought(field::INNER_THOUGHT))
        .with(param::WHAT, theory(field::WHAT))
        .with(param::WHY, theory(field::WHY))
        .with(
            param::RESPONSE,
            ParamValue::opt_text(stage.previous().and_then(|p| state.raw(p))),
        )
}
