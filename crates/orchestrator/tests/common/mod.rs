//! Test doubles shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    trinity_agents::{Agent, AgentParams, AgentSet},
    trinity_channels::{ChannelOutbound, ChannelReplyTarget},
    trinity_common::ChannelId,
    trinity_memory::InMemoryStore,
    trinity_orchestrator::{PipelineOrchestrator, PipelineSettings},
};

pub const THOUGHT: &str = "Categories: cooking, weekend\nEmotion: cheerful\nReason: a friendly question\nInner Thought: I could suggest pasta";
pub const THEORY: &str = "What: they want a dinner idea\nWhy: they are hosting friends";
pub const GENERATE: &str = "How about a big pot of carbonara?";
pub const RESPOND: &str = "Choice: respond\nReason: the draft answers them";

/// Counts how many agent calls are in flight at once.
#[derive(Default)]
pub struct ConcurrencyTracker {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Agent answering from a script, then from a fixed reply.
pub struct ScriptedAgent {
    name: &'static str,
    script: Mutex<VecDeque<Result<String, String>>>,
    always: Option<String>,
    calls: Mutex<Vec<AgentParams>>,
    delay: Option<Duration>,
    tracker: Option<Arc<ConcurrencyTracker>>,
}

impl ScriptedAgent {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            script: Mutex::new(VecDeque::new()),
            always: None,
            calls: Mutex::new(Vec::new()),
            delay: None,
            tracker: None,
        }
    }

    pub fn always(mut self, reply: &str) -> Self {
        self.always = Some(reply.to_string());
        self
    }

    pub fn then_ok(self, reply: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn then_err(self, error: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn tracked(mut self, tracker: Arc<ConcurrencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn calls(&self) -> Vec<AgentParams> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, params: &AgentParams) -> anyhow::Result<String> {
        if let Some(tracker) = &self.tracker {
            tracker.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(params.clone());
        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => self
                .always
                .clone()
                .ok_or_else(|| anyhow::anyhow!("{} has no reply left", self.name)),
        };
        if let Some(tracker) = &self.tracker {
            tracker.exit();
        }
        result
    }
}

/// Outbound that records everything and can be told to fail per channel.
#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(ChannelId, String)>>,
    traces: Mutex<Vec<String>>,
    failing: Mutex<Vec<ChannelId>>,
}

impl RecordingOutbound {
    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, t)| t).collect()
    }

    pub fn traces(&self) -> Vec<String> {
        self.traces.lock().unwrap().clone()
    }

    pub fn fail_for(&self, channel_id: ChannelId) {
        self.failing.lock().unwrap().push(channel_id);
    }
}

#[async_trait]
impl ChannelOutbound for RecordingOutbound {
    async fn send_text(&self, to: &ChannelReplyTarget, text: &str) -> trinity_channels::Result<()> {
        if self.failing.lock().unwrap().contains(&to.channel_id) {
            return Err(trinity_channels::Error::unavailable("channel is down"));
        }
        self.sent.lock().unwrap().push((to.channel_id, text.to_string()));
        Ok(())
    }

    async fn send_trace(&self, text: &str) -> trinity_channels::Result<()> {
        self.traces.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub struct Agents {
    pub choose: ScriptedAgent,
    pub thought: ScriptedAgent,
    pub theory: ScriptedAgent,
    pub generate: ScriptedAgent,
    pub reflection: ScriptedAgent,
}

impl Default for Agents {
    /// Every stage answers well and reflection chooses to respond.
    fn default() -> Self {
        Self {
            choose: ScriptedAgent::new("choose").always("message_id: 0"),
            thought: ScriptedAgent::new("thought").always(THOUGHT),
            theory: ScriptedAgent::new("theory").always(THEORY),
            generate: ScriptedAgent::new("generate").always(GENERATE),
            reflection: ScriptedAgent::new("reflection").always(RESPOND),
        }
    }
}

pub struct Harness {
    pub choose: Arc<ScriptedAgent>,
    pub thought: Arc<ScriptedAgent>,
    pub theory: Arc<ScriptedAgent>,
    pub generate: Arc<ScriptedAgent>,
    pub reflection: Arc<ScriptedAgent>,
    pub store: Arc<InMemoryStore>,
    pub outbound: Arc<RecordingOutbound>,
    pub pipeline: Arc<PipelineOrchestrator>,
}

impl Harness {
    pub fn new(agents: Agents) -> Self {
        Self::build(agents, Arc::new(InMemoryStore::default()), PipelineSettings::default())
    }

    pub fn with_store(agents: Agents, store: Arc<InMemoryStore>) -> Self {
        Self::build(agents, store, PipelineSettings::default())
    }

    pub fn with_settings(agents: Agents, settings: PipelineSettings) -> Self {
        Self::build(agents, Arc::new(InMemoryStore::default()), settings)
    }

    pub fn build(agents: Agents, store: Arc<InMemoryStore>, settings: PipelineSettings) -> Self {
        let choose = Arc::new(agents.choose);
        let thought = Arc::new(agents.thought);
        let theory = Arc::new(agents.theory);
        let generate = Arc::new(agents.generate);
        let reflection = Arc::new(agents.reflection);
        let outbound = Arc::new(RecordingOutbound::default());

        let set = AgentSet::new(
            choose.clone(),
            thought.clone(),
            theory.clone(),
            generate.clone(),
            reflection.clone(),
        );
        let pipeline = Arc::new(
            PipelineOrchestrator::new(set, store.clone(), outbound.clone())
                .with_settings(settings),
        );

        Self {
            choose,
            thought,
            theory,
            generate,
            reflection,
            store,
            outbound,
            pipeline,
        }
    }
}

/// A message in the channel named `room-<id>`.
pub fn message(channel_id: u64, author: &str, content: &str) -> trinity_common::Message {
    trinity_common::Message::now(channel_id, format!("room-{channel_id}"), author, content)
}
