//! The five agents the pipeline consults, built from config.

use std::{fmt, sync::Arc};

use {tracing::info, trinity_config::TrinityConfig};

use crate::{
    agent::{Agent, AgentParams, ParamValue, param},
    prompt::{PromptAgent, PromptTemplate},
    providers::build_provider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Choose,
    Thought,
    Theory,
    Generate,
    Reflection,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        Self::Choose,
        Self::Thought,
        Self::Theory,
        Self::Generate,
        Self::Reflection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Choose => "choose",
            Self::Thought => "thought",
            Self::Theory => "theory",
            Self::Generate => "generate",
            Self::Reflection => "reflection",
        }
    }

    /// Built-in prompt template.
    pub fn default_template(self) -> &'static str {
        match self {
            Self::Choose => include_str!("../prompts/choose.md"),
            Self::Thought => include_str!("../prompts/thought.md"),
            Self::Theory => include_str!("../prompts/theory.md"),
            Self::Generate => include_str!("../prompts/generate.md"),
            Self::Reflection => include_str!("../prompts/reflection.md"),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent per [`AgentKind`].
#[derive(Clone)]
pub struct AgentSet {
    choose: Arc<dyn Agent>,
    thought: Arc<dyn Agent>,
    theory: Arc<dyn Agent>,
    generate: Arc<dyn Agent>,
    reflection: Arc<dyn Agent>,
}

impl AgentSet {
    pub fn new(
        choose: Arc<dyn Agent>,
        thought: Arc<dyn Agent>,
        theory: Arc<dyn Agent>,
        generate: Arc<dyn Agent>,
        reflection: Arc<dyn Agent>,
    ) -> Self {
        Self {
            choose,
            thought,
            theory,
            generate,
            reflection,
        }
    }

    /// Build every agent from config: shared provider settings, per-agent
    /// model/temperature/prompt overrides, bot name as a default parameter.
    pub fn from_config(cfg: &TrinityConfig) -> anyhow::Result<Self> {
        let defaults =
            AgentParams::new().with(param::BOT_NAME, ParamValue::text(&cfg.identity.name));

        let build = |kind: AgentKind| -> anyhow::Result<Arc<dyn Agent>> {
            let over = cfg.agent(kind.as_str());
            let template = match over.and_then(|o| o.prompt_path.as_deref()) {
                Some(path) => PromptTemplate::load(path)?,
                None => PromptTemplate::parse(kind.default_template()),
            };
            let provider = build_provider(
                &cfg.provider,
                over.and_then(|o| o.model.as_deref()),
                over.and_then(|o| o.temperature),
            )?;
            info!(agent = %kind, model = %provider.id(), "agent ready");
            Ok(Arc::new(
                PromptAgent::new(kind.as_str(), template, provider).with_defaults(defaults.clone()),
            ))
        };

        Ok(Self {
            choose: build(AgentKind::Choose)?,
            thought: build(AgentKind::Thought)?,
            theory: build(AgentKind::Theory)?,
            generate: build(AgentKind::Generate)?,
            reflection: build(AgentKind::Reflection)?,
        })
    }

    pub fn get(&self, kind: AgentKind) -> &Arc<dyn Agent> {
        match kind {
            AgentKind::Choose => &self.choose,
            AgentKind::Thought => &self.thought,
            AgentKind::Theory => &self.theory,
            AgentKind::Generate => &self.generate,
            AgentKind::Reflection => &self.reflection,
        }
    }
}
