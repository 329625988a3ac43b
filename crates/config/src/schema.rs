/// Config schema types (identity, provider, agents, scheduler, memory, channels).
use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Agent names the pipeline knows about, in the order they are consulted.
pub const AGENT_NAMES: &[&str] = &["choose", "thought", "theory", "generate", "reflection"];

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrinityConfig {
    pub identity: IdentityConfig,
    pub provider: ProviderConfig,
    /// Per-agent overrides keyed by agent name (see [`AGENT_NAMES`]).
    pub agents: HashMap<String, AgentOverride>,
    pub scheduler: SchedulerConfig,
    pub memory: MemoryStoreConfig,
    pub channels: ChannelsConfig,
    pub metrics: MetricsConfig,
}

impl TrinityConfig {
    /// Override entry for an agent, if one is configured.
    pub fn agent(&self, name: &str) -> Option<&AgentOverride> {
        self.agents.get(name)
    }
}

/// Bot identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name, used as the author of persisted bot replies.
    pub name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "Trinity".into(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint shared by all agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL up to (not including) `/chat/completions`.
    pub base_url: String,
    pub model: String,
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Environment variable consulted when `api_key` is not set.
    pub api_key_env: String,
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: None,
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key from config, then from `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<Secret<String>> {
        self.api_key
            .clone()
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.is_empty())
                    .map(Secret::new)
            })
            .filter(|s| !s.expose_secret().is_empty())
    }
}

/// Per-agent overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOverride {
    /// Model id replacing `provider.model` for this agent.
    pub model: Option<String>,
    /// Path to a prompt template replacing the built-in one.
    pub prompt_path: Option<PathBuf>,
    pub temperature: Option<f32>,
}

/// How the batch scheduler waits when the intake buffer is empty.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePolicy {
    /// Sleep the full idle interval, then look again.
    #[default]
    Poll,
    /// Sleep at most the idle interval, waking early when a message arrives.
    WakeOnEnqueue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds to wait between looks at an empty buffer. Defaults to 5.
    pub idle_interval_secs: u64,
    pub policy: SchedulePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 5,
            policy: SchedulePolicy::Poll,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    #[default]
    Sqlite,
    /// Process-local store, lost on exit.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    pub backend: MemoryBackend,
    /// SQLite file. Defaults to `<data_dir>/memory.db`.
    pub db_path: Option<PathBuf>,
    /// Maximum entries rendered into a history block.
    pub history_limit: usize,
    /// Maximum related snippets recalled from a thought's categories.
    pub recall_limit: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Sqlite,
            db_path: None,
            history_limit: 20,
            recall_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Text sent when the bot decides not to answer.
    pub placeholder: String,
    /// Mirror every stage output to the trace surface.
    pub trace: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            placeholder: "...".into(),
            trace: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Install the Prometheus recorder (needs the `prometheus` feature).
    pub prometheus: bool,
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
