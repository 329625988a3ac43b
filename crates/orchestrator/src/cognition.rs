//! Per-run record of what each pipeline stage produced.

use std::fmt;

use {serde::Serialize, trinity_agents::AgentKind};

use crate::parser::{ParseError, ParsedFields};

/// Pipeline stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Thought,
    Theory,
    Generate,
    Reflection,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Self::Thought,
        Self::Theory,
        Self::Generate,
        Self::Reflection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Theory => "theory",
            Self::Generate => "generate",
            Self::Reflection => "reflection",
        }
    }

    pub fn agent(self) -> AgentKind {
        match self {
            Self::Thought => AgentKind::Thought,
            Self::Theory => AgentKind::Theory,
            Self::Generate => AgentKind::Generate,
            Self::Reflection => AgentKind::Reflection,
        }
    }

    /// Whether the stage's reply is parsed into fields. Generate output is prose.
    pub fn is_structured(self) -> bool {
        !matches!(self, Self::Generate)
    }

    /// The stage that ran before this one.
    pub fn previous(self) -> Option<Stage> {
        match self {
            Self::Thought => None,
            Self::Theory => Some(Self::Thought),
            Self::Generate => Some(Self::Theory),
            Self::Reflection => Some(Self::Generate),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StageFailure {
    /// The agent call returned an error.
    Agent { message: String },
    /// The reply did not match the labeled format.
    Parse { error: ParseError },
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent { message } => write!(f, "agent error: {message}"),
            Self::Parse { error } => write!(f, "parse error: {error}"),
        }
    }
}

/// What one stage left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    #[default]
    Unset,
    Parsed { fields: ParsedFields, raw: String },
    Failed { failure: StageFailure, raw: String },
    Raw { text: String },
}

impl StageOutcome {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// The agent's reply text, if the agent answered.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Unset => None,
            Self::Parsed { raw, .. } | Self::Failed { raw, .. } => Some(raw),
            Self::Raw { text } => Some(text),
        }
    }

    pub fn fields(&self) -> Option<&ParsedFields> {
        match self {
            Self::Parsed { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

/// Context accumulated over one pipeline run.
///
/// Created empty for every run and dropped when it ends. Each stage is
/// recorded once, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CognitionState {
    #[serde(serialize_with = "serialize_outcomes")]
    outcomes: [StageOutcome; 4],
    memories: Vec<String>,
    categories: Vec<String>,
}

fn serialize_outcomes<S: serde::Serializer>(
    outcomes: &[StageOutcome; 4],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        Stage::ALL
            .iter()
            .map(|stage| (stage.as_str(), &outcomes[stage.index()])),
    )
}

impl CognitionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self, stage: Stage) -> &StageOutcome {
        &self.outcomes[stage.index()]
    }

    /// Store a stage result. A stage that already has an outcome keeps it.
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome) -> bool {
        let slot = &mut self.outcomes[stage.index()];
        if !slot.is_unset() {
            return false;
        }
        *slot = outcome;
        true
    }

    /// A parsed field of `stage`, `None` when the stage did not parse or
    /// lacks the field.
    pub fn field(&self, stage: Stage, label: &str) -> Option<&str> {
        self.outcome(stage).fields().and_then(|f| f.get(label))
    }

    pub fn raw(&self, stage: Stage) -> Option<&str> {
        self.outcome(stage).raw()
    }

    pub fn memories(&self) -> &[String] {
        &self.memories
    }

    pub fn extend_memories(&mut self, snippets: impl IntoIterator<Item = String>) {
        self.memories.extend(snippets);
    }

    pub fn clear_memories(&mut self) {
        self.memories.clear();
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = categories;
    }

    /// JSON snapshot stored alongside the run in memory.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Split a `Categories` value: comma separated, trimmed, empties dropped.
pub fn split_categories(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
