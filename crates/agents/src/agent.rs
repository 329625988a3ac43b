//! The agent capability and the parameter set it is called with.

use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;

/// Parameter names shared by the pipeline and the prompt templates.
pub mod param {
    pub const USER_MESSAGE: &str = "user_message";
    pub const HISTORY: &str = "history";
    pub const USER_HISTORY: &str = "user_history";
    pub const USERNAME: &str = "username";
    pub const NEW_MESSAGES: &str = "new_messages";
    pub const MESSAGES: &str = "messages";
    pub const MEMORIES: &str = "memories";
    pub const EMOTION: &str = "emotion";
    pub const REASON: &str = "reason";
    pub const THOUGHT: &str = "thought";
    pub const WHAT: &str = "what";
    pub const WHY: &str = "why";
    pub const RESPONSE: &str = "response";
    pub const FEEDBACK: &str = "feedback";
    pub const BOT_NAME: &str = "bot_name";
}

/// One agent parameter after normalization.
///
/// Blank text, empty lists and missing values all collapse into
/// [`ParamValue::NotProvided`]; a boolean `false` stays a real value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParamValue {
    #[default]
    NotProvided,
    Text(String),
    List(Vec<String>),
    Bool(bool),
}

impl ParamValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Self::NotProvided
        } else {
            Self::Text(value)
        }
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::NotProvided, Self::text)
    }

    pub fn list(values: Vec<String>) -> Self {
        if values.is_empty() {
            Self::NotProvided
        } else {
            Self::List(values)
        }
    }

    pub fn is_provided(&self) -> bool {
        !matches!(self, Self::NotProvided)
    }

    /// Text substituted into a prompt, `None` when not provided.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::NotProvided => None,
            Self::Text(t) => Some(t.clone()),
            Self::List(items) => Some(items.join("\n")),
            Self::Bool(b) => Some(b.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(text) => f.write_str(&text),
            None => f.write_str("<not provided>"),
        }
    }
}

/// Named parameter set passed to [`Agent::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentParams {
    values: BTreeMap<String, ParamValue>,
}

impl AgentParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.set(name, value);
        self
    }

    /// Value of `name`; absent names read as not provided.
    pub fn get(&self, name: &str) -> &ParamValue {
        static NOT_PROVIDED: ParamValue = ParamValue::NotProvided;
        self.values.get(name).unwrap_or(&NOT_PROVIDED)
    }

    /// Copy every parameter from `other` that is not already set here.
    pub fn merge_missing(&mut self, other: &AgentParams) {
        for (k, v) in &other.values {
            self.values.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A text-generation capability called with named parameters.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, params: &AgentParams) -> anyhow::Result<String>;
}
