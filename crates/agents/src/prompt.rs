//! Prompt templates and the LLM-backed agent that renders them.
//!
//! A template is plain text with `{name}` placeholders. A line holding only
//! `---` separates the system prompt from the user prompt. Text is grouped
//! into blank-line separated sections, and a section is emitted only when
//! every placeholder in it has a provided value, so optional context drops
//! out instead of rendering as an empty label.

use std::{path::Path, sync::Arc};

use {
    async_trait::async_trait,
    tracing::{debug, warn},
};

use crate::{
    agent::{Agent, AgentParams},
    model::{ChatMessage, LlmProvider},
};

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system: Vec<String>,
    user: Vec<String>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Self {
        let mut parts = source.splitn(2, "\n---\n");
        let first = parts.next().unwrap_or_default();
        match parts.next() {
            Some(user) => Self {
                system: sections(first),
                user: sections(user),
            },
            None => Self {
                system: Vec::new(),
                user: sections(first),
            },
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read prompt {}: {e}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    /// Render into a message list: an optional system message and one user message.
    pub fn render(&self, params: &AgentParams) -> Vec<ChatMessage> {
        let system = render_sections(&self.system, params);
        let user = render_sections(&self.user, params);
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user));
        messages
    }

    /// Every placeholder name used anywhere in the template.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .system
            .iter()
            .chain(&self.user)
            .flat_map(|s| placeholders_in(s))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn sections(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Yields `(byte_start, byte_end_exclusive, name)` for each placeholder.
fn placeholder_spans(section: &str) -> Vec<(usize, usize, &str)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(open) = section[offset..].find('{') {
        let start = offset + open;
        let Some(close) = section[start + 1..].find('}') else {
            break;
        };
        let end = start + 1 + close;
        let name = &section[start + 1..end];
        if is_placeholder_name(name) {
            spans.push((start, end + 1, name));
            offset = end + 1;
        } else {
            offset = start + 1;
        }
    }
    spans
}

fn placeholders_in(section: &str) -> impl Iterator<Item = &str> {
    placeholder_spans(section).into_iter().map(|(_, _, n)| n)
}

fn render_sections(sections: &[String], params: &AgentParams) -> String {
    sections
        .iter()
        .filter_map(|section| render_section(section, params))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_section(section: &str, params: &AgentParams) -> Option<String> {
    let mut out = String::with_capacity(section.len());
    let mut last = 0;
    for (start, end, name) in placeholder_spans(section) {
        let value = params.get(name).render()?;
        out.push_str(&section[last..start]);
        out.push_str(&value);
        last = end;
    }
    out.push_str(&section[last..]);
    Some(out)
}

/// Agent that renders a [`PromptTemplate`] and asks an [`LlmProvider`].
pub struct PromptAgent {
    name: String,
    template: PromptTemplate,
    provider: Arc<dyn LlmProvider>,
    /// Values merged into every call unless the caller sets them.
    defaults: AgentParams,
}

impl PromptAgent {
    pub fn new(
        name: impl Into<String>,
        template: PromptTemplate,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            template,
            provider,
            defaults: AgentParams::new(),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: AgentParams) -> Self {
        self.defaults = defaults;
        self
    }
}

#[async_trait]
impl Agent for PromptAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, params: &AgentParams) -> anyhow::Result<String> {
        let mut params = params.clone();
        params.merge_missing(&self.defaults);
        let messages = self.template.render(&params);

        debug!(
            agent = %self.name,
            provider = %self.provider.name(),
            model = %self.provider.id(),
            "running agent"
        );

        let resp = self.provider.complete(&messages).await?;
        match resp.text {
            Some(text) => Ok(text),
            None => {
                warn!(agent = %self.name, "agent returned no text");
                Ok(String::new())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            agent::{ParamValue, param},
            model::CompletionResponse,
        },
        std::sync::Mutex,
    };

    const TEMPLATE: &str = "You are {bot_name}.\n\nRecent chat:\n{history}\n---\n{username} said: {user_message}\n\nYour earlier draft: {response}\nFeedback: {feedback}";

    #[test]
    fn splits_system_and_user() {
        let t = PromptTemplate::parse(TEMPLATE);
        assert_eq!(t.system.len(), 2);
        assert_eq!(t.user.len(), 2);
    }

    #[test]
    fn drops_sections_with_missing_values() {
        let t = PromptTemplate::parse(TEMPLATE);
        let params = AgentParams::new()
            .with(param::BOT_NAME, ParamValue::text("Trinity"))
            .with(param::USERNAME, ParamValue::text("alice"))
            .with(param::USER_MESSAGE, ParamValue::text("hi"))
            .with(param::HISTORY, ParamValue::text("  "));

        let messages = t.render(&params);
        assert_eq!(messages, vec![
            ChatMessage::system("You are Trinity."),
            ChatMessage::user("alice said: hi"),
        ]);
    }

    #[test]
    fn keeps_sections_without_placeholders_and_odd_braces() {
        let t = PromptTemplate::parse("Reply in JSON like {\"a\": 1}.\n\n{missing}");
        let messages = t.render(&AgentParams::new());
        assert_eq!(messages, vec![ChatMessage::user("Reply in JSON like {\"a\": 1}.")]);
    }

    #[test]
    fn lists_placeholders() {
        let t = PromptTemplate::parse(TEMPLATE);
        assert_eq!(t.placeholders(), vec![
            "bot_name",
            "feedback",
            "history",
            "response",
            "user_message",
            "username"
        ]);
    }

    struct CapturingProvider {
        seen: Mutex<Vec<ChatMessage>>,
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for CapturingProvider {
        fn name(&self) -> &str {
            "capture"
        }

        fn id(&self) -> &str {
            "capture-1"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<CompletionResponse> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(CompletionResponse {
                text: self.reply.clone(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn agent_merges_defaults_and_returns_text() {
        let provider = Arc::new(CapturingProvider {
            seen: Mutex::new(Vec::new()),
            reply: Some("Hello!".into()),
        });
        let agent = PromptAgent::new("generate", PromptTemplate::parse(TEMPLATE), provider.clone())
            .with_defaults(AgentParams::new().with(param::BOT_NAME, ParamValue::text("Trinity")));

        let params = AgentParams::new()
            .with(param::USERNAME, ParamValue::text("bob"))
            .with(param::USER_MESSAGE, ParamValue::text("yo"));
        let out = agent.run(&params).await.unwrap();

        assert_eq!(out, "Hello!");
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0], ChatMessage::system("You are Trinity."));
        assert_eq!(seen[1], ChatMessage::user("bob said: yo"));
    }

    #[tokio::test]
    async fn empty_completion_becomes_empty_text() {
        let provider = Arc::new(CapturingProvider {
            seen: Mutex::new(Vec::new()),
            reply: None,
        });
        let agent = PromptAgent::new("thought", PromptTemplate::parse("{user_message}"), provider);
        let out = agent.run(&AgentParams::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
