//! Persistence trait for conversation memory and the types it stores.

use std::collections::HashSet;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    trinity_common::{ChannelId, Message},
};

use crate::{Error, Result};

/// Everything a pipeline run leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// The drained batch, in arrival order.
    pub batch: Vec<Message>,
    /// Index of the message the run answered.
    pub selection_index: usize,
    /// Snapshot of the run's cognition state.
    pub cognition: serde_json::Value,
    /// Text stored for the run: the reply, or the reason for staying silent.
    pub response: String,
    /// Whether `response` was sent to the channel.
    pub replied: bool,
}

impl MemoryRecord {
    pub fn selected(&self) -> Result<&Message> {
        self.batch
            .get(self.selection_index)
            .ok_or(Error::InvalidSelection {
                index: self.selection_index,
                len: self.batch.len(),
            })
    }
}

/// One remembered line of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub channel_id: ChannelId,
    pub channel: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub from_bot: bool,
}

impl HistoryEntry {
    pub fn from_message(message: &Message) -> Self {
        Self {
            channel_id: message.channel_id,
            channel: message.channel.clone(),
            author: message.author.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            from_bot: false,
        }
    }

    /// Entries a record contributes: the batch, then the bot reply if one was sent.
    pub fn from_record(record: &MemoryRecord, bot_name: &str) -> Result<Vec<Self>> {
        let selected = record.selected()?;
        let mut entries: Vec<Self> = record.batch.iter().map(Self::from_message).collect();
        if record.replied && !record.response.trim().is_empty() {
            entries.push(Self {
                channel_id: selected.channel_id,
                channel: selected.channel.clone(),
                author: bot_name.to_string(),
                content: record.response.clone(),
                timestamp: Utc::now(),
                from_bot: true,
            });
        }
        Ok(entries)
    }
}

/// Which entries a history fetch looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope<'a> {
    /// Everything said in the channel named `subject`.
    Channel(&'a str),
    /// Everything the author named `subject` said, in any channel.
    User(&'a str),
}

impl<'a> HistoryScope<'a> {
    pub fn new(subject: &'a str, user_specific: bool) -> Self {
        if user_specific {
            Self::User(subject)
        } else {
            Self::Channel(subject)
        }
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        match self {
            Self::Channel(channel) => entry.channel == *channel,
            Self::User(author) => entry.author == *author,
        }
    }
}

/// Long-term conversation memory.
///
/// `persist` only queues a record; nothing is visible to `fetch_history`
/// until `flush` commits the queue.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Render remembered conversation for `subject` as `author: content` lines.
    ///
    /// With `user_specific` the subject is an author name, otherwise a
    /// channel name. A `query` ranks entries by shared terms before recency.
    /// Returns an empty string when nothing is remembered.
    async fn fetch_history(
        &self,
        subject: &str,
        query: Option<&str>,
        user_specific: bool,
    ) -> Result<String>;

    async fn persist(&self, record: MemoryRecord) -> Result<()>;

    /// Commit every queued record.
    async fn flush(&self) -> Result<()>;

    /// Remembered lines related to any of `topics`, best match first.
    async fn recall(&self, _topics: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Pick up to `limit` entries and render them oldest first.
///
/// `entries` must be in chronological order. Without a query (or with a query
/// that shares no term with anything) this keeps the most recent entries.
/// With a query, entries sharing more terms with it win, recency breaking ties.
pub fn select_and_render(entries: &[HistoryEntry], query: Option<&str>, limit: usize) -> String {
    if limit == 0 || entries.is_empty() {
        return String::new();
    }

    let mut picked: Vec<usize> = match query.map(terms).filter(|t| !t.is_empty()) {
        Some(query_terms) => {
            let mut scored: Vec<(usize, usize)> = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (terms(&e.content).intersection(&query_terms).count(), i))
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
            scored.into_iter().take(limit).map(|(_, i)| i).collect()
        },
        None => (entries.len().saturating_sub(limit)..entries.len()).collect(),
    };
    picked.sort_unstable();

    picked
        .into_iter()
        .map(|i| format!("{}: {}", entries[i].author, entries[i].content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Up to `limit` entries sharing a term with `topics`, rendered as
/// `author: content`. More matching topics rank first, then recency.
pub fn recall_snippets(entries: &[HistoryEntry], topics: &[String], limit: usize) -> Vec<String> {
    let topic_terms: Vec<HashSet<String>> = topics
        .iter()
        .map(|t| terms(t))
        .filter(|t| !t.is_empty())
        .collect();
    if topic_terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.from_bot)
        .map(|(i, e)| {
            let content = terms(&e.content);
            let hits = topic_terms
                .iter()
                .filter(|t| !t.is_disjoint(&content))
                .count();
            (hits, i)
        })
        .filter(|(hits, _)| *hits > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, i)| format!("{}: {}", entries[i].author, entries[i].content))
        .collect()
}
