//! Inbound chat message types shared by transports, the orchestrator and memory.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::Error;

/// Platform identifier of a conversation channel.
///
/// Channel ids are numeric snowflakes on every platform we talk to, so they
/// order numerically (`3 < 10`), not lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| Error::invalid_channel_id(s))
    }
}

impl From<u64> for ChannelId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A chat message as received from a transport. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: ChannelId,
    /// Human-readable channel name, used as the subject for channel history.
    pub channel: String,
    pub author: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message from the transport callback arguments.
    pub fn from_inbound(
        content: impl Into<String>,
        author: impl Into<String>,
        channel: impl Into<String>,
        mentions: Vec<String>,
        channel_id: ChannelId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            channel_id,
            channel: channel.into(),
            author: author.into(),
            content: content.into(),
            mentions,
            timestamp,
        }
    }

    /// Convenience constructor stamping the current time and no mentions.
    pub fn now(
        channel_id: u64,
        channel: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::from_inbound(
            content,
            author,
            channel,
            Vec::new(),
            ChannelId(channel_id),
            Utc::now(),
        )
    }
}
