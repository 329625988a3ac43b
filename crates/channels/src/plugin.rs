use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    trinity_common::{ChannelId, Message},
};

use crate::Result;

/// Where a reply is sent back to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChannelReplyTarget {
    pub channel_id: ChannelId,
    pub channel: String,
}

impl From<&Message> for ChannelReplyTarget {
    fn from(msg: &Message) -> Self {
        Self {
            channel_id: msg.channel_id,
            channel: msg.channel.clone(),
        }
    }
}

/// Receives inbound messages from a transport.
///
/// `on_message` must not block and never fails: the receiving side only
/// appends to a buffer.
pub trait InboundSink: Send + Sync {
    fn on_message(&self, message: Message);

    /// Transport callback shape: wraps the raw fields into a [`Message`].
    fn on_inbound(
        &self,
        content: &str,
        author: &str,
        channel: &str,
        mentions: Vec<String>,
        channel_id: ChannelId,
        timestamp: DateTime<Utc>,
    ) {
        self.on_message(Message::from_inbound(
            content, author, channel, mentions, channel_id, timestamp,
        ));
    }
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, to: &ChannelReplyTarget, text: &str) -> Result<()>;

    /// Mirror diagnostic output (stage transcripts) to an operator surface.
    /// No-op by default.
    async fn send_trace(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Core transport trait. Each chat platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "console", "discord").
    fn id(&self) -> &str;

    /// Begin delivering inbound messages to `sink`.
    async fn start(&mut self, sink: Arc<dyn InboundSink>) -> Result<()>;

    /// Stop delivering inbound messages.
    async fn stop(&mut self) -> Result<()>;

    /// Outbound adapter for replies.
    fn outbound(&self) -> Arc<dyn ChannelOutbound>;
}
