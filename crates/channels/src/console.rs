//! Terminal transport: stdin lines in, stdout replies out.
//!
//! Input lines look like `<channel_id> <author>: <text>`; a bare line is
//! posted to channel 1 as `local-user`. `/quit` ends input.

use std::{
    io::{self, BufRead, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
    trinity_common::{ChannelId, Message},
};

use crate::{
    Error, Result,
    plugin::{ChannelOutbound, ChannelPlugin, ChannelReplyTarget, InboundSink},
};

const DEFAULT_CHANNEL: ChannelId = ChannelId(1);
const DEFAULT_AUTHOR: &str = "local-user";

/// Parse one console line into a message. Returns `None` for blank lines.
pub fn parse_console_line(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let addressed = line.split_once(' ').and_then(|(id, rest)| {
        let channel_id = id.parse::<ChannelId>().ok()?;
        let (author, text) = rest.split_once(':')?;
        let author = author.trim();
        let text = text.trim();
        (!author.is_empty() && !text.is_empty() && !author.contains(char::is_whitespace))
            .then(|| (channel_id, author.to_string(), text.to_string()))
    });

    let (channel_id, author, text) =
        addressed.unwrap_or_else(|| (DEFAULT_CHANNEL, DEFAULT_AUTHOR.to_string(), line.into()));

    let mentions = text
        .split_whitespace()
        .filter_map(|w| w.strip_prefix('@'))
        .map(|w| w.trim_end_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    Some(Message::from_inbound(
        text,
        author,
        format!("console-{channel_id}"),
        mentions,
        channel_id,
        chrono::Utc::now(),
    ))
}

/// Console transport.
pub struct ConsoleChannel {
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    outbound: Arc<ConsoleOutbound>,
}

impl ConsoleChannel {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
            outbound: Arc::new(ConsoleOutbound {
                bot_name: bot_name.into(),
            }),
        }
    }

    /// Whether the stdin reader is still accepting lines.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelPlugin for ConsoleChannel {
    fn id(&self) -> &str {
        "console"
    }

    async fn start(&mut self, sink: Arc<dyn InboundSink>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::invalid_input("console channel already started"));
        }
        let running = Arc::clone(&self.running);

        let handle = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match line {
                    Ok(line) if line.trim() == "/quit" => break,
                    Ok(line) => {
                        if let Some(msg) = parse_console_line(&line) {
                            debug!(channel_id = %msg.channel_id, author = %msg.author, "console message");
                            sink.on_message(msg);
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "console read failed");
                        break;
                    },
                }
            }
            running.store(false, Ordering::SeqCst);
            info!("console input closed");
        });

        self.reader = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        // The blocking reader exits on its next line; nothing to join here.
        self.reader.take();
        Ok(())
    }

    fn outbound(&self) -> Arc<dyn ChannelOutbound> {
        Arc::clone(&self.outbound) as Arc<dyn ChannelOutbound>
    }
}

/// Prints replies to stdout and traces to stderr.
pub struct ConsoleOutbound {
    bot_name: String,
}

#[async_trait]
impl ChannelOutbound for ConsoleOutbound {
    async fn send_text(&self, to: &ChannelReplyTarget, text: &str) -> Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "[#{}] {}: {}", to.channel, self.bot_name, text)?;
        out.flush()?;
        Ok(())
    }

    async fn send_trace(&self, text: &str) -> Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{text}")?;
        Ok(())
    }
}
