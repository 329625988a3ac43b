//! Chat transport seam.
//!
//! A transport feeds inbound messages into an [`InboundSink`] and exposes a
//! [`ChannelOutbound`] for replies. The console channel is the built-in
//! transport for local runs.

pub mod console;
pub mod error;
pub mod plugin;

pub use {
    error::{Error, Result},
    plugin::{ChannelOutbound, ChannelPlugin, ChannelReplyTarget, InboundSink},
};
