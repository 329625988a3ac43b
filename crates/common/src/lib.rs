//! Shared message types, error definitions, and helpers used by every trinity crate.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{ChannelId, Message},
};
