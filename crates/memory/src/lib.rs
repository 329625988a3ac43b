//! Conversation memory: what was said per channel and per user, plus a log
//! of every pipeline run with its cognition snapshot.
//!
//! Records are queued by [`MemoryStore::persist`] and committed together by
//! [`MemoryStore::flush`].

pub mod config;
pub mod error;
pub mod schema;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    config::MemoryOptions,
    error::{Context, Error, Result},
    schema::run_migrations,
    store::{HistoryEntry, HistoryScope, MemoryRecord, MemoryStore},
    store_memory::InMemoryStore,
    store_sqlite::SqliteMemoryStore,
};
