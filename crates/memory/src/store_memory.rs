//! In-memory store for tests and ephemeral runs.

use std::sync::Mutex;

use {async_trait::async_trait, tracing::debug};

use crate::{
    Result,
    config::MemoryOptions,
    store::{
        HistoryEntry, HistoryScope, MemoryRecord, MemoryStore, recall_snippets, select_and_render,
    },
};

/// Memory held in process. Nothing survives a restart.
pub struct InMemoryStore {
    options: MemoryOptions,
    pending: Mutex<Vec<MemoryRecord>>,
    entries: Mutex<Vec<HistoryEntry>>,
    records: Mutex<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            options,
            pending: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Records committed by `flush`, oldest first.
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of records queued but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Seed history directly, bypassing the pending queue.
    pub fn remember(&self, entry: HistoryEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn fetch_history(
        &self,
        subject: &str,
        query: Option<&str>,
        user_specific: bool,
    ) -> Result<String> {
        let scope = HistoryScope::new(subject, user_specific);
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let matching: Vec<HistoryEntry> =
            entries.iter().filter(|e| scope.matches(e)).cloned().collect();
        let query = if user_specific { query } else { None };
        Ok(select_and_render(
            &matching,
            query,
            self.options.history_limit,
        ))
    }

    async fn persist(&self, record: MemoryRecord) -> Result<()> {
        record.selected()?;
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let pending: Vec<MemoryRecord> =
            std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        if pending.is_empty() {
            return Ok(());
        }

        let mut new_entries = Vec::new();
        for record in &pending {
            new_entries.extend(HistoryEntry::from_record(record, &self.options.bot_name)?);
        }
        debug!(
            records = pending.len(),
            entries = new_entries.len(),
            "flushing in-memory records"
        );

        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(new_entries);
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(pending);
        Ok(())
    }

    async fn recall(&self, topics: &[String]) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(recall_snippets(&entries, topics, self.options.recall_limit))
    }
}
