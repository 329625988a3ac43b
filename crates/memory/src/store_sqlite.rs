//! SQLite-backed memory store using sqlx.

use std::{path::Path, sync::Mutex};

use {
    async_trait::async_trait,
    chrono::{DateTime, SecondsFormat, Utc},
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::{debug, info, warn},
    trinity_common::ChannelId,
};

#[cfg(feature = "metrics")]
use trinity_metrics::{counter, memory as memory_metrics};

use crate::{
    Context, Result,
    config::MemoryOptions,
    store::{
        HistoryEntry, HistoryScope, MemoryRecord, MemoryStore, recall_snippets, select_and_render,
    },
};

/// How many of the most recent entries a ranked query or recall considers.
const RANKING_WINDOW: i64 = 500;

/// SQLite persistence for conversation history and pipeline runs.
pub struct SqliteMemoryStore {
    pool: SqlitePool,
    options: MemoryOptions,
    pending: Mutex<Vec<MemoryRecord>>,
}

impl SqliteMemoryStore {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn open(path: &Path, options: MemoryOptions) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect)
            .await?;
        crate::run_migrations(&pool).await?;
        info!(path = %path.display(), "memory database ready");
        Ok(Self::with_pool(pool, options))
    }

    /// Use an existing pool. Call [`crate::run_migrations`] first.
    pub fn with_pool(pool: SqlitePool, options: MemoryOptions) -> Self {
        Self {
            pool,
            options,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of runs committed to the database.
    pub async fn run_count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.max(0) as u64)
    }

    /// Most recent `window` entries in `scope` (all entries when `None`), oldest first.
    async fn load_entries(
        &self,
        scope: Option<HistoryScope<'_>>,
        window: i64,
    ) -> Result<Vec<HistoryEntry>> {
        const COLUMNS: &str = "SELECT channel_id, channel, author, content, created_at, from_bot FROM messages";
        let rows = match scope {
            Some(scope) => {
                let (column, subject) = match scope {
                    HistoryScope::Channel(s) => ("channel", s),
                    HistoryScope::User(s) => ("author", s),
                };
                let sql = format!("{COLUMNS} WHERE {column} = ? ORDER BY id DESC LIMIT ?");
                sqlx::query(&sql)
                    .bind(subject)
                    .bind(window)
                    .fetch_all(&self.pool)
                    .await?
            },
            None => {
                let sql = format!("{COLUMNS} ORDER BY id DESC LIMIT ?");
                sqlx::query(&sql)
                    .bind(window)
                    .fetch_all(&self.pool)
                    .await?
            },
        };

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            let created_at: String = row.get("created_at");
            let timestamp = DateTime::parse_from_rfc3339(&created_at)
                .with_context(|| format!("bad timestamp in memory database: {created_at}"))?
                .with_timezone(&Utc);
            entries.push(HistoryEntry {
                channel_id: ChannelId(row.get::<i64, _>("channel_id") as u64),
                channel: row.get("channel"),
                author: row.get("author"),
                content: row.get("content"),
                timestamp,
                from_bot: row.get::<i64, _>("from_bot") != 0,
            });
        }
        Ok(entries)
    }

    /// Write the records, their bot replies and run rows in one transaction.
    async fn write_records(&self, records: &[MemoryRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            for entry in HistoryEntry::from_record(record, &self.options.bot_name)? {
                sqlx::query(
                    "INSERT INTO messages (channel_id, channel, author, content, created_at, from_bot)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(entry.channel_id.0 as i64)
                .bind(&entry.channel)
                .bind(&entry.author)
                .bind(&entry.content)
                .bind(timestamp(&entry.timestamp))
                .bind(i64::from(entry.from_bot))
                .execute(&mut *tx)
                .await?;
            }

            let selected = record.selected()?;
            sqlx::query(
                "INSERT INTO runs (channel_id, channel, selected_index, selected_author, selected_content, cognition, response, replied, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(selected.channel_id.0 as i64)
            .bind(&selected.channel)
            .bind(record.selection_index as i64)
            .bind(&selected.author)
            .bind(&selected.content)
            .bind(serde_json::to_string(&record.cognition)?)
            .bind(&record.response)
            .bind(i64::from(record.replied))
            .bind(timestamp(&Utc::now()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn fetch_history(
        &self,
        subject: &str,
        query: Option<&str>,
        user_specific: bool,
    ) -> Result<String> {
        let scope = HistoryScope::new(subject, user_specific);
        let limit = self.options.history_limit;
        let ranked = user_specific && query.is_some();
        let window = if ranked {
            RANKING_WINDOW
        } else {
            limit as i64
        };
        let entries = self.load_entries(Some(scope), window).await?;
        let query = if ranked { query } else { None };
        Ok(select_and_render(&entries, query, limit))
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

        if let Err(e) = self.write_records(&pending).await {
            warn!(records = pending.len(), error = %e, "memory flush failed, records kept");
            let mut queue = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let newer = std::mem::replace(&mut *queue, pending);
            queue.extend(newer);
            return Err(e);
        }

        debug!(records = pending.len(), "memory flushed");
        #[cfg(feature = "metrics")]
        counter!(memory_metrics::RECORDS_FLUSHED_TOTAL).increment(pending.len() as u64);
        Ok(())
    }

    async fn recall(&self, topics: &[String]) -> Result<Vec<String>> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.load_entries(None, RANKING_WINDOW).await?;
        Ok(recall_snippets(&entries, topics, self.options.recall_limit))
    }
}
