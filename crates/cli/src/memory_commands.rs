use std::{path::PathBuf, sync::Arc};

use {
    anyhow::bail,
    clap::Args,
    tracing::info,
    trinity_config::{MemoryBackend, TrinityConfig},
    trinity_memory::{InMemoryStore, MemoryOptions, MemoryStore, SqliteMemoryStore},
};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Channel name, or author name with `--user`.
    pub subject: String,
    /// Treat the subject as an author and include all their channels.
    #[arg(long, default_value_t = false)]
    pub user: bool,
    /// Rank the author's messages against this text (with `--user`).
    #[arg(long)]
    pub query: Option<String>,
}

fn memory_options(cfg: &TrinityConfig) -> MemoryOptions {
    MemoryOptions {
        bot_name: cfg.identity.name.clone(),
        history_limit: cfg.memory.history_limit,
        recall_limit: cfg.memory.recall_limit,
    }
}

/// Resolve the memory.db path, defaulting into the data directory.
pub fn memory_db_path(cfg: &TrinityConfig) -> PathBuf {
    cfg.memory
        .db_path
        .clone()
        .unwrap_or_else(|| trinity_config::data_dir().join("memory.db"))
}

/// Open the configured memory backend.
pub async fn open_store(cfg: &TrinityConfig) -> anyhow::Result<Arc<dyn MemoryStore>> {
    let options = memory_options(cfg);
    match cfg.memory.backend {
        MemoryBackend::Memory => {
            info!("using in-process memory, history is lost on exit");
            Ok(Arc::new(InMemoryStore::new(options)))
        },
        MemoryBackend::Sqlite => {
            let path = memory_db_path(cfg);
            let store = SqliteMemoryStore::open(&path, options).await?;
            info!(path = %path.display(), "memory database opened");
            Ok(Arc::new(store))
        },
    }
}

pub async fn handle_history(cfg: &TrinityConfig, args: HistoryArgs) -> anyhow::Result<()> {
    if cfg.memory.backend == MemoryBackend::Memory {
        bail!("the in-memory backend keeps no history between runs");
    }
    let db_path = memory_db_path(cfg);
    if !db_path.exists() {
        bail!(
            "Memory database not found at {}. Run the bot first to record history.",
            db_path.display()
        );
    }

    let store = SqliteMemoryStore::open(&db_path, memory_options(cfg)).await?;
    let rendered = store
        .fetch_history(&args.subject, args.query.as_deref(), args.user)
        .await?;

    eprintln!(
        "{} run(s) recorded in {}\n",
        store.run_count().await?,
        db_path.display()
    );
    if rendered.is_empty() {
        println!("No history for {}.", args.subject);
    } else {
        println!("{rendered}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_backend_opens_without_disk() {
        let mut cfg = TrinityConfig::default();
        cfg.memory.backend = MemoryBackend::Memory;
        let store = open_store(&cfg).await.unwrap();
        assert!(store.fetch_history("general", None, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_backend_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = TrinityConfig::default();
        cfg.memory.db_path = Some(dir.path().join("nested").join("memory.db"));

        open_store(&cfg).await.unwrap();
        assert!(memory_db_path(&cfg).exists());
    }

    #[tokio::test]
    async fn history_needs_an_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = TrinityConfig::default();
        cfg.memory.db_path = Some(dir.path().join("missing.db"));

        let err = handle_history(&cfg, HistoryArgs {
            subject: "general".into(),
            user: false,
            query: None,
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
