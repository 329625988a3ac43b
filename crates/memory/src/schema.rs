//! Migrations for the conversation memory database.

/// Run database migrations for the memory store.
///
/// Creates the `messages` and `runs` tables. Safe to call on every start.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> crate::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
