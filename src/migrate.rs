use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the lease, lock and summary tables if they do not exist.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // Active provider leases, holders is a JSON array of requester ids
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leases (
            key TEXT PRIMARY KEY,
            holders TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Named locks shared between processes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS locks (
            name TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cached summaries keyed by content hash
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            config TEXT NOT NULL,
            result TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_created ON summaries(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
