//! SQLite-backed [`LeaseStore`] and [`SummaryCache`] implementations.
//!
//! Both wrap a shared [`SqlitePool`] and assume the schema created by
//! [`crate::migrate::migrate`]. Lease holders are stored as a JSON array so
//! a lease row can be inspected with plain `sqlite3`.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use summary_harness_core::models::SummaryResult;
use summary_harness_core::store::{CacheEntry, LeaseStore, SummaryCache};

/// SQLite implementation of the [`LeaseStore`] trait.
pub struct SqliteLeaseStore {
    pool: SqlitePool,
}

impl SqliteLeaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_holders(key: &str, raw: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(raw).with_context(|| format!("corrupt holders for lease '{}'", key))
}

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn holders(&self, key: &str) -> Result<BTreeSet<String>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT holders FROM leases WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match raw {
            Some(raw) => parse_holders(key, &raw),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn set_holders(&self, key: &str, holders: &BTreeSet<String>) -> Result<()> {
        if holders.is_empty() {
            sqlx::query("DELETE FROM leases WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let raw = serde_json::to_string(holders)?;
        sqlx::query(
            r#"
            INSERT INTO leases (key, holders, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                holders = excluded.holders,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, BTreeSet<String>)>> {
        let rows = sqlx::query("SELECT key, holders FROM leases ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("key");
            let raw: String = row.get("holders");
            let holders = parse_holders(&key, &raw)?;
            if !holders.is_empty() {
                entries.push((key, holders));
            }
        }
        Ok(entries)
    }
}

/// SQLite implementation of the [`SummaryCache`] trait.
pub struct SqliteSummaryCache {
    pool: SqlitePool,
}

impl SqliteSummaryCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryCache for SqliteSummaryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT text, config, result, prompt_tokens, output_tokens, cost FROM summaries WHERE id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CacheEntry {
            text: row.get("text"),
            config: row.get("config"),
            result: SummaryResult {
                text: row.get("result"),
                prompt_tokens: row.get::<i64, _>("prompt_tokens").max(0) as u64,
                output_tokens: row.get::<i64, _>("output_tokens").max(0) as u64,
                cost: row.get("cost"),
            },
        }))
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO summaries (id, text, config, result, prompt_tokens, output_tokens, cost, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                result = excluded.result,
                prompt_tokens = excluded.prompt_tokens,
                output_tokens = excluded.output_tokens,
                cost = excluded.cost
            "#,
        )
        .bind(key)
        .bind(&entry.text)
        .bind(&entry.config)
        .bind(&entry.result.text)
        .bind(entry.result.prompt_tokens as i64)
        .bind(entry.result.output_tokens as i64)
        .bind(entry.result.cost)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
