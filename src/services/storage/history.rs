use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::types::SqlHistoryEntry;
use super::SqlHistoryLog;

/// Repository for query history operations.
#[derive(Debug, Clone)]
pub struct SqlHistoryRepository {
    pool: SqlitePool,
}

impl SqlHistoryRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the most recent entries (newest first)
    pub async fn recent(&self, limit: u32) -> Result<Vec<SqlHistoryEntry>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT id, sql, recorded_at
            FROM sql_history
            ORDER BY recorded_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, sql, recorded_at)| {
                Ok(SqlHistoryEntry {
                    id: Uuid::parse_str(&id).context("Invalid UUID in history")?,
                    sql,
                    recorded_at: NaiveDateTime::parse_from_str(&recorded_at, "%Y-%m-%d %H:%M:%S")
                        .map(|dt| dt.and_utc())
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .collect()
    }

    /// Drop all logged entries
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM sql_history")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Prune old entries, keeping only the most recent N
    pub async fn prune(&self, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM sql_history
            WHERE id NOT IN (
                SELECT id FROM sql_history
                ORDER BY recorded_at DESC, rowid DESC
                LIMIT ?1
            )
            "#,
        )
        .bind(keep)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SqlHistoryLog for SqlHistoryRepository {
    /// Append query texts, one entry per statement
    async fn add_items(&self, items: Vec<String>) -> Result<()> {
        for sql in items {
            sqlx::query(
                r#"
                INSERT INTO sql_history (id, sql, recorded_at)
                VALUES (?1, ?2, datetime('now'))
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(sql)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::AppStore;
    use super::*;

    #[test]
    fn test_add_and_list_recent() {
        smol::block_on(async {
            let store = AppStore::in_memory().await.unwrap();
            let repo = store.history();

            repo.add_items(vec![
                "SELECT 1".to_string(),
                "SELECT 2".to_string(),
                "SELECT 3".to_string(),
            ])
            .await
            .unwrap();

            let entries = repo.recent(10).await.unwrap();
            let texts: Vec<&str> = entries.iter().map(|e| e.sql.as_str()).collect();
            assert_eq!(texts, vec!["SELECT 3", "SELECT 2", "SELECT 1"]);

            let limited = repo.recent(1).await.unwrap();
            assert_eq!(limited.len(), 1);
            assert_eq!(limited[0].sql, "SELECT 3");
        });
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        smol::block_on(async {
            let store = AppStore::in_memory().await.unwrap();
            let repo = store.history();

            let items: Vec<String> = (1..=5).map(|i| format!("SELECT {i}")).collect();
            repo.add_items(items).await.unwrap();

            let removed = repo.prune(2).await.unwrap();
            assert_eq!(removed, 3);

            let entries = repo.recent(10).await.unwrap();
            let texts: Vec<&str> = entries.iter().map(|e| e.sql.as_str()).collect();
            assert_eq!(texts, vec!["SELECT 5", "SELECT 4"]);
        });
    }

    #[test]
    fn test_clear() {
        smol::block_on(async {
            let store = AppStore::in_memory().await.unwrap();
            let repo = store.history();

            repo.add_items(vec!["SELECT 1".to_string()]).await.unwrap();
            repo.clear().await.unwrap();
            assert!(repo.recent(10).await.unwrap().is_empty());
        });
    }
}
