//! Tab snapshot repository over SQLite.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::types::TabRecord;
use super::TabStorage;

const ACTIVE_TAB_KEY: &str = "active_tab_id";

/// Repository for the persisted tab collection.
///
/// The full snapshot is the unit of persistence: `save_tabs` rewrites the
/// whole table so the stored set always matches one committed in-memory
/// state. Records are JSON payloads keyed by tab id, ordered by position.
#[derive(Debug, Clone)]
pub struct TabsRepository {
    pool: SqlitePool,
}

impl TabsRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TabStorage for TabsRepository {
    /// Replace the persisted snapshot with `tabs`, in order.
    async fn save_tabs(&self, tabs: Vec<TabRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tabs").execute(&mut *tx).await?;

        for (position, tab) in tabs.iter().enumerate() {
            let payload = serde_json::to_string(tab).context("Failed to serialize tab")?;
            sqlx::query(
                r#"
                INSERT INTO tabs (id, position, payload, updated_at)
                VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
                "#,
            )
            .bind(tab.id.to_string())
            .bind(position as i64)
            .bind(payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Upsert a single record; a new id is appended after the existing tabs.
    async fn save_tab(&self, tab: TabRecord) -> Result<()> {
        let payload = serde_json::to_string(&tab).context("Failed to serialize tab")?;

        sqlx::query(
            r#"
            INSERT INTO tabs (id, position, payload, updated_at)
            VALUES (?1, (SELECT COUNT(*) FROM tabs), ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(tab.id.to_string())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the last-saved snapshot, in saved order.
    async fn get_tabs(&self) -> Result<Vec<TabRecord>> {
        let rows =
            sqlx::query_as::<_, (String,)>("SELECT payload FROM tabs ORDER BY position, rowid")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(payload,)| {
                serde_json::from_str(&payload).context("Invalid tab payload in database")
            })
            .collect()
    }

    async fn get_active_tab_id(&self) -> Result<Option<Uuid>> {
        let row =
            sqlx::query_as::<_, (Option<String>,)>("SELECT value FROM workspace WHERE key = ?1")
                .bind(ACTIVE_TAB_KEY)
                .fetch_optional(&self.pool)
                .await?;

        match row.and_then(|(value,)| value) {
            Some(value) => {
                let id = Uuid::parse_str(&value).context("Invalid UUID in workspace store")?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Persist the active tab id; `None` clears the stored value.
    async fn save_active_tab_id(&self, id: Option<Uuid>) -> Result<()> {
        match id {
            Some(id) => {
                sqlx::query(
                    r#"
                    INSERT INTO workspace (key, value)
                    VALUES (?1, ?2)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value
                    "#,
                )
                .bind(ACTIVE_TAB_KEY)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM workspace WHERE key = ?1")
                    .bind(ACTIVE_TAB_KEY)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}
