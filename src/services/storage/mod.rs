//! Unified SQLite storage for the workspace.

mod history;
mod tabs;
mod types;

pub use history::SqlHistoryRepository;
pub use tabs::TabsRepository;
pub use types::*;

use anyhow::Result;
use async_lock::OnceCell;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Persistence contract for the tab collection.
///
/// `save_tabs` replaces the full snapshot; `save_tab` upserts one record.
/// Implementations must tolerate repeated overwrites of the same logical
/// record (last write wins).
#[async_trait]
pub trait TabStorage: Send + Sync {
    async fn save_tabs(&self, tabs: Vec<TabRecord>) -> Result<()>;
    async fn save_tab(&self, tab: TabRecord) -> Result<()>;
    async fn get_tabs(&self) -> Result<Vec<TabRecord>>;
    async fn get_active_tab_id(&self) -> Result<Option<Uuid>>;
    async fn save_active_tab_id(&self, id: Option<Uuid>) -> Result<()>;
}

/// Append-only log of executed query texts.
#[async_trait]
pub trait SqlHistoryLog: Send + Sync {
    async fn add_items(&self, items: Vec<String>) -> Result<()>;
}

/// Shared workspace storage backed by SQLite.
#[derive(Debug, Clone)]
pub struct AppStore {
    pool: SqlitePool,
}

/// Global singleton instance
static STORE: OnceCell<AppStore> = OnceCell::new();

impl AppStore {
    /// Get or initialize the global AppStore singleton.
    /// Schema initialization only runs once.
    pub async fn singleton() -> Result<&'static Self> {
        STORE.get_or_try_init(Self::init).await
    }

    pub async fn init() -> Result<Self> {
        let db_path = Self::get_db_path()?;
        Self::from_path(db_path).await
    }

    /// Open (or create) a store at an explicit path.
    pub async fn from_path(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store. The data lives only as long as the single
    /// pooled connection, which suits tests and throwaway sessions.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    fn get_db_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".sqlbench").join("sqlbench.db"))
    }

    /// Get a tabs repository
    pub fn tabs(&self) -> TabsRepository {
        TabsRepository::new(self.pool.clone())
    }

    /// Get a query history repository
    pub fn history(&self) -> SqlHistoryRepository {
        SqlHistoryRepository::new(self.pool.clone())
    }

    /// Initialize the database schema
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
                CREATE TABLE IF NOT EXISTS tabs (
                    id TEXT PRIMARY KEY,
                    position INTEGER NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )
                "#,
        )
        .execute(&self.pool)
        .await?;

        // Index on position so snapshots come back in insertion order
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tabs_position ON tabs(position)")
            .execute(&self.pool)
            .await?;

        // Single-row settings such as the active tab id
        sqlx::query(
            r#"
                CREATE TABLE IF NOT EXISTS workspace (
                    key TEXT PRIMARY KEY,
                    value TEXT
                )
                "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
                CREATE TABLE IF NOT EXISTS sql_history (
                    id TEXT PRIMARY KEY,
                    sql TEXT NOT NULL,
                    recorded_at TIMESTAMP NOT NULL
                )
                "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_recorded ON sql_history(recorded_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
