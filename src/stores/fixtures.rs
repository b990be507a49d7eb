//! In-memory collaborator fakes shared by the store tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::services::api::{
    Column, ColumnDescriptor, Database, Query, QueryApi, QueryData, SchemaApi, Server, Statistics,
    Table,
};
use crate::services::storage::{SqlHistoryLog, TabRecord, TabStorage};
use crate::stores::tab::{InsertTextKind, TextInsertTarget};

/// Tab storage over plain vectors, with call counters for reaction tests.
#[derive(Default)]
pub(crate) struct MemoryStorage {
    pub tabs: Mutex<Vec<TabRecord>>,
    pub active: Mutex<Option<Uuid>>,
    pub save_tabs_calls: AtomicUsize,
    pub save_tab_calls: AtomicUsize,
    pub save_active_calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn save_tabs_count(&self) -> usize {
        self.save_tabs_calls.load(Ordering::SeqCst)
    }

    pub fn save_active_count(&self) -> usize {
        self.save_active_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabStorage for MemoryStorage {
    async fn save_tabs(&self, tabs: Vec<TabRecord>) -> Result<()> {
        *self.tabs.lock() = tabs;
        self.save_tabs_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_tab(&self, tab: TabRecord) -> Result<()> {
        let mut tabs = self.tabs.lock();
        match tabs.iter_mut().find(|existing| existing.id == tab.id) {
            Some(existing) => *existing = tab,
            None => tabs.push(tab),
        }
        self.save_tab_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_tabs(&self) -> Result<Vec<TabRecord>> {
        Ok(self.tabs.lock().clone())
    }

    async fn get_active_tab_id(&self) -> Result<Option<Uuid>> {
        Ok(*self.active.lock())
    }

    async fn save_active_tab_id(&self, id: Option<Uuid>) -> Result<()> {
        *self.active.lock() = id;
        self.save_active_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// History log collecting appended texts.
#[derive(Default)]
pub(crate) struct MemoryHistory {
    pub items: Mutex<Vec<String>>,
}

#[async_trait]
impl SqlHistoryLog for MemoryHistory {
    async fn add_items(&self, items: Vec<String>) -> Result<()> {
        self.items.lock().extend(items);
        Ok(())
    }
}

/// Schema service answering from a fixed structure.
pub(crate) struct StaticSchema {
    pub server: Server,
    pub columns: Vec<ColumnDescriptor>,
    pub describe: String,
}

impl StaticSchema {
    pub fn new(server: Server) -> Self {
        Self {
            server,
            columns: Vec::new(),
            describe: String::new(),
        }
    }
}

#[async_trait]
impl SchemaApi for StaticSchema {
    async fn load_database_structure(&self) -> Result<Server> {
        Ok(self.server.clone())
    }

    async fn get_table_columns(
        &self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.columns.clone())
    }

    async fn make_table_describe(&self, database: &str, table: &str) -> Result<String> {
        if self.describe.is_empty() {
            Ok(format!("CREATE TABLE {database}.{table} (...)"))
        } else {
            Ok(self.describe.clone())
        }
    }
}

/// Query service with scripted per-sql outcomes; unscripted statements
/// succeed with empty stats.
#[derive(Default)]
pub(crate) struct ScriptedQueries {
    outcomes: Mutex<HashMap<String, Result<QueryData, String>>>,
}

impl ScriptedQueries {
    pub fn succeed(&self, sql: &str, stats: Statistics) {
        self.outcomes.lock().insert(
            sql.to_string(),
            Ok(QueryData {
                stats,
                ..QueryData::default()
            }),
        );
    }

    pub fn fail(&self, sql: &str, message: &str) {
        self.outcomes
            .lock()
            .insert(sql.to_string(), Err(message.to_string()));
    }
}

#[async_trait]
impl QueryApi for ScriptedQueries {
    async fn fetch(&self, query: &Query) -> Result<QueryData> {
        match self.outcomes.lock().get(&query.sql) {
            Some(Ok(data)) => Ok(data.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Ok(QueryData::default()),
        }
    }
}

/// Query service that blocks each fetch until the gate releases it.
pub(crate) struct GatedQueries {
    gate: async_channel::Receiver<()>,
}

impl GatedQueries {
    pub fn new() -> (Self, async_channel::Sender<()>) {
        let (sender, gate) = async_channel::unbounded();
        (Self { gate }, sender)
    }
}

#[async_trait]
impl QueryApi for GatedQueries {
    async fn fetch(&self, _query: &Query) -> Result<QueryData> {
        self.gate.recv().await?;
        Ok(QueryData::default())
    }
}

/// Insert target recording everything routed into it.
#[derive(Default)]
pub(crate) struct RecordingTarget {
    pub inserts: Mutex<Vec<(String, InsertTextKind)>>,
}

impl TextInsertTarget for RecordingTarget {
    fn insert_text(&self, text: &str, kind: InsertTextKind) {
        self.inserts.lock().push((text.to_string(), kind));
    }
}

/// Small fixed structure used across tests:
/// server "clickhouse" with databases "analytics" (events, sessions) and
/// "billing" (invoices).
pub(crate) fn sample_server() -> Server {
    let events = Table {
        database: "analytics".to_string(),
        name: "events".to_string(),
        columns: vec![
            column("analytics", "events", "event_date", "Date"),
            column("analytics", "events", "user_id", "UInt64"),
        ],
    };
    let sessions = Table {
        database: "analytics".to_string(),
        name: "sessions".to_string(),
        columns: vec![column("analytics", "sessions", "session_id", "UUID")],
    };
    let invoices = Table {
        database: "billing".to_string(),
        name: "invoices".to_string(),
        columns: vec![column("billing", "invoices", "amount", "Decimal64")],
    };

    Server {
        name: "clickhouse".to_string(),
        databases: vec![
            Database {
                name: "analytics".to_string(),
                tables: vec![events, sessions],
            },
            Database {
                name: "billing".to_string(),
                tables: vec![invoices],
            },
        ],
    }
}

fn column(database: &str, table: &str, name: &str, data_type: &str) -> Column {
    Column {
        database: database.to_string(),
        table: table.to_string(),
        name: name.to_string(),
        data_type: data_type.to_string(),
    }
}

/// Poll `condition` until it holds, panicking after 2 s.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        smol::Timer::after(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

pub(crate) fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
