//! Persisted record types.
//!
//! This module contains:
//! - `TabRecord`/`TabRecordKind` - the serialized form of a workspace tab
//! - `SqlHistoryEntry` - one logged query text

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serialized form of a tab, as stored in the `tabs` table.
///
/// Transient editor state (in-flight results, the text-insertion surface)
/// is never part of the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabRecord {
    pub id: Uuid,
    pub title: String,
    #[serde(flatten)]
    pub kind: TabRecordKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabRecordKind {
    Editor {
        content: String,
        current_database: Option<String>,
    },
    Processes,
    Metrics,
    ServerOverview,
    DbOverview,
    SqlHistory,
}

/// One logged query, most recent entries first when listed.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlHistoryEntry {
    pub id: Uuid,
    pub sql: String,
    pub recorded_at: DateTime<Utc>,
}
