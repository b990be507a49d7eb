//! Tab model: one closed sum type over every tab kind the workspace shows.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::services::api::{QueryData, Statistics};
use crate::services::storage::{TabRecord, TabRecordKind};

/// How inserted text should be treated by the receiving editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTextKind {
    /// A full SQL statement or fragment.
    Sql,
    /// A bare identifier such as a column or table name.
    Identifier,
}

/// An editable text surface an editor tab can route text into.
///
/// The workspace never owns the text buffer itself; views register a target
/// on the tab they render and the store routes insertions through it.
pub trait TextInsertTarget: Send + Sync {
    fn insert_text(&self, text: &str, kind: InsertTextKind);
}

/// Payload of an editor tab.
#[derive(Clone, Default)]
pub struct EditorTab {
    pub content: String,
    pub current_database: Option<String>,
    /// Results of the last executed batch; never persisted.
    pub queries_result: Option<QueriesResult>,
    /// Text surface of the rendered editor; never persisted.
    pub insert_target: Option<Arc<dyn TextInsertTarget>>,
}

impl fmt::Debug for EditorTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorTab")
            .field("content", &self.content)
            .field("current_database", &self.current_database)
            .field("queries_result", &self.queries_result)
            .field("insert_target", &self.insert_target.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum TabKind {
    Editor(EditorTab),
    Processes,
    Metrics,
    ServerOverview,
    DbOverview,
    SqlHistory,
}

/// Fieldless discriminant of `TabKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabType {
    Editor,
    Processes,
    Metrics,
    ServerOverview,
    DbOverview,
    SqlHistory,
}

impl TabType {
    /// Every kind except the editor exists at most once in the collection.
    pub fn is_singleton(self) -> bool {
        !matches!(self, TabType::Editor)
    }

    pub(crate) fn default_title(self) -> &'static str {
        match self {
            TabType::Editor => "SQL",
            TabType::Processes => "Processes",
            TabType::Metrics => "Metrics",
            TabType::ServerOverview => "Server overview",
            TabType::DbOverview => "Database overview",
            TabType::SqlHistory => "SQL history",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tab {
    pub id: Uuid,
    pub title: String,
    pub kind: TabKind,
}

impl Tab {
    pub fn editor(title: impl Into<String>, content: Option<String>, database: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            kind: TabKind::Editor(EditorTab {
                content: content.unwrap_or_default(),
                current_database: database,
                ..EditorTab::default()
            }),
        }
    }

    /// Construct a singleton tab with its fixed title.
    pub fn special(tab_type: TabType) -> Self {
        let kind = match tab_type {
            TabType::Editor => TabKind::Editor(EditorTab::default()),
            TabType::Processes => TabKind::Processes,
            TabType::Metrics => TabKind::Metrics,
            TabType::ServerOverview => TabKind::ServerOverview,
            TabType::DbOverview => TabKind::DbOverview,
            TabType::SqlHistory => TabKind::SqlHistory,
        };
        Self {
            id: Uuid::new_v4(),
            title: tab_type.default_title().to_string(),
            kind,
        }
    }

    pub fn tab_type(&self) -> TabType {
        match self.kind {
            TabKind::Editor(_) => TabType::Editor,
            TabKind::Processes => TabType::Processes,
            TabKind::Metrics => TabType::Metrics,
            TabKind::ServerOverview => TabType::ServerOverview,
            TabKind::DbOverview => TabType::DbOverview,
            TabKind::SqlHistory => TabType::SqlHistory,
        }
    }

    pub fn as_editor(&self) -> Option<&EditorTab> {
        match &self.kind {
            TabKind::Editor(editor) => Some(editor),
            _ => None,
        }
    }

    pub fn as_editor_mut(&mut self) -> Option<&mut EditorTab> {
        match &mut self.kind {
            TabKind::Editor(editor) => Some(editor),
            _ => None,
        }
    }

    pub fn to_record(&self) -> TabRecord {
        let kind = match &self.kind {
            TabKind::Editor(editor) => TabRecordKind::Editor {
                content: editor.content.clone(),
                current_database: editor.current_database.clone(),
            },
            TabKind::Processes => TabRecordKind::Processes,
            TabKind::Metrics => TabRecordKind::Metrics,
            TabKind::ServerOverview => TabRecordKind::ServerOverview,
            TabKind::DbOverview => TabRecordKind::DbOverview,
            TabKind::SqlHistory => TabRecordKind::SqlHistory,
        };
        TabRecord {
            id: self.id,
            title: self.title.clone(),
            kind,
        }
    }

    pub fn from_record(record: TabRecord) -> Self {
        let kind = match record.kind {
            TabRecordKind::Editor {
                content,
                current_database,
            } => TabKind::Editor(EditorTab {
                content,
                current_database,
                ..EditorTab::default()
            }),
            TabRecordKind::Processes => TabKind::Processes,
            TabRecordKind::Metrics => TabKind::Metrics,
            TabRecordKind::ServerOverview => TabKind::ServerOverview,
            TabRecordKind::DbOverview => TabKind::DbOverview,
            TabRecordKind::SqlHistory => TabKind::SqlHistory,
        };
        Self {
            id: record.id,
            title: record.title,
            kind,
        }
    }
}

/// Draft snapshot of an editor tab, live between edit start and
/// commit/cancel. The underlying tab is untouched until the commit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditedTab {
    pub tab_id: Uuid,
    pub title: String,
    pub content: String,
    pub current_database: Option<String>,
}

impl EditedTab {
    /// Capture a snapshot of an editor tab; other kinds are not editable.
    pub(crate) fn capture(tab: &Tab) -> Option<Self> {
        tab.as_editor().map(|editor| Self {
            tab_id: tab.id,
            title: tab.title.clone(),
            content: editor.content.clone(),
            current_database: editor.current_database.clone(),
        })
    }
}

/// Failure of a single query, kept as data on the batch result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    pub message: String,
}

/// Outcome of one query of a batch.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Data(QueryData),
    Error(QueryError),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Data(_))
    }

    pub fn stats(&self) -> Option<&Statistics> {
        match self {
            QueryOutcome::Data(data) => Some(&data.stats),
            QueryOutcome::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryResultEntry {
    pub query_id: Uuid,
    pub outcome: QueryOutcome,
}

/// Settled results of a whole batch, written onto the owning editor tab in
/// one step once every query has finished.
#[derive(Debug, Clone)]
pub struct QueriesResult {
    pub list: Vec<QueryResultEntry>,
    pub total_stats: Statistics,
}

impl QueriesResult {
    /// Aggregate statistics over the successful outcomes only.
    pub fn from_list(list: Vec<QueryResultEntry>) -> Self {
        let mut total_stats = Statistics::default();
        for entry in &list {
            if let Some(stats) = entry.outcome.stats() {
                total_stats.add(stats);
            }
        }
        Self { list, total_stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_types() {
        assert!(!TabType::Editor.is_singleton());
        assert!(TabType::Processes.is_singleton());
        assert!(TabType::SqlHistory.is_singleton());
    }

    #[test]
    fn test_record_round_trip_drops_transient_state() {
        let mut tab = Tab::editor("SQL 1", Some("SELECT 1".to_string()), Some("db".to_string()));
        if let Some(editor) = tab.as_editor_mut() {
            editor.queries_result = Some(QueriesResult::from_list(vec![]));
        }

        let restored = Tab::from_record(tab.to_record());
        let editor = restored.as_editor().unwrap();
        assert_eq!(editor.content, "SELECT 1");
        assert_eq!(editor.current_database.as_deref(), Some("db"));
        assert!(editor.queries_result.is_none());
        assert!(editor.insert_target.is_none());
    }

    #[test]
    fn test_record_serialization_is_tagged() {
        let record = Tab::special(TabType::Processes).to_record();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"processes\""));

        let record = Tab::editor("SQL 1", None, None).to_record();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"editor\""));
    }

    #[test]
    fn test_aggregate_counts_only_successes() {
        let success = QueryResultEntry {
            query_id: Uuid::new_v4(),
            outcome: QueryOutcome::Data(QueryData {
                stats: Statistics {
                    time_elapsed: 10.0,
                    rows_read: 100,
                    bytes_read: 1000,
                },
                ..QueryData::default()
            }),
        };
        let failure = QueryResultEntry {
            query_id: Uuid::new_v4(),
            outcome: QueryOutcome::Error(QueryError {
                message: "boom".to_string(),
            }),
        };

        let result = QueriesResult::from_list(vec![success, failure]);
        assert_eq!(
            result.total_stats,
            Statistics {
                time_elapsed: 10.0,
                rows_read: 100,
                bytes_read: 1000,
            }
        );
        assert_eq!(result.list.len(), 2);
    }
}
