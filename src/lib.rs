//! Client-side workspace state for a SQL workbench: the open-tab collection
//! with its query orchestration, and the schema tree with search, selection,
//! and highlight state. Views, the query transport, and the text buffer are
//! external collaborators injected through the traits in `services`.

pub mod services;
pub mod stores;

pub use services::api::{
    Column, ColumnDescriptor, Database, Query, QueryApi, QueryData, QuerySettings, SchemaApi,
    Server, Statistics, Table,
};
pub use services::storage::{
    AppStore, SqlHistoryEntry, SqlHistoryLog, SqlHistoryRepository, TabRecord, TabRecordKind,
    TabStorage, TabsRepository,
};
pub use stores::{
    EditedTab, EditorTab, InsertTextKind, NodeId, NodeKind, NodeState, QueriesResult, QueryError,
    QueryOutcome, QueryResultEntry, Tab, TabKind, TabType, TabsEvent, TabsStore, TextInsertTarget,
    TreeArena, TreeEvent, TreeNode, TreeStore, Workbench,
};
