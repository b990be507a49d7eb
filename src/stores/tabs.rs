//! Tab lifecycle, draft editing, persistence, and query orchestration.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use sqlformat::{format, FormatOptions, QueryParams};
use uuid::Uuid;

use crate::services::api::{ColumnDescriptor, Query, QueryApi, QuerySettings, SchemaApi, Table};
use crate::services::storage::{SqlHistoryLog, TabRecord, TabStorage};
use crate::stores::tab::{
    EditedTab, InsertTextKind, QueriesResult, QueryError, QueryOutcome, QueryResultEntry, Tab,
    TabType, TextInsertTarget,
};
use crate::stores::ServerStructureCell;

/// Interval of the backstop timer that re-persists the full tab snapshot.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Committed-state-changed notifications, delivered synchronously after each
/// atomic transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabsEvent {
    /// Tab collection membership changed.
    TabsChanged,
    /// The active tab reference changed.
    ActiveTabChanged,
    /// A tab's payload changed in place (draft commit, batch results).
    TabUpdated(Uuid),
    /// The draft snapshot opened, closed, or was discarded.
    DraftChanged,
}

type TabsSubscriber = Box<dyn Fn(&TabsEvent) + Send + Sync>;

#[derive(Default)]
struct TabsState {
    tabs: Vec<Tab>,
    active_tab_id: Option<Uuid>,
    edited: Option<EditedTab>,
}

impl TabsState {
    fn active_tab(&self) -> Option<&Tab> {
        self.active_tab_id
            .and_then(|id| self.tabs.iter().find(|tab| tab.id == id))
    }

    fn active_editor(&self) -> Option<&Tab> {
        self.active_tab()
            .filter(|tab| tab.tab_type() == TabType::Editor)
    }

    fn active_editor_database(&self) -> Option<String> {
        self.active_editor()
            .and_then(|tab| tab.as_editor())
            .and_then(|editor| editor.current_database.clone())
    }

    /// Move the active reference; an actual change discards an open draft.
    /// Returns (active_changed, draft_discarded).
    fn set_active(&mut self, id: Option<Uuid>) -> (bool, bool) {
        if self.active_tab_id == id {
            return (false, false);
        }
        self.active_tab_id = id;
        let discarded = self.edited.take().is_some();
        (true, discarded)
    }

    fn records(&self) -> Vec<TabRecord> {
        self.tabs.iter().map(Tab::to_record).collect()
    }
}

/// What one committed transition touched; drives reactions and events.
#[derive(Debug, Clone, Copy, Default)]
struct Changes {
    tabs: bool,
    active: bool,
    updated: Option<Uuid>,
    draft: bool,
}

/// Store owning the ordered tab collection, the active tab, the draft
/// snapshot, and the execution of query batches.
pub struct TabsStore {
    state: Arc<RwLock<TabsState>>,
    /// Ids of queries in flight, across all batches.
    executing: Arc<Mutex<HashSet<Uuid>>>,
    subscribers: Arc<Mutex<Vec<TabsSubscriber>>>,
    autosave: Mutex<Option<smol::Task<()>>>,
    autosave_interval: Duration,
    disposed: AtomicBool,
    storage: Arc<dyn TabStorage>,
    history: Arc<dyn SqlHistoryLog>,
    schema: Arc<dyn SchemaApi>,
    queries_api: Arc<dyn QueryApi>,
    structure: ServerStructureCell,
    query_settings: QuerySettings,
}

impl TabsStore {
    pub fn new(
        storage: Arc<dyn TabStorage>,
        history: Arc<dyn SqlHistoryLog>,
        schema: Arc<dyn SchemaApi>,
        queries_api: Arc<dyn QueryApi>,
        structure: ServerStructureCell,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(TabsState::default())),
            executing: Arc::new(Mutex::new(HashSet::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            autosave: Mutex::new(None),
            autosave_interval: AUTOSAVE_INTERVAL,
            disposed: AtomicBool::new(false),
            storage,
            history,
            schema,
            queries_api,
            structure,
            query_settings: QuerySettings::default(),
        }
    }

    /// Override the autosave interval (shortened in tests).
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    // ========== Observation ==========

    pub fn subscribe(&self, subscriber: impl Fn(&TabsEvent) + Send + Sync + 'static) {
        self.subscribers.lock().push(Box::new(subscriber));
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.state.read().tabs.clone()
    }

    pub fn active_tab_id(&self) -> Option<Uuid> {
        self.state.read().active_tab_id
    }

    pub fn active_tab(&self) -> Option<Tab> {
        self.state.read().active_tab().cloned()
    }

    /// The active tab, if it is an editor.
    pub fn active_editor(&self) -> Option<Tab> {
        self.state.read().active_editor().cloned()
    }

    /// Current database of the active editor tab, if any.
    pub fn active_editor_database(&self) -> Option<String> {
        self.state.read().active_editor_database()
    }

    pub fn edited_tab(&self) -> Option<EditedTab> {
        self.state.read().edited.clone()
    }

    /// Ids of queries currently in flight.
    pub fn executing_queries(&self) -> HashSet<Uuid> {
        self.executing.lock().clone()
    }

    // ========== Lifecycle ==========

    /// Restore tabs and the active-tab id from storage, then make sure the
    /// workspace is usable: resolve the active tab (persisted id, else the
    /// first tab) and create a default editor when nothing was restored.
    /// All resulting mutations land in one state transition.
    pub async fn load_data(&self) -> Result<()> {
        let restored_tabs = if self.state.read().tabs.is_empty() {
            let records = self.storage.get_tabs().await?;
            Some(records.into_iter().map(Tab::from_record).collect::<Vec<_>>())
        } else {
            None
        };

        let restored_active = if self.state.read().active_tab_id.is_none() {
            self.storage.get_active_tab_id().await?
        } else {
            None
        };

        let mut changes = Changes::default();
        {
            let mut state = self.state.write();

            if let Some(tabs) = restored_tabs {
                if !tabs.is_empty() {
                    state.tabs = tabs;
                    changes.tabs = true;
                }
            }

            if state.active_tab_id.is_none() {
                let resolved = restored_active
                    .filter(|id| state.tabs.iter().any(|tab| tab.id == *id))
                    .or_else(|| state.tabs.first().map(|tab| tab.id));
                if resolved.is_some() {
                    let (active, draft) = state.set_active(resolved);
                    changes.active |= active;
                    changes.draft |= draft;
                }
            }

            if state.tabs.is_empty() {
                let tab = self.build_editor_tab(&state, None);
                let id = tab.id;
                state.tabs.push(tab);
                changes.tabs = true;
                let (active, draft) = state.set_active(Some(id));
                changes.active |= active;
                changes.draft |= draft;
            }
        }

        tracing::debug!(tabs = self.state.read().tabs.len(), "workspace tabs loaded");
        self.after_commit(changes);
        Ok(())
    }

    /// Start the fixed-interval snapshot backstop.
    pub fn start_autosave(&self) {
        let state = self.state.clone();
        let storage = self.storage.clone();
        let interval = self.autosave_interval;
        let task = smol::spawn(async move {
            loop {
                smol::Timer::after(interval).await;
                let records = state.read().records();
                if let Err(err) = storage.save_tabs(records).await {
                    tracing::warn!("autosave failed: {err:#}");
                }
            }
        });
        *self.autosave.lock() = Some(task);
    }

    /// Stop the autosave timer and detach every reaction and subscriber.
    /// No persistence happens after this returns.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.autosave.lock().take();
        self.subscribers.lock().clear();
    }

    // ========== Tab operations ==========

    /// Activate the tab with `id`; a missing id leaves the active tab unset.
    pub fn set_active_tab(&self, id: Uuid) {
        let mut changes = Changes::default();
        {
            let mut state = self.state.write();
            let found = state.tabs.iter().find(|tab| tab.id == id).map(|tab| tab.id);
            let (active, draft) = state.set_active(found);
            if !active && !draft {
                return;
            }
            changes.active = active;
            changes.draft = draft;
        }
        self.after_commit(changes);
    }

    /// Append a new editor tab and activate it. The default database falls
    /// back from the active editor to the first database of the loaded tree.
    pub fn open_new_editor_tab(&self, content: Option<String>) -> Uuid {
        let mut changes = Changes { tabs: true, ..Changes::default() };
        let id;
        {
            let mut state = self.state.write();
            let tab = self.build_editor_tab(&state, content);
            id = tab.id;
            state.tabs.push(tab);
            let (active, draft) = state.set_active(Some(id));
            changes.active = active;
            changes.draft = draft;
        }
        self.after_commit(changes);
        id
    }

    pub fn open_processes_tab(&self) {
        self.open_special_tab(TabType::Processes);
    }

    pub fn open_metrics_tab(&self) {
        self.open_special_tab(TabType::Metrics);
    }

    pub fn open_server_overview_tab(&self) {
        self.open_special_tab(TabType::ServerOverview);
    }

    pub fn open_db_overview_tab(&self) {
        self.open_special_tab(TabType::DbOverview);
    }

    pub fn open_sql_history_tab(&self) {
        self.open_special_tab(TabType::SqlHistory);
    }

    /// Reuse or create the single instance of a singleton kind, then
    /// activate it. A no-op when the active tab already has that type.
    fn open_special_tab(&self, tab_type: TabType) {
        let mut changes = Changes::default();
        {
            let mut state = self.state.write();
            if state
                .active_tab()
                .map(|tab| tab.tab_type() == tab_type)
                .unwrap_or(false)
            {
                return;
            }

            let id = match state.tabs.iter().find(|tab| tab.tab_type() == tab_type) {
                Some(tab) => tab.id,
                None => {
                    let tab = Tab::special(tab_type);
                    let id = tab.id;
                    state.tabs.push(tab);
                    changes.tabs = true;
                    id
                }
            };

            let (active, draft) = state.set_active(Some(id));
            changes.active = active;
            changes.draft = draft;
        }
        self.after_commit(changes);
    }

    /// Remove the tab with `id`; the last remaining tab becomes active.
    pub fn remove_tab(&self, id: Uuid) {
        let mut changes = Changes { tabs: true, ..Changes::default() };
        {
            let mut state = self.state.write();
            let before = state.tabs.len();
            state.tabs.retain(|tab| tab.id != id);
            if state.tabs.len() == before {
                return;
            }
            let last = state.tabs.last().map(|tab| tab.id);
            let (active, draft) = state.set_active(last);
            changes.active = active;
            changes.draft = draft;
        }
        self.after_commit(changes);
    }

    /// Attach (or detach) the text surface of a rendered editor tab.
    pub fn set_insert_target(&self, tab_id: Uuid, target: Option<Arc<dyn TextInsertTarget>>) {
        let mut state = self.state.write();
        if let Some(editor) = state
            .tabs
            .iter_mut()
            .find(|tab| tab.id == tab_id)
            .and_then(Tab::as_editor_mut)
        {
            editor.insert_target = target;
        }
    }

    // ========== Text insertion ==========

    /// Route text into the active editor's surface; silent no-op when the
    /// active tab is not an editor or has no surface attached.
    pub fn insert_text_to_editor(&self, text: &str, kind: InsertTextKind) {
        let target = {
            let state = self.state.read();
            state
                .active_editor()
                .and_then(|tab| tab.as_editor())
                .and_then(|editor| editor.insert_target.clone())
        };
        if let Some(target) = target {
            target.insert_text(text, kind);
        }
    }

    /// Fetch descriptive SQL for a table and insert it into the editor.
    pub async fn insert_table_sql_describe(&self, table: &Table) -> Result<()> {
        let text = self
            .schema
            .make_table_describe(&table.database, &table.name)
            .await?;
        self.insert_text_to_editor(&text, InsertTextKind::Sql);
        Ok(())
    }

    /// Build a `SELECT ... LIMIT 100` over all columns of a table and insert
    /// it into the editor. Date-typed columns are constrained to today.
    pub async fn insert_select_from(&self, table: &Table) -> Result<()> {
        let columns = self
            .schema
            .get_table_columns(&table.database, &table.name)
            .await?;
        let sql = build_select_from(table, &columns);
        self.insert_text_to_editor(&sql, InsertTextKind::Sql);
        Ok(())
    }

    // ========== Draft editing ==========

    /// Open a draft snapshot of the active editor tab. No-op when the
    /// active tab is not an editor.
    pub fn show_save_modal(&self) {
        let mut opened = false;
        {
            let mut state = self.state.write();
            let snapshot = state.active_tab().and_then(EditedTab::capture);
            if let Some(snapshot) = snapshot {
                state.edited = Some(snapshot);
                opened = true;
            }
        }
        if opened {
            self.after_commit(Changes { draft: true, ..Changes::default() });
        }
    }

    /// Replace the open draft with an edited snapshot. Ignored when no
    /// draft is open or the snapshot belongs to a different tab.
    pub fn update_edited_tab(&self, draft: EditedTab) {
        let mut changed = false;
        {
            let mut state = self.state.write();
            if state.edited.as_ref().map(|edited| edited.tab_id) == Some(draft.tab_id) {
                state.edited = Some(draft);
                changed = true;
            }
        }
        if changed {
            self.after_commit(Changes { draft: true, ..Changes::default() });
        }
    }

    /// Commit the draft onto the underlying tab, persist that tab, then
    /// close the draft. A persistence failure surfaces to the caller and
    /// leaves the draft open.
    pub async fn save_edited_tab(&self) -> Result<()> {
        let committed = {
            let mut state = self.state.write();
            let Some(edited) = state.edited.clone() else {
                return Ok(());
            };
            match state.tabs.iter().position(|tab| tab.id == edited.tab_id) {
                Some(index) => {
                    let tab = &mut state.tabs[index];
                    tab.title = edited.title.clone();
                    if let Some(editor) = tab.as_editor_mut() {
                        editor.content = edited.content.clone();
                        editor.current_database = edited.current_database.clone();
                    }
                    Some((tab.id, tab.to_record()))
                }
                None => {
                    // The draft's tab vanished; nothing left to commit.
                    state.edited = None;
                    None
                }
            }
        };

        let Some((tab_id, record)) = committed else {
            return Ok(());
        };
        self.storage
            .save_tab(record)
            .await
            .context("Failed to save edited tab")?;

        let mut changes = Changes { updated: Some(tab_id), ..Changes::default() };
        {
            let mut state = self.state.write();
            if state.edited.as_ref().map(|edited| edited.tab_id) == Some(tab_id) {
                state.edited = None;
                changes.draft = true;
            }
        }
        self.after_commit(changes);
        Ok(())
    }

    /// Discard the draft without committing.
    pub fn hide_save_modal(&self) {
        let discarded = self.state.write().edited.take().is_some();
        if discarded {
            self.after_commit(Changes { draft: true, ..Changes::default() });
        }
    }

    // ========== Query execution ==========

    /// Execute a batch of queries concurrently and, once every query has
    /// settled, write the full result list plus aggregate statistics onto
    /// the editor tab that owned the batch. Per-query failures are captured
    /// as outcomes, never raised. Original SQL texts go to the history log
    /// regardless of execution results.
    pub async fn exec_queries(&self, queries: Vec<Query>) {
        if queries.is_empty() {
            return;
        }

        let texts: Vec<String> = queries.iter().map(|q| q.sql_original.clone()).collect();
        let history = self.history.clone();
        smol::spawn(async move {
            if let Err(err) = history.add_items(texts).await {
                tracing::warn!("failed to record query history: {err:#}");
            }
        })
        .detach();

        // The batch belongs to the editor that was active at submit time.
        let Some(tab_id) = self.state.read().active_editor().map(|tab| tab.id) else {
            return;
        };

        let futures: Vec<_> = queries
            .into_iter()
            .map(|mut query| {
                query.settings = self.query_settings.clone();
                let api = self.queries_api.clone();
                let executing = self.executing.clone();
                async move {
                    executing.lock().insert(query.id);
                    let outcome = match api.fetch(&query).await {
                        Ok(data) => QueryOutcome::Data(data),
                        Err(err) => QueryOutcome::Error(QueryError {
                            message: err.to_string(),
                        }),
                    };
                    // Settled either way; the in-flight set must not leak.
                    executing.lock().remove(&query.id);
                    QueryResultEntry {
                        query_id: query.id,
                        outcome,
                    }
                }
            })
            .collect();

        let list = join_all(futures).await;
        let result = QueriesResult::from_list(list);

        let mut applied = false;
        {
            let mut state = self.state.write();
            if let Some(editor) = state
                .tabs
                .iter_mut()
                .find(|tab| tab.id == tab_id)
                .and_then(Tab::as_editor_mut)
            {
                editor.queries_result = Some(result);
                applied = true;
            }
        }
        // The owning tab may have been removed while the batch ran.
        if applied {
            self.after_commit(Changes {
                updated: Some(tab_id),
                ..Changes::default()
            });
        }
    }

    // ========== Internals ==========

    fn build_editor_tab(&self, state: &TabsState, content: Option<String>) -> Tab {
        // Count-based titles; duplicates can appear after removals.
        let title = format!("SQL {}", state.tabs.len() + 1);
        let database = state.active_editor_database().or_else(|| {
            self.structure
                .read()
                .as_ref()
                .and_then(|server| server.databases.first())
                .map(|db| db.name.clone())
        });
        Tab::editor(title, content, database)
    }

    /// Run persistence reactions and notify subscribers for one committed
    /// transition. Invoked with no state lock held.
    fn after_commit(&self, changes: Changes) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        if changes.tabs {
            let storage = self.storage.clone();
            let records = self.state.read().records();
            smol::spawn(async move {
                if let Err(err) = storage.save_tabs(records).await {
                    tracing::warn!("failed to persist tabs: {err:#}");
                }
            })
            .detach();
        }

        if changes.active {
            let storage = self.storage.clone();
            let id = self.state.read().active_tab_id;
            smol::spawn(async move {
                if let Err(err) = storage.save_active_tab_id(id).await {
                    tracing::warn!("failed to persist active tab id: {err:#}");
                }
            })
            .detach();
        }

        if changes.tabs {
            self.notify(&TabsEvent::TabsChanged);
        }
        if changes.active {
            self.notify(&TabsEvent::ActiveTabChanged);
        }
        if let Some(id) = changes.updated {
            self.notify(&TabsEvent::TabUpdated(id));
        }
        if changes.draft {
            self.notify(&TabsEvent::DraftChanged);
        }
    }

    fn notify(&self, event: &TabsEvent) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
    }
}

fn build_select_from(table: &Table, columns: &[ColumnDescriptor]) -> String {
    let mut fields = Vec::new();
    let mut predicates = Vec::new();
    for column in columns {
        fields.push(column.name.clone());
        if column.is_date() {
            predicates.push(format!("{}=today()", column.name));
        }
    }

    // Dotted table names need quoting to survive the db.table qualifier.
    let table_name = if table.name.contains('.') {
        format!("\"{}\"", table.name)
    } else {
        table.name.clone()
    };

    let where_clause = if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM {}.{}{} LIMIT 100",
        fields.join(", "),
        table.database,
        table_name,
        where_clause
    );
    format(&sql, &QueryParams::None, &FormatOptions::default())
}
