//! Workspace state stores and their wiring.

pub mod tab;
pub mod tabs;
pub mod tree;

#[cfg(test)]
pub(crate) mod fixtures;

pub use tab::*;
pub use tabs::{TabsEvent, TabsStore, AUTOSAVE_INTERVAL};
pub use tree::{
    NodeId, NodeKind, NodeState, TreeArena, TreeEvent, TreeNode, TreeStore, MIN_SEARCH_LENGTH,
};

use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use crate::services::api::{QueryApi, SchemaApi, Server};
use crate::services::storage::{AppStore, SqlHistoryLog, TabStorage};

/// Last loaded server structure, shared read-only between the stores. The
/// tree store publishes into it; the tabs store reads the first database as
/// the default for new editors.
pub type ServerStructureCell = Arc<RwLock<Option<Server>>>;

/// Both stores wired together over a shared structure cell.
///
/// The tree observes the tabs store and keeps its selection on the active
/// editor's database; the tabs store reads the loaded structure for new-tab
/// defaults. Call `init` once after construction and `dispose` on teardown.
pub struct Workbench {
    pub tabs: Arc<TabsStore>,
    pub tree: Arc<TreeStore>,
}

impl Workbench {
    pub fn new(
        storage: Arc<dyn TabStorage>,
        history: Arc<dyn SqlHistoryLog>,
        schema: Arc<dyn SchemaApi>,
        queries: Arc<dyn QueryApi>,
    ) -> Self {
        let structure: ServerStructureCell = Arc::new(RwLock::new(None));
        let tabs = Arc::new(TabsStore::new(
            storage,
            history,
            schema.clone(),
            queries,
            structure.clone(),
        ));
        let tree = Arc::new(TreeStore::new(schema, structure));
        Self { tabs, tree }
    }

    /// Production wiring over the shared SQLite store.
    pub async fn open(schema: Arc<dyn SchemaApi>, queries: Arc<dyn QueryApi>) -> Result<Self> {
        let store = AppStore::singleton().await?;
        Ok(Self::new(
            Arc::new(store.tabs()),
            Arc::new(store.history()),
            schema,
            queries,
        ))
    }

    /// Start the autosave backstop and the selection-sync reaction.
    pub fn init(&self) {
        self.tabs.start_autosave();

        let tabs = Arc::downgrade(&self.tabs);
        let tree = self.tree.clone();
        self.tabs.subscribe(move |event| match event {
            TabsEvent::ActiveTabChanged | TabsEvent::TabUpdated(_) => {
                if let Some(tabs) = tabs.upgrade() {
                    tree.select_db_node(tabs.active_editor_database());
                }
            }
            _ => {}
        });
    }

    /// Stop the autosave timer and detach every reaction; nothing persists
    /// after this returns.
    pub fn dispose(&self) {
        self.tabs.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{arc, sample_server, MemoryHistory, MemoryStorage, ScriptedQueries, StaticSchema};
    use super::*;

    fn workbench() -> Workbench {
        Workbench::new(
            arc(MemoryStorage::default()),
            arc(MemoryHistory::default()),
            arc(StaticSchema::new(sample_server())),
            arc(ScriptedQueries::default()),
        )
    }

    #[test]
    fn test_tree_selection_follows_the_active_editor_database() {
        smol::block_on(async {
            let wb = workbench();
            wb.init();
            wb.tree.load_data().await.unwrap();

            // The new editor inherits the first database of the structure,
            // and activating it drags the tree selection along.
            wb.tabs.open_new_editor_tab(None);
            assert_eq!(
                wb.tree.selected_node().map(|node| node.name),
                Some("analytics".to_string())
            );

            // Committing a draft that changes the database re-syncs.
            wb.tabs.show_save_modal();
            let mut draft = wb.tabs.edited_tab().unwrap();
            draft.current_database = Some("billing".to_string());
            wb.tabs.update_edited_tab(draft);
            wb.tabs.save_edited_tab().await.unwrap();

            assert_eq!(
                wb.tree.selected_node().map(|node| node.name),
                Some("billing".to_string())
            );

            wb.dispose();
        });
    }

    #[test]
    fn test_tree_selection_survives_a_structure_reload() {
        smol::block_on(async {
            let wb = workbench();
            wb.init();
            wb.tree.load_data().await.unwrap();

            wb.tabs.open_new_editor_tab(None);
            assert!(wb.tree.selected_node().is_some());

            // Rebuilding the tree discards node state, then re-applies the
            // remembered database.
            wb.tree.load_data().await.unwrap();
            assert_eq!(
                wb.tree.selected_node().map(|node| node.name),
                Some("analytics".to_string())
            );

            wb.dispose();
        });
    }

    #[test]
    fn test_default_database_comes_from_the_loaded_tree() {
        smol::block_on(async {
            let wb = workbench();
            wb.init();

            // Before any structure load the editor has no database.
            let first = wb.tabs.open_new_editor_tab(None);
            assert_eq!(wb.tabs.active_editor_database(), None);

            wb.tree.load_data().await.unwrap();
            wb.tabs.remove_tab(first);
            wb.tabs.open_new_editor_tab(None);
            assert_eq!(wb.tabs.active_editor_database().as_deref(), Some("analytics"));

            wb.dispose();
        });
    }
}
