//! Schema tree: arena storage plus search, selection, and highlight state.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};

use crate::services::api::{SchemaApi, Server};
use crate::stores::ServerStructureCell;

/// Search texts shorter than this clear the result view instead of running.
pub const MIN_SEARCH_LENGTH: usize = 3;

/// Opaque handle into the tree arena. Ids are positional and regenerated on
/// every rebuild; stale handles resolve to nothing rather than panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Server,
    Database,
    Table,
    Column,
}

/// Per-node view flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeState {
    pub expanded: bool,
    pub selected: bool,
    pub highlighted: bool,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub state: NodeState,
}

/// Flat id-indexed tree storage with parent links. Traversals work a stack
/// of ids instead of recursing through the node graph, so depth is bounded
/// by the arena and traversal order is easy to test.
#[derive(Debug, Clone, Default)]
pub struct TreeArena {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
}

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fixed-depth Server -> Database -> Table -> Column tree.
    /// The server root starts expanded.
    pub fn from_server(server: &Server) -> Self {
        let mut arena = Self::new();
        let root = arena.push(&server.name, NodeKind::Server, None);
        if let Some(node) = arena.get_mut(root) {
            node.state.expanded = true;
        }
        for database in &server.databases {
            let db_id = arena.push(&database.name, NodeKind::Database, Some(root));
            for table in &database.tables {
                let table_id = arena.push(&table.name, NodeKind::Table, Some(db_id));
                for column in &table.columns {
                    arena.push(&column.name, NodeKind::Column, Some(table_id));
                }
            }
        }
        arena
    }

    /// Append a node under `parent` (or as a root) and return its id.
    pub fn push(&mut self, name: &str, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TreeNode {
            id,
            name: name.to_string(),
            kind,
            parent,
            children: Vec::new(),
            state: NodeState::default(),
        });
        match parent.and_then(|parent| self.get_mut(parent)) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut TreeNode> {
        self.nodes.iter_mut()
    }

    /// Depth-first pre-order over the whole tree: every ancestor is yielded
    /// before its descendants.
    pub fn preorder(&self) -> Preorder<'_> {
        let stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        Preorder { arena: self, stack }
    }

    /// Strict ancestors of `id`, nearest first, by following parent links.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: self.get(id).and_then(|node| node.parent),
        }
    }
}

pub struct Preorder<'a> {
    arena: &'a TreeArena,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(node) = self.arena.get(id) {
                self.stack.extend(node.children.iter().rev().copied());
                return Some(node);
            }
        }
        None
    }
}

pub struct Ancestors<'a> {
    arena: &'a TreeArena,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|node| node.parent);
        Some(id)
    }
}

/// View-state change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// The tree was rebuilt from a fresh structure fetch.
    Loaded,
    SelectionChanged,
    FilterChanged,
    HighlightChanged,
    Collapsed,
    /// The tree was replaced wholesale by outside manipulation.
    NodesReplaced,
}

type TreeSubscriber = Box<dyn Fn(&TreeEvent) + Send + Sync>;

#[derive(Default)]
struct TreeState {
    arena: TreeArena,
    /// Flat pre-order search result; a parallel view, never node flags.
    filtered: Vec<NodeId>,
    highlighted: Option<NodeId>,
    last_selected: Option<NodeId>,
    /// Database the selection sync last targeted; re-applied after reloads.
    synced_database: Option<String>,
}

/// Store owning the loaded schema tree and its search/selection/highlight
/// view state.
pub struct TreeStore {
    state: Arc<RwLock<TreeState>>,
    subscribers: Arc<Mutex<Vec<TreeSubscriber>>>,
    schema: Arc<dyn SchemaApi>,
    structure: ServerStructureCell,
}

impl TreeStore {
    pub fn new(schema: Arc<dyn SchemaApi>, structure: ServerStructureCell) -> Self {
        Self {
            state: Arc::new(RwLock::new(TreeState::default())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            schema,
            structure,
        }
    }

    // ========== Observation ==========

    pub fn subscribe(&self, subscriber: impl Fn(&TreeEvent) + Send + Sync + 'static) {
        self.subscribers.lock().push(Box::new(subscriber));
    }

    pub fn arena(&self) -> TreeArena {
        self.state.read().arena.clone()
    }

    pub fn node(&self, id: NodeId) -> Option<TreeNode> {
        self.state.read().arena.get(id).cloned()
    }

    /// Current search results in pre-order.
    pub fn filtered_nodes(&self) -> Vec<TreeNode> {
        let state = self.state.read();
        state
            .filtered
            .iter()
            .filter_map(|id| state.arena.get(*id).cloned())
            .collect()
    }

    pub fn highlighted_node(&self) -> Option<TreeNode> {
        let state = self.state.read();
        state
            .highlighted
            .and_then(|id| state.arena.get(id).cloned())
    }

    pub fn selected_node(&self) -> Option<TreeNode> {
        let state = self.state.read();
        state
            .last_selected
            .and_then(|id| state.arena.get(id).cloned())
    }

    /// Last loaded server structure, as published to the shared cell.
    pub fn server_structure(&self) -> Option<Server> {
        self.structure.read().clone()
    }

    // ========== Operations ==========

    /// Fetch the schema structure and rebuild the tree from scratch. All
    /// previous expand/select/highlight state is discarded; selection sync
    /// re-runs against the remembered active-editor database.
    pub async fn load_data(&self) -> Result<()> {
        let server = self.schema.load_database_structure().await?;

        let synced = {
            let mut state = self.state.write();
            state.arena = TreeArena::from_server(&server);
            state.filtered.clear();
            state.highlighted = None;
            state.last_selected = None;
            state.synced_database.clone()
        };

        *self.structure.write() = Some(server);
        tracing::debug!(nodes = self.state.read().arena.len(), "schema tree loaded");
        self.notify(&TreeEvent::Loaded);

        self.select_db_node(synced);
        Ok(())
    }

    /// Move the selected flag to the database node named `database`. The
    /// search stays at server/database depth; table and column names never
    /// match. No match (or `None`) leaves the selection untouched.
    pub fn select_db_node(&self, database: Option<String>) {
        let mut changed = false;
        {
            let mut state = self.state.write();
            state.synced_database = database.clone();

            if let Some(name) = database.as_deref() {
                if let Some(found) = find_db_node(&state.arena, name) {
                    if state.last_selected != Some(found) {
                        if let Some(prev) = state.last_selected.take() {
                            if let Some(node) = state.arena.get_mut(prev) {
                                node.state.selected = false;
                            }
                        }
                        if let Some(node) = state.arena.get_mut(found) {
                            node.state.selected = true;
                        }
                        state.last_selected = Some(found);
                        changed = true;
                    }
                }
            }
        }
        if changed {
            self.notify(&TreeEvent::SelectionChanged);
        }
    }

    /// Rebuild the flat search-result view. Texts shorter than
    /// `MIN_SEARCH_LENGTH` clear it without touching the tree; otherwise
    /// every non-root node whose name contains `text` (case-insensitive)
    /// is collected in pre-order.
    pub fn filter(&self, text: &str) {
        {
            let mut state = self.state.write();
            if text.chars().count() < MIN_SEARCH_LENGTH {
                state.filtered.clear();
            } else {
                let needle = text.to_lowercase();
                let matches: Vec<NodeId> = state
                    .arena
                    .preorder()
                    .filter(|node| {
                        node.kind != NodeKind::Server
                            && node.name.to_lowercase().contains(&needle)
                    })
                    .map(|node| node.id)
                    .collect();
                state.filtered = matches;
            }
        }
        self.notify(&TreeEvent::FilterChanged);
    }

    /// Highlight one node and make it visible by expanding every ancestor.
    /// Entering highlight mode clears the search-result view; a missing id
    /// leaves no node highlighted.
    pub fn highlight_node(&self, id: NodeId) {
        {
            let mut state = self.state.write();
            state.filtered.clear();

            if let Some(prev) = state.highlighted.take() {
                if let Some(node) = state.arena.get_mut(prev) {
                    node.state.highlighted = false;
                }
            }

            if state.arena.get(id).is_some() {
                let ancestors: Vec<NodeId> = state.arena.ancestors(id).collect();
                if let Some(node) = state.arena.get_mut(id) {
                    node.state.highlighted = true;
                }
                for ancestor in ancestors {
                    if let Some(node) = state.arena.get_mut(ancestor) {
                        node.state.expanded = true;
                    }
                }
                state.highlighted = Some(id);
            }
        }
        self.notify(&TreeEvent::HighlightChanged);
    }

    /// Collapse every expanded node; already collapsed nodes are untouched.
    pub fn collapse_all(&self) {
        let mut changed = false;
        {
            let mut state = self.state.write();
            for node in state.arena.nodes_mut() {
                if node.state.expanded {
                    node.state.expanded = false;
                    changed = true;
                }
            }
        }
        if changed {
            self.notify(&TreeEvent::Collapsed);
        }
    }

    /// Replace the tree wholesale, keeping remembered selection/highlight
    /// ids; stale ids simply stop resolving.
    pub fn update_tree_nodes(&self, arena: TreeArena) {
        self.state.write().arena = arena;
        self.notify(&TreeEvent::NodesReplaced);
    }

    fn notify(&self, event: &TreeEvent) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
    }
}

/// Depth-restricted search: walk server nodes, test database nodes, never
/// descend into tables or columns.
fn find_db_node(arena: &TreeArena, name: &str) -> Option<NodeId> {
    let mut stack: Vec<NodeId> = arena.roots().iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let Some(node) = arena.get(id) else { continue };
        match node.kind {
            NodeKind::Database if node.name == name => return Some(id),
            NodeKind::Server => stack.extend(node.children.iter().rev().copied()),
            _ => {}
        }
    }
    None
}
