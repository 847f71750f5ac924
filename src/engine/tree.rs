//! Component Tree - The hierarchical store of blocks on one page.
//!
//! Blocks live in an arena keyed by [`BlockId`]. Ownership is a parent
//! pointer per block plus an ordered sibling list per parent (the root list
//! is keyed by `None`). Every structural operation validates first and
//! commits second, so a rejected call leaves the tree exactly as it was.
//!
//! # Invariants
//!
//! 1. The parent relation is a forest: no block is its own ancestor.
//! 2. A parent assigned by `create` or `move_block` is a live, non-archived block.
//! 3. Sibling `order_index` values are exactly `0..n` under every parent,
//!    archived siblings included.
//! 4. Archiving is shallow. Archived blocks keep their position; they and
//!    their subtrees are filtered out of the active-tree queries.
//!
//! # API
//!
//! - `create` / `rename` / `update_property` / `update_style` /
//!   `update_binding` / `update_event` - block edits
//! - `move_block` - reparent and reorder in one step
//! - `archive` / `restore` (shallow) and `archive_subtree` / `restore_subtree`
//! - `root_blocks` / `children` / `active_blocks` - active-tree queries
//! - `subscribe` - change notifications, delivered after each commit
//!
//! # Example
//!
//! ```ignore
//! let mut tree = ComponentTree::new();
//! let a = tree.create(None, BlockType::Container, BTreeMap::new())?.id;
//! let b = tree.create(Some(&a), BlockType::Button, BTreeMap::new())?.id;
//!
//! tree.move_block(&b, None, 0)?;            // b becomes the first root
//! assert!(tree.move_block(&a, Some(&b), 0).is_ok());
//! assert!(tree.move_block(&b, Some(&a), 0).is_err()); // cycle
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use crate::config::TreeConfig;
use crate::error::{InvariantViolation, ParentRejection, TreeError};
use crate::types::{Binding, Block, BlockFields, BlockId, BlockType, FlowId, Value};

// =============================================================================
// Change Notifications
// =============================================================================

/// A committed change to the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeChange {
    Created {
        block_id: BlockId,
        parent_id: Option<BlockId>,
        index: usize,
    },
    Updated {
        block_id: BlockId,
        fields: BlockFields,
    },
    Moved {
        block_id: BlockId,
        from_parent: Option<BlockId>,
        to_parent: Option<BlockId>,
        index: usize,
    },
    Archived {
        block_id: BlockId,
    },
    Restored {
        block_id: BlockId,
    },
}

impl TreeChange {
    pub fn block_id(&self) -> &BlockId {
        match self {
            TreeChange::Created { block_id, .. }
            | TreeChange::Updated { block_id, .. }
            | TreeChange::Moved { block_id, .. }
            | TreeChange::Archived { block_id }
            | TreeChange::Restored { block_id } => block_id,
        }
    }

    /// Whether a running preview has to resync its event listeners.
    ///
    /// A new block has no events yet, so creation never does.
    pub fn affects_bindings(&self) -> bool {
        match self {
            TreeChange::Created { .. } => false,
            TreeChange::Updated { fields, .. } => fields.contains(BlockFields::EVENTS),
            TreeChange::Moved { .. }
            | TreeChange::Archived { .. }
            | TreeChange::Restored { .. } => true,
        }
    }
}

/// Handle returned by [`ComponentTree::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type ChangeListener = Rc<dyn Fn(&TreeChange, &ComponentTree)>;

// =============================================================================
// Tree Store
// =============================================================================

/// The block forest of one page.
pub struct ComponentTree {
    blocks: HashMap<BlockId, Block>,
    /// Ordered sibling lists, archived blocks included. `None` is the root list.
    children: HashMap<Option<BlockId>, Vec<BlockId>>,
    config: TreeConfig,
    listeners: Vec<(ListenerId, ChangeListener)>,
    next_listener: usize,
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentTree")
            .field("blocks", &self.blocks.len())
            .field("roots", &self.children.get(&None).map_or(0, Vec::len))
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            blocks: HashMap::new(),
            children: HashMap::new(),
            config,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Rebuild a tree from stored blocks.
    ///
    /// Parents must exist and the parent relation must be acyclic. Sibling
    /// order is taken from the stored `order_index` (ties broken by id) and
    /// renormalized to `0..n`.
    pub fn from_blocks(blocks: Vec<Block>, config: TreeConfig) -> Result<Self, InvariantViolation> {
        let mut tree = Self::with_config(config);

        for block in blocks {
            if tree.blocks.contains_key(&block.id) {
                return Err(InvariantViolation::DuplicateId(block.id));
            }
            tree.blocks.insert(block.id.clone(), block);
        }

        for block in tree.blocks.values() {
            if let Some(parent) = &block.parent_id {
                if !tree.blocks.contains_key(parent) {
                    return Err(InvariantViolation::MissingParent {
                        block: block.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        // Walks longer than the arena size can only mean a cycle.
        let limit = tree.blocks.len();
        for block in tree.blocks.values() {
            let mut current = block.parent_id.as_ref();
            let mut steps = 0;
            while let Some(id) = current {
                steps += 1;
                if id == &block.id || steps > limit {
                    return Err(InvariantViolation::Cycle(block.id.clone()));
                }
                current = tree.blocks.get(id).and_then(|b| b.parent_id.as_ref());
            }
        }

        let mut grouped: HashMap<Option<BlockId>, Vec<(usize, BlockId)>> = HashMap::new();
        for block in tree.blocks.values() {
            grouped
                .entry(block.parent_id.clone())
                .or_default()
                .push((block.order_index, block.id.clone()));
        }
        for (parent, mut siblings) in grouped {
            siblings.sort();
            let list = siblings.into_iter().map(|(_, id)| id).collect();
            tree.children.insert(parent.clone(), list);
            tree.renormalize(&parent);
        }

        Ok(tree)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every block, archived ones included, in no particular order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn parent_of(&self, id: &BlockId) -> Option<&BlockId> {
        self.blocks.get(id).and_then(|b| b.parent_id.as_ref())
    }

    /// Ancestor chain of `id`, nearest parent first.
    pub fn ancestors(&self, id: &BlockId) -> Vec<BlockId> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if chain.len() >= self.blocks.len() {
                break;
            }
            chain.push(parent.clone());
            current = self.parent_of(parent);
        }
        chain
    }

    /// Depth-first, pre-order descendants of `id` (archived included).
    pub fn descendants(&self, id: &BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack: Vec<&BlockId> = self
            .children
            .get(&Some(id.clone()))
            .map(|list| list.iter().rev().collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            out.push(current.clone());
            if let Some(list) = self.children.get(&Some(current.clone())) {
                stack.extend(list.iter().rev());
            }
        }
        out
    }

    /// True when neither the block nor any ancestor is archived.
    pub fn is_active(&self, id: &BlockId) -> bool {
        let Some(block) = self.blocks.get(id) else {
            return false;
        };
        !block.archived
            && self
                .ancestors(id)
                .iter()
                .all(|a| self.blocks.get(a).is_some_and(|b| !b.archived))
    }

    /// Depth of a block; roots have depth 1.
    fn depth(&self, id: &BlockId) -> usize {
        self.ancestors(id).len() + 1
    }

    /// Height of the subtree rooted at `id`; a leaf has height 1.
    fn subtree_height(&self, id: &BlockId) -> usize {
        let base = self.depth(id);
        self.descendants(id)
            .iter()
            .map(|d| self.depth(d) - base + 1)
            .max()
            .unwrap_or(1)
    }

    // =========================================================================
    // Active-tree Queries
    // =========================================================================

    /// Non-archived roots, ordered by `order_index`.
    pub fn root_blocks(&self) -> Vec<&Block> {
        self.active_in(&None)
    }

    /// Non-archived children of `id`, ordered by `order_index`.
    ///
    /// An archived block, or one under an archived ancestor, has no active
    /// children.
    pub fn children(&self, id: &BlockId) -> Result<Vec<&Block>, TreeError> {
        if !self.blocks.contains_key(id) {
            return Err(TreeError::NotFound(id.clone()));
        }
        if !self.is_active(id) {
            return Ok(Vec::new());
        }
        Ok(self.active_in(&Some(id.clone())))
    }

    /// Every active block in render order (depth-first, pre-order).
    pub fn active_blocks(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        let mut stack: Vec<&Block> = self.root_blocks().into_iter().rev().collect();
        while let Some(block) = stack.pop() {
            out.push(block);
            stack.extend(self.active_in(&Some(block.id.clone())).into_iter().rev());
        }
        out
    }

    fn active_in(&self, parent: &Option<BlockId>) -> Vec<&Block> {
        self.children
            .get(parent)
            .map(|list| {
                list.iter()
                    .filter_map(|id| self.blocks.get(id))
                    .filter(|b| !b.archived)
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Creation and In-place Edits
    // =========================================================================

    /// Append a new block as the last child of `parent_id` (or as the last
    /// root when `None`).
    pub fn create(
        &mut self,
        parent_id: Option<&BlockId>,
        block_type: BlockType,
        initial_properties: BTreeMap<String, Value>,
    ) -> Result<Block, TreeError> {
        if let Some(parent) = parent_id {
            self.check_parent(parent)?;
            if self.depth(parent) + 1 > self.config.max_depth {
                return Err(TreeError::InvalidParent {
                    parent: parent.clone(),
                    reason: ParentRejection::TooDeep(self.config.max_depth),
                });
            }
        }

        let parent_key = parent_id.cloned();
        let siblings = self.children.entry(parent_key.clone()).or_default();
        let block = Block {
            id: BlockId::new(),
            parent_id: parent_key.clone(),
            order_index: siblings.len(),
            name: block_type.label().to_string(),
            block_type,
            properties: initial_properties,
            styles: BTreeMap::new(),
            bindings: BTreeMap::new(),
            events: BTreeMap::new(),
            archived: false,
        };
        siblings.push(block.id.clone());
        self.blocks.insert(block.id.clone(), block.clone());

        tracing::debug!(block = %block.id, parent = ?parent_key, index = block.order_index, "tree.create");
        self.emit(TreeChange::Created {
            block_id: block.id.clone(),
            parent_id: parent_key,
            index: block.order_index,
        });
        Ok(block)
    }

    pub fn rename(&mut self, id: &BlockId, name: impl Into<String>) -> Result<(), TreeError> {
        self.edit(id, BlockFields::NAME, |block| block.name = name.into())
    }

    /// Set (`Some`) or clear (`None`) a raw property.
    pub fn update_property(
        &mut self,
        id: &BlockId,
        key: impl Into<String>,
        value: Option<Value>,
    ) -> Result<(), TreeError> {
        let key = key.into();
        self.edit(id, BlockFields::PROPERTIES, |block| match value {
            Some(value) => {
                block.properties.insert(key, value);
            }
            None => {
                block.properties.remove(&key);
            }
        })
    }

    /// Set (`Some`) or clear (`None`) a style declaration.
    pub fn update_style(
        &mut self,
        id: &BlockId,
        key: impl Into<String>,
        value: Option<String>,
    ) -> Result<(), TreeError> {
        let key = key.into();
        self.edit(id, BlockFields::STYLES, |block| match value {
            Some(value) => {
                block.styles.insert(key, value);
            }
            None => {
                block.styles.remove(&key);
            }
        })
    }

    /// Bind (`Some`) or unbind (`None`) a property.
    pub fn update_binding(
        &mut self,
        id: &BlockId,
        property: impl Into<String>,
        binding: Option<Binding>,
    ) -> Result<(), TreeError> {
        let property = property.into();
        self.edit(id, BlockFields::BINDINGS, |block| match binding {
            Some(binding) => {
                block.bindings.insert(property, binding);
            }
            None => {
                block.bindings.remove(&property);
            }
        })
    }

    /// Point an event at a flow (`Some`) or clear it (`None`).
    ///
    /// The flow id is not checked; a dangling reference is a no-op at
    /// dispatch time.
    pub fn update_event(
        &mut self,
        id: &BlockId,
        event: impl Into<String>,
        flow_id: Option<FlowId>,
    ) -> Result<(), TreeError> {
        let event = event.into();
        self.edit(id, BlockFields::EVENTS, |block| match flow_id {
            Some(flow_id) => {
                block.events.insert(event, flow_id);
            }
            None => {
                block.events.remove(&event);
            }
        })
    }

    fn edit(
        &mut self,
        id: &BlockId,
        fields: BlockFields,
        apply: impl FnOnce(&mut Block),
    ) -> Result<(), TreeError> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        apply(block);

        tracing::debug!(block = %id, ?fields, "tree.update");
        self.emit(TreeChange::Updated {
            block_id: id.clone(),
            fields,
        });
        Ok(())
    }

    // =========================================================================
    // Move
    // =========================================================================

    /// Reparent and reorder `id` in one step.
    ///
    /// `new_index` is clamped to the new sibling count. Both the old and the
    /// new sibling lists are renormalized to `0..n`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is unknown
    /// - `Cycle` if `new_parent` is `id` itself or one of its descendants
    /// - `InvalidParent` if `new_parent` is unknown, archived, or the move
    ///   would exceed the depth limit
    pub fn move_block(
        &mut self,
        id: &BlockId,
        new_parent: Option<&BlockId>,
        new_index: usize,
    ) -> Result<(), TreeError> {
        if let Err(err) = self.validate_move(id, new_parent) {
            tracing::warn!(block = %id, target = ?new_parent, error = %err, "tree.move rejected");
            return Err(err);
        }

        // Commit. Nothing below can fail.
        let from_parent = self.parent_of(id).cloned();
        if let Some(list) = self.children.get_mut(&from_parent) {
            list.retain(|sibling| sibling != id);
        }
        self.renormalize(&from_parent);

        let to_parent = new_parent.cloned();
        let list = self.children.entry(to_parent.clone()).or_default();
        let index = new_index.min(list.len());
        list.insert(index, id.clone());
        self.renormalize(&to_parent);

        if let Some(block) = self.blocks.get_mut(id) {
            block.parent_id = to_parent.clone();
        }

        tracing::debug!(block = %id, from = ?from_parent, to = ?to_parent, index, "tree.move");
        self.emit(TreeChange::Moved {
            block_id: id.clone(),
            from_parent,
            to_parent,
            index,
        });
        Ok(())
    }

    fn validate_move(&self, id: &BlockId, new_parent: Option<&BlockId>) -> Result<(), TreeError> {
        if !self.blocks.contains_key(id) {
            return Err(TreeError::NotFound(id.clone()));
        }
        let Some(target) = new_parent else {
            return Ok(());
        };

        if target == id || self.ancestors(target).contains(id) {
            return Err(TreeError::Cycle {
                block: id.clone(),
                target: target.clone(),
            });
        }
        self.check_parent(target)?;

        if self.depth(target) + self.subtree_height(id) > self.config.max_depth {
            return Err(TreeError::InvalidParent {
                parent: target.clone(),
                reason: ParentRejection::TooDeep(self.config.max_depth),
            });
        }
        Ok(())
    }

    fn check_parent(&self, parent: &BlockId) -> Result<(), TreeError> {
        match self.blocks.get(parent) {
            None => Err(TreeError::InvalidParent {
                parent: parent.clone(),
                reason: ParentRejection::Unknown,
            }),
            Some(block) if block.archived => Err(TreeError::InvalidParent {
                parent: parent.clone(),
                reason: ParentRejection::Archived,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Rewrite `order_index` of every sibling under `parent` to its position.
    fn renormalize(&mut self, parent: &Option<BlockId>) {
        let Some(list) = self.children.get(parent) else {
            return;
        };
        if list.is_empty() {
            self.children.remove(parent);
            return;
        }
        for (index, sibling) in list.iter().enumerate() {
            if let Some(block) = self.blocks.get_mut(sibling) {
                block.order_index = index;
            }
        }
    }

    // =========================================================================
    // Archive / Restore
    // =========================================================================

    /// Soft-delete one block. Children are left untouched.
    pub fn archive(&mut self, id: &BlockId) -> Result<(), TreeError> {
        self.set_archived(id, true)
    }

    /// Undo [`archive`](Self::archive). The block reappears at its old
    /// parent and index.
    pub fn restore(&mut self, id: &BlockId) -> Result<(), TreeError> {
        self.set_archived(id, false)
    }

    /// Archive a block and every descendant.
    pub fn archive_subtree(&mut self, id: &BlockId) -> Result<(), TreeError> {
        self.set_archived(id, true)?;
        for descendant in self.descendants(id) {
            self.set_archived(&descendant, true)?;
        }
        Ok(())
    }

    /// Restore a block and every descendant.
    pub fn restore_subtree(&mut self, id: &BlockId) -> Result<(), TreeError> {
        self.set_archived(id, false)?;
        for descendant in self.descendants(id) {
            self.set_archived(&descendant, false)?;
        }
        Ok(())
    }

    fn set_archived(&mut self, id: &BlockId, archived: bool) -> Result<(), TreeError> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(id.clone()))?;
        if block.archived == archived {
            return Ok(());
        }
        block.archived = archived;

        let block_id = id.clone();
        if archived {
            tracing::debug!(block = %id, "tree.archive");
            self.emit(TreeChange::Archived { block_id });
        } else {
            tracing::debug!(block = %id, "tree.restore");
            self.emit(TreeChange::Restored { block_id });
        }
        Ok(())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a change listener. Listeners run after each commit, in
    /// registration order, and see the tree as committed.
    pub fn subscribe(
        &mut self,
        listener: impl Fn(&TreeChange, &ComponentTree) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Remove a change listener. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn emit(&self, change: TreeChange) {
        for (_, listener) in &self.listeners {
            listener(&change, self);
        }
    }

    // =========================================================================
    // Invariant Check
    // =========================================================================

    /// Verify the structural invariants, returning the first violation.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for block in self.blocks.values() {
            if let Some(parent) = &block.parent_id {
                if !self.blocks.contains_key(parent) {
                    return Err(InvariantViolation::MissingParent {
                        block: block.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            let mut seen = HashSet::new();
            let mut current = block.parent_id.as_ref();
            while let Some(id) = current {
                if id == &block.id || !seen.insert(id) {
                    return Err(InvariantViolation::Cycle(block.id.clone()));
                }
                current = self.parent_of(id);
            }
        }

        let mut by_parent: HashMap<Option<BlockId>, Vec<usize>> = HashMap::new();
        for block in self.blocks.values() {
            by_parent
                .entry(block.parent_id.clone())
                .or_default()
                .push(block.order_index);
        }
        for (parent, mut indices) in by_parent {
            indices.sort_unstable();
            let dense = indices.iter().enumerate().all(|(i, index)| i == *index);
            let listed = self.children.get(&parent).map_or(0, Vec::len);
            if !dense || listed != indices.len() {
                return Err(InvariantViolation::SparseOrder { parent, indices });
            }
        }
        Ok(())
    }
}
