//! Lazily materialized view over an archive tree.
//!
//! `TreeNode` is a display row wrapping at most one [`TreeEntry`]. Nodes are
//! only created for directories the user actually expands, so an archive with
//! tens of thousands of files stays cheap to open. [`ArchiveTreeModel`]
//! implements the widget-level policies on top of the node tree: tristate
//! check propagation with a single semantic event per user toggle, lazy
//! population, and drag-and-drop moves with all-or-nothing validation.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use mo2api::filetree::{normalize_name, EntryRef};
use tracing::debug;

/// Shared handle to a display node.
pub type NodeRef = Rc<TreeNode>;

/// Tristate check state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Unchecked,
    /// Some, but not all, descendants are checked.
    Partial,
    Checked,
}

/// Why a drop was rejected. No part of the batch has been applied when one
/// of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    /// A directory was dropped into its own subtree.
    #[error("cannot move \"{0}\" into its own subtree")]
    IntoOwnSubtree(String),
    /// The target already holds an entry with the same name but the other
    /// kind, so the merge rules cannot apply.
    #[error("\"{0}\" already exists with a different type")]
    KindConflict(String),
    /// Root rows stand for the archive itself and cannot be moved.
    #[error("the top level cannot be moved")]
    TopLevel,
}

/// Receiver for the deduplicated semantic events of the tree.
///
/// The model applies the visual part of a change itself and raises exactly
/// one event per user action; the handler is responsible for keeping the
/// authoritative entry tree in sync.
pub trait TreeEventHandler {
    /// `node`'s check state changed through a user toggle. Cascaded and
    /// recomputed state changes on other nodes do not raise this.
    fn check_state_changed(&self, node: &NodeRef);

    /// `source` has been detached from its display parent as part of a drop
    /// onto `target`. The handler moves the wrapped entry; the model
    /// rebuilds the target subtree afterwards.
    fn item_moved(&self, source: &NodeRef, target: &NodeRef);
}

/// A display row. Holds strong references to its children and to the entry
/// it wraps, so a detached entry subtree stays alive for as long as its row
/// is visible.
pub struct TreeNode {
    label: String,
    entry: RefCell<Option<EntryRef>>,
    checkable: bool,
    check_state: Cell<CheckState>,
    populated: Cell<bool>,
    expanded: Cell<bool>,
    parent: RefCell<Weak<TreeNode>>,
    children: RefCell<Vec<NodeRef>>,
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("label", &self.label)
            .field("check_state", &self.check_state.get())
            .field("populated", &self.populated.get())
            .finish()
    }
}

impl TreeNode {
    fn new(
        label: String,
        entry: Option<EntryRef>,
        checkable: bool,
        populated: bool,
    ) -> NodeRef {
        Rc::new(TreeNode {
            label,
            entry: RefCell::new(entry),
            checkable,
            check_state: Cell::new(CheckState::Checked),
            populated: Cell::new(populated),
            expanded: Cell::new(false),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    /// Node wrapping an archive entry. User-checkable, starts checked and
    /// unpopulated.
    pub fn for_entry(entry: &EntryRef) -> NodeRef {
        Self::new(entry.name().to_string(), Some(entry.clone()), true, false)
    }

    /// Permanent wrapper around the archive root. Never shown directly and
    /// not user-checkable, but populated like any directory node.
    pub fn tree_root(entry: &EntryRef) -> NodeRef {
        Self::new(entry.name().to_string(), Some(entry.clone()), false, false)
    }

    /// The visible root standing for the current data root. Carries a fixed
    /// label and receives its entry when a data root is assigned; its
    /// children are managed by the re-homing logic, never by population.
    pub fn view_root(label: &str) -> NodeRef {
        let node = Self::new(label.to_string(), None, false, true);
        node.expanded.set(true);
        node
    }

    /// The wrapped entry, if any.
    pub fn entry(&self) -> Option<EntryRef> {
        self.entry.borrow().clone()
    }

    /// Swap the wrapped entry. Used when the view root is pointed at a new
    /// data root.
    pub fn set_entry(&self, entry: Option<EntryRef>) {
        *self.entry.borrow_mut() = entry;
    }

    /// Display label. For entry nodes this is the entry name at wrap time.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn check_state(&self) -> CheckState {
        self.check_state.get()
    }

    pub fn is_checkable(&self) -> bool {
        self.checkable
    }

    pub fn is_populated(&self) -> bool {
        self.populated.get()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.get()
    }

    /// Whether the node stands for a directory. Nodes without an entry are
    /// roots and count as directories.
    pub fn is_dir(&self) -> bool {
        self.entry().map(|entry| entry.is_dir()).unwrap_or(true)
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.borrow().upgrade()
    }

    /// Snapshot of the children, in display order.
    pub fn children(&self) -> Vec<NodeRef> {
        self.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// Position of `child` among the children, if present.
    pub fn index_of(&self, child: &NodeRef) -> Option<usize> {
        self.children
            .borrow()
            .iter()
            .position(|candidate| Rc::ptr_eq(candidate, child))
    }

    /// Find a direct child by label, case-insensitively.
    pub fn find_child(&self, label: &str) -> Option<NodeRef> {
        let wanted = normalize_name(label);
        self.children
            .borrow()
            .iter()
            .find(|candidate| normalize_name(candidate.label()) == wanted)
            .cloned()
    }

    /// Append `child`, re-parenting it to `self`.
    pub fn add_child(self: &Rc<Self>, child: &NodeRef) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child.clone());
    }

    /// Remove `child` from the children. Returns whether it was present.
    pub fn remove_child(&self, child: &NodeRef) -> bool {
        let mut children = self.children.borrow_mut();
        let Some(index) = children
            .iter()
            .position(|candidate| Rc::ptr_eq(candidate, child))
        else {
            return false;
        };
        children.remove(index);
        *child.parent.borrow_mut() = Weak::new();
        true
    }

    /// Detach and return all children, oldest first.
    pub fn take_children(&self) -> Vec<NodeRef> {
        let children: Vec<NodeRef> = self.children.borrow_mut().drain(..).collect();
        for child in &children {
            *child.parent.borrow_mut() = Weak::new();
        }
        children
    }

    /// Append previously detached nodes, re-parenting each.
    pub fn add_children(self: &Rc<Self>, children: Vec<NodeRef>) {
        for child in children {
            self.add_child(&child);
        }
    }
}

/// Widget-level policy over a [`TreeNode`] tree.
///
/// Owns no nodes itself. The single-slot `emitter` reproduces the event
/// deduplication of a toolkit tristate widget: while an outer check-state
/// change is being applied, all nested state writes stay silent, and exactly
/// one [`TreeEventHandler::check_state_changed`] fires for the node the user
/// actually toggled.
pub struct ArchiveTreeModel {
    emitter: RefCell<Option<NodeRef>>,
    handler: RefCell<Option<Weak<dyn TreeEventHandler>>>,
}

impl Default for ArchiveTreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveTreeModel {
    pub fn new() -> Self {
        ArchiveTreeModel {
            emitter: RefCell::new(None),
            handler: RefCell::new(None),
        }
    }

    /// Install the semantic event receiver. Held weakly so the handler can
    /// own the model.
    pub fn set_handler(&self, handler: Weak<dyn TreeEventHandler>) {
        *self.handler.borrow_mut() = Some(handler);
    }

    fn emit_check_state_changed(&self, node: &NodeRef) {
        let handler = self
            .handler
            .borrow()
            .as_ref()
            .and_then(|handler| handler.upgrade());
        if let Some(handler) = handler {
            handler.check_state_changed(node);
        }
    }

    fn emit_item_moved(&self, source: &NodeRef, target: &NodeRef) {
        let handler = self
            .handler
            .borrow()
            .as_ref()
            .and_then(|handler| handler.upgrade());
        if let Some(handler) = handler {
            handler.item_moved(source, target);
        }
    }

    /// Materialize `node`'s children from its entry.
    ///
    /// Runs at most once per node unless `force` is set. Children are
    /// created and given their inherited check state before they become
    /// visible, so no per-child events fire. When an unchecked directory is
    /// populated, ownership of its entries has just passed to the new child
    /// nodes and the authoritative collection is emptied to match.
    pub fn populate(&self, node: &NodeRef, force: bool) {
        if node.is_populated() && !force {
            return;
        }
        let Some(entry) = node.entry() else {
            return;
        };
        if entry.is_file() {
            return;
        }

        if force {
            node.take_children();
        }

        let inherited = match (node.is_checkable(), node.check_state()) {
            (true, CheckState::Unchecked) => CheckState::Unchecked,
            _ => CheckState::Checked,
        };
        for child_entry in entry.children() {
            let child = TreeNode::for_entry(&child_entry);
            child.check_state.set(inherited);
            node.add_child(&child);
        }

        if node.is_checkable() && node.check_state() == CheckState::Unchecked {
            entry.clear();
        }

        node.populated.set(true);
    }

    /// Expand `node`, materializing its children first.
    pub fn expand(&self, node: &NodeRef) {
        self.populate(node, false);
        node.expanded.set(true);
    }

    pub fn collapse(&self, node: &NodeRef) {
        node.expanded.set(false);
    }

    /// Apply a check-state change the way a tristate widget would: cascade
    /// down to the materialized descendants, recompute the ancestor states,
    /// and raise one semantic event for the node that initiated the change.
    pub fn set_check_state(&self, node: &NodeRef, state: CheckState) {
        if !node.is_checkable() {
            return;
        }

        let is_outer = {
            let mut emitter = self.emitter.borrow_mut();
            if emitter.is_none() {
                *emitter = Some(node.clone());
                true
            } else {
                false
            }
        };

        node.check_state.set(state);
        if state != CheckState::Partial {
            for child in node.children() {
                Self::cascade_down(&child, state);
            }
        }
        Self::recompute_ancestors(node);

        if is_outer {
            *self.emitter.borrow_mut() = None;
            self.emit_check_state_changed(node);
        }
    }

    fn cascade_down(node: &NodeRef, state: CheckState) {
        node.check_state.set(state);
        for child in node.children() {
            Self::cascade_down(&child, state);
        }
    }

    /// Walk upwards, replacing each checkable ancestor's state with the
    /// aggregate of its children. Stops as soon as an ancestor is already
    /// consistent, since nothing above it can have changed either.
    fn recompute_ancestors(node: &NodeRef) {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            if !ancestor.is_checkable() {
                break;
            }
            let aggregate = Self::aggregate_state(&ancestor);
            if ancestor.check_state() == aggregate {
                break;
            }
            ancestor.check_state.set(aggregate);
            current = ancestor.parent();
        }
    }

    fn aggregate_state(node: &NodeRef) -> CheckState {
        let children = node.children.borrow();
        let Some(first) = children.first() else {
            return node.check_state();
        };
        let state = first.check_state();
        if state != CheckState::Partial
            && children.iter().all(|child| child.check_state() == state)
        {
            state
        } else {
            CheckState::Partial
        }
    }

    /// Whether `ancestor` lies on the parent chain of `node`.
    pub fn is_ancestor(ancestor: &NodeRef, node: &NodeRef) -> bool {
        let mut current = node.parent();
        while let Some(item) = current {
            if Rc::ptr_eq(&item, ancestor) {
                return true;
            }
            current = item.parent();
        }
        false
    }

    /// Drop `sources` onto `hit`.
    ///
    /// Dropping onto a file redirects to its parent directory. The whole
    /// batch is validated before anything moves; a rejected item leaves the
    /// tree untouched. Accepted items are detached from their display
    /// parents one by one, each raising [`TreeEventHandler::item_moved`] so
    /// the handler can re-home the wrapped entry, and the target subtree is
    /// rebuilt once at the end.
    pub fn move_items(&self, sources: &[NodeRef], hit: &NodeRef) -> Result<(), MoveError> {
        let (target, insert_index) = match self.resolve_target(hit) {
            Some(resolved) => resolved,
            None => return Err(MoveError::TopLevel),
        };

        self.populate(&target, false);

        let mut accepted: Vec<NodeRef> = Vec::new();
        for source in sources {
            if source.parent().is_none() {
                return Err(MoveError::TopLevel);
            }
            if Self::is_ancestor(source, &target) {
                return Err(MoveError::IntoOwnSubtree(source.label().to_string()));
            }
            // Dropping an item onto itself or onto the directory it is
            // already in is a no-op, not an error.
            let parent = source.parent();
            if Rc::ptr_eq(source, &target)
                || parent.map(|p| Rc::ptr_eq(&p, &target)).unwrap_or(false)
            {
                continue;
            }
            if let Some(conflict) = Self::kind_conflict(&target, source) {
                return Err(MoveError::KindConflict(conflict));
            }
            accepted.push(source.clone());
        }

        let mut index = insert_index;
        for source in &accepted {
            if let Some(parent) = source.parent() {
                parent.remove_child(source);
            }
            debug!(
                "moving {:?} under {:?} at index {:?}",
                source.label(),
                target.label(),
                index
            );
            if let Some(i) = index.as_mut() {
                *i += 1;
            }
            self.emit_item_moved(source, &target);
        }

        self.refresh(&target);
        Ok(())
    }

    fn resolve_target(&self, hit: &NodeRef) -> Option<(NodeRef, Option<usize>)> {
        let is_file = hit.entry().map(|entry| entry.is_file()).unwrap_or(false);
        if is_file {
            // Dropping onto a file means "next to it": redirect to the
            // parent and remember where the file sits.
            let parent = hit.parent()?;
            let index = parent.index_of(hit);
            Some((parent, index))
        } else {
            Some((hit.clone(), None))
        }
    }

    /// A same-named display child of the other kind blocks the move, since
    /// neither merge nor overwrite is defined across kinds. Unchecked
    /// children count; their entries come back when re-checked.
    fn kind_conflict(target: &NodeRef, source: &NodeRef) -> Option<String> {
        let source_entry = source.entry()?;
        let wanted = normalize_name(source_entry.name());
        for child in target.children() {
            let Some(child_entry) = child.entry() else {
                continue;
            };
            if normalize_name(child_entry.name()) == wanted
                && child_entry.is_dir() != source_entry.is_dir()
            {
                return Some(child_entry.name().to_string());
            }
        }
        None
    }

    /// Rebuild `node`'s children from the authoritative entry order.
    ///
    /// Nodes still wrapping an attached entry are reused with their whole
    /// subtree; new entries get fresh checked nodes. Leftover nodes that are
    /// unchecked stay, because they are the sole owners of their detached
    /// entries. Checked leftovers wrapped an entry that a merge absorbed and
    /// are dropped. Expansion carries over by name.
    pub fn refresh(&self, node: &NodeRef) {
        if !node.is_populated() {
            return;
        }
        let Some(entry) = node.entry() else {
            return;
        };

        let mut old_children = node.take_children();
        let expanded_names: HashSet<String> = old_children
            .iter()
            .filter(|child| child.is_expanded())
            .map(|child| normalize_name(child.label()))
            .collect();

        let mut rebuilt: Vec<NodeRef> = Vec::new();
        for child_entry in entry.children() {
            let reused = old_children.iter().position(|candidate| {
                candidate
                    .entry()
                    .map(|e| Rc::ptr_eq(&e, &child_entry))
                    .unwrap_or(false)
            });
            let child = match reused {
                Some(index) => old_children.remove(index),
                None => {
                    let fresh = TreeNode::for_entry(&child_entry);
                    if child_entry.is_dir()
                        && expanded_names.contains(&normalize_name(child_entry.name()))
                    {
                        self.populate(&fresh, false);
                        fresh.expanded.set(true);
                    }
                    fresh
                }
            };
            rebuilt.push(child);
        }
        for leftover in old_children {
            if leftover.check_state() == CheckState::Unchecked {
                rebuilt.push(leftover);
            }
        }
        node.add_children(rebuilt);

        if node.is_checkable() {
            let aggregate = Self::aggregate_state(node);
            if node.check_state() != aggregate {
                node.check_state.set(aggregate);
            }
        }
        Self::recompute_ancestors(node);
    }
}

/// A flattened display row.
#[derive(Debug, Clone)]
pub struct VisibleRow {
    pub node: NodeRef,
    pub depth: usize,
}

/// Flatten the materialized tree below `root` into rows, descending only
/// into expanded nodes. The root itself is not included.
pub fn visible_rows(root: &NodeRef) -> Vec<VisibleRow> {
    let mut rows = Vec::new();
    flatten(root, 0, &mut rows);
    rows
}

fn flatten(node: &NodeRef, depth: usize, rows: &mut Vec<VisibleRow>) {
    for child in node.children() {
        rows.push(VisibleRow {
            node: child.clone(),
            depth,
        });
        if child.is_expanded() {
            flatten(&child, depth + 1, rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mo2api::filetree::{InsertPolicy, TreeEntry};

    /// Test handler that records events and re-homes entries on moves the
    /// way the dialog controller does, so refresh has something to rebuild
    /// from.
    struct RecordingHandler {
        checks: RefCell<Vec<String>>,
        moves: RefCell<Vec<(String, String)>>,
    }

    impl RecordingHandler {
        fn new() -> Rc<Self> {
            Rc::new(RecordingHandler {
                checks: RefCell::new(Vec::new()),
                moves: RefCell::new(Vec::new()),
            })
        }
    }

    impl TreeEventHandler for RecordingHandler {
        fn check_state_changed(&self, node: &NodeRef) {
            self.checks.borrow_mut().push(node.label().to_string());
        }

        fn item_moved(&self, source: &NodeRef, target: &NodeRef) {
            self.moves
                .borrow_mut()
                .push((source.label().to_string(), target.label().to_string()));
            if let (Some(source_entry), Some(target_entry)) = (source.entry(), target.entry()) {
                source_entry.detach();
                target_entry
                    .insert(source_entry, InsertPolicy::Merge)
                    .unwrap();
            }
        }
    }

    fn sample_entries() -> EntryRef {
        let root = TreeEntry::new_directory("");
        let textures = root.add_directory("textures").unwrap();
        textures.add_file("armor.dds").unwrap();
        textures.add_file("body.dds").unwrap();
        let weapons = textures.add_directory("weapons").unwrap();
        weapons.add_file("sword.dds").unwrap();
        root.add_file("mod.esp").unwrap();
        root
    }

    fn model_over(root: &EntryRef) -> (ArchiveTreeModel, NodeRef, Rc<RecordingHandler>) {
        let model = ArchiveTreeModel::new();
        let handler = RecordingHandler::new();
        let weak: Weak<RecordingHandler> = Rc::downgrade(&handler);
        model.set_handler(weak);
        let node = TreeNode::for_entry(root);
        (model, node, handler)
    }

    #[test]
    fn test_populate_runs_once() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);

        model.populate(&node, false);
        assert_eq!(node.child_count(), 2);
        model.populate(&node, false);
        assert_eq!(node.child_count(), 2);
    }

    #[test]
    fn test_populate_is_noop_for_files() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);

        let file = node.find_child("mod.esp").unwrap();
        model.populate(&file, false);
        assert_eq!(file.child_count(), 0);
        assert!(!file.is_populated());
    }

    #[test]
    fn test_populate_keeps_authoritative_order() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);

        let labels: Vec<String> = node
            .children()
            .iter()
            .map(|child| child.label().to_string())
            .collect();
        assert_eq!(labels, vec!["textures", "mod.esp"]);
    }

    #[test]
    fn test_populate_of_unchecked_directory_hands_off_entries() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);

        let textures = node.find_child("textures").unwrap();
        let textures_entry = textures.entry().unwrap();
        model.set_check_state(&textures, CheckState::Unchecked);
        model.populate(&textures, false);

        // Children inherited the unchecked state and now own the entries;
        // the authoritative collection is empty.
        assert!(textures_entry.is_empty());
        assert_eq!(textures.child_count(), 3);
        for child in textures.children() {
            assert_eq!(child.check_state(), CheckState::Unchecked);
            assert!(child.entry().is_some());
        }
    }

    #[test]
    fn test_toggle_raises_one_event_for_originating_node() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);

        model.set_check_state(&textures, CheckState::Unchecked);

        assert_eq!(handler.checks.borrow().as_slice(), ["textures"]);
        for child in textures.children() {
            assert_eq!(child.check_state(), CheckState::Unchecked);
        }
    }

    #[test]
    fn test_unchecking_child_makes_ancestors_partial() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);

        let armor = textures.find_child("armor.dds").unwrap();
        model.set_check_state(&armor, CheckState::Unchecked);

        assert_eq!(textures.check_state(), CheckState::Partial);
        assert_eq!(node.check_state(), CheckState::Partial);
        assert_eq!(handler.checks.borrow().as_slice(), ["armor.dds"]);
    }

    #[test]
    fn test_unchecking_every_child_unchecks_parent() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);

        for child in textures.children() {
            model.set_check_state(&child, CheckState::Unchecked);
        }
        assert_eq!(textures.check_state(), CheckState::Unchecked);
    }

    #[test]
    fn test_rechecking_partial_directory_cascades_down() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let armor = textures.find_child("armor.dds").unwrap();
        model.set_check_state(&armor, CheckState::Unchecked);

        model.set_check_state(&textures, CheckState::Checked);

        assert_eq!(armor.check_state(), CheckState::Checked);
        assert_eq!(node.check_state(), CheckState::Checked);
    }

    #[test]
    fn test_is_ancestor() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let weapons = textures.find_child("weapons").unwrap();

        assert!(ArchiveTreeModel::is_ancestor(&node, &weapons));
        assert!(ArchiveTreeModel::is_ancestor(&textures, &weapons));
        assert!(!ArchiveTreeModel::is_ancestor(&weapons, &textures));
        assert!(!ArchiveTreeModel::is_ancestor(&weapons, &weapons));
    }

    #[test]
    fn test_move_into_own_subtree_is_rejected() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let weapons = textures.find_child("weapons").unwrap();

        let result = model.move_items(&[textures.clone()], &weapons);
        assert!(matches!(result, Err(MoveError::IntoOwnSubtree(_))));
        assert!(handler.moves.borrow().is_empty());
        assert!(node.find_child("textures").is_some());
    }

    #[test]
    fn test_move_batch_is_all_or_nothing() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let weapons = textures.find_child("weapons").unwrap();
        let armor = textures.find_child("armor.dds").unwrap();

        // armor.dds alone could move, but the batch also drags textures
        // into its own subtree, so nothing may happen.
        let result = model.move_items(&[armor.clone(), textures.clone()], &weapons);
        assert!(matches!(result, Err(MoveError::IntoOwnSubtree(_))));
        assert!(handler.moves.borrow().is_empty());
        assert!(textures.find_child("armor.dds").is_some());
        assert!(root.resolve("textures/armor.dds").is_some());
    }

    #[test]
    fn test_move_onto_file_redirects_to_its_parent() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let armor = textures.find_child("armor.dds").unwrap();
        let esp = node.find_child("mod.esp").unwrap();

        // Dropping armor.dds onto mod.esp lands it next to the file, in
        // the archive root.
        model.move_items(&[armor], &esp).unwrap();

        let moves = handler.moves.borrow();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, "armor.dds");
        drop(moves);
        assert!(root.resolve("armor.dds").is_some());
        assert!(root.resolve("textures/armor.dds").is_none());
        assert!(node.find_child("armor.dds").is_some());
    }

    #[test]
    fn test_move_onto_current_parent_is_skipped() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let esp = node.find_child("mod.esp").unwrap();

        model.move_items(&[esp.clone()], &node).unwrap();
        assert!(handler.moves.borrow().is_empty());
        assert!(root.resolve("mod.esp").is_some());
    }

    #[test]
    fn test_move_onto_self_is_noop() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let weapons = textures.find_child("weapons").unwrap();

        model.move_items(&[weapons.clone()], &weapons).unwrap();
        assert!(handler.moves.borrow().is_empty());
        assert!(textures.find_child("weapons").is_some());
        assert!(root.resolve("textures/weapons/sword.dds").is_some());
    }

    #[test]
    fn test_move_batch_skips_the_target_itself() {
        let root = sample_entries();
        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let weapons = textures.find_child("weapons").unwrap();
        let armor = textures.find_child("armor.dds").unwrap();

        // weapons sits in its own selection; it stays put while the rest
        // of the batch moves into it.
        model
            .move_items(&[weapons.clone(), armor.clone()], &weapons)
            .unwrap();

        let moves = handler.moves.borrow();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, "armor.dds");
        assert_eq!(moves[0].1, "weapons");
        drop(moves);
        assert!(root.resolve("textures/weapons/armor.dds").is_some());
        assert!(root.resolve("textures/armor.dds").is_none());
        assert!(textures.find_child("weapons").is_some());
    }

    #[test]
    fn test_move_rejects_kind_conflict() {
        let root = TreeEntry::new_directory("");
        let docs = root.add_directory("docs").unwrap();
        docs.add_file("readme").unwrap();
        let extra = root.add_directory("extra").unwrap();
        extra.add_directory("readme").unwrap();

        let (model, node, handler) = model_over(&root);
        model.populate(&node, false);
        let docs_node = node.find_child("docs").unwrap();
        let extra_node = node.find_child("extra").unwrap();
        model.populate(&extra_node, false);
        let readme_dir = extra_node.find_child("readme").unwrap();

        let result = model.move_items(&[readme_dir], &docs_node);
        assert!(matches!(result, Err(MoveError::KindConflict(name)) if name == "readme"));
        assert!(handler.moves.borrow().is_empty());
        assert!(root.resolve("extra/readme").is_some());
    }

    #[test]
    fn test_refresh_reuses_nodes_for_surviving_entries() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let weapons = textures.find_child("weapons").unwrap();
        model.expand(&weapons);

        root.add_file("new.esp").unwrap();
        model.refresh(&node);

        assert!(node.find_child("new.esp").is_some());
        let textures_again = node.find_child("textures").unwrap();
        assert!(Rc::ptr_eq(&textures, &textures_again));
        // The reused subtree kept its materialized children.
        assert!(textures_again.find_child("weapons").is_some());
    }

    #[test]
    fn test_refresh_keeps_unchecked_nodes_alive() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let armor = textures.find_child("armor.dds").unwrap();
        let armor_entry = armor.entry().unwrap();

        model.set_check_state(&armor, CheckState::Unchecked);
        armor_entry.detach();
        model.refresh(&textures);

        // The entry is gone from the authoritative tree but the unchecked
        // node still holds it.
        assert!(root.resolve("textures/armor.dds").is_none());
        let kept = textures.find_child("armor.dds").unwrap();
        assert!(Rc::ptr_eq(&kept, &armor));
        assert!(kept.entry().is_some());
        assert_eq!(textures.check_state(), CheckState::Partial);
    }

    #[test]
    fn test_refresh_drops_checked_nodes_for_absorbed_entries() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.populate(&textures, false);
        let armor = textures.find_child("armor.dds").unwrap();

        // Simulates a merge replacing armor.dds with an incoming file.
        let textures_entry = textures.entry().unwrap();
        textures_entry
            .insert(TreeEntry::new_file("armor.dds"), InsertPolicy::Replace)
            .unwrap();
        model.refresh(&textures);

        let rebuilt = textures.find_child("armor.dds").unwrap();
        assert!(!Rc::ptr_eq(&rebuilt, &armor));
        assert_eq!(rebuilt.check_state(), CheckState::Checked);
        assert_eq!(
            textures
                .children()
                .iter()
                .filter(|child| child.label() == "armor.dds")
                .count(),
            1
        );
    }

    #[test]
    fn test_refresh_restores_expansion_by_name() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();
        model.expand(&textures);

        // Replace the directory entry wholesale; the fresh node comes back
        // expanded and populated.
        root.insert(TreeEntry::new_directory("textures"), InsertPolicy::Replace)
            .unwrap();
        let replacement = root.find("textures").unwrap();
        replacement.add_file("fresh.dds").unwrap();
        model.refresh(&node);

        let rebuilt = node.find_child("textures").unwrap();
        assert!(!Rc::ptr_eq(&rebuilt, &textures));
        assert!(rebuilt.is_expanded());
        assert!(rebuilt.find_child("fresh.dds").is_some());
    }

    #[test]
    fn test_visible_rows_descend_only_into_expanded() {
        let root = sample_entries();
        let (model, node, _handler) = model_over(&root);
        model.populate(&node, false);
        let textures = node.find_child("textures").unwrap();

        let collapsed: Vec<String> = visible_rows(&node)
            .iter()
            .map(|row| row.node.label().to_string())
            .collect();
        assert_eq!(collapsed, vec!["textures", "mod.esp"]);

        model.expand(&textures);
        let rows = visible_rows(&node);
        let labels: Vec<(String, usize)> = rows
            .iter()
            .map(|row| (row.node.label().to_string(), row.depth))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("textures".to_string(), 0),
                ("weapons".to_string(), 1),
                ("armor.dds".to_string(), 1),
                ("body.dds".to_string(), 1),
                ("mod.esp".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_roots_are_not_checkable() {
        let root = sample_entries();
        let tree_root = TreeNode::tree_root(&root);
        let view_root = TreeNode::view_root("<data>");
        let model = ArchiveTreeModel::new();

        model.set_check_state(&tree_root, CheckState::Unchecked);
        model.set_check_state(&view_root, CheckState::Unchecked);
        assert_eq!(tree_root.check_state(), CheckState::Checked);
        assert_eq!(view_root.check_state(), CheckState::Checked);
        assert!(view_root.is_populated());
        assert!(view_root.is_expanded());
    }
}
