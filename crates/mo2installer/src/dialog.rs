//! Manual installation dialog state.
//!
//! [`InstallDialog`] pairs an [`ArchiveTreeModel`] with the archive's entry
//! tree and keeps the two in lockstep: checking a row attaches the wrapped
//! entry to the tree that will be installed, unchecking detaches it and
//! prunes directories that end up empty, and drag-and-drop moves re-home
//! entries. The dialog also validates the resulting layout against the
//! current game's content checker and lets the user pick a different
//! directory inside the archive as the data root.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use mo2api::checker::{CheckReturn, ModDataChecker};
use mo2api::filetree::{normalize_name, EntryRef, InsertPolicy};
use mo2api::guessed::GuessedValue;
use tracing::{debug, warn};

use crate::tree_model::{ArchiveTreeModel, CheckState, NodeRef, TreeEventHandler, TreeNode};

/// Result of the layout check over the current data root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStatus {
    /// No checker is available for the current game.
    Unknown,
    Valid,
    Invalid,
}

/// How prominently a status should be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSeverity {
    Warning,
    Good,
    Error,
}

impl ContentStatus {
    /// One-line status shown under the tree.
    pub fn message(&self, data_dir_name: &str) -> String {
        match self {
            ContentStatus::Unknown => {
                format!("Cannot check the content of <{data_dir_name}>.")
            }
            ContentStatus::Valid => {
                format!("The content of <{data_dir_name}> looks valid.")
            }
            ContentStatus::Invalid => {
                format!("The content of <{data_dir_name}> does not look valid.")
            }
        }
    }

    pub fn tooltip(&self, data_dir_name: &str) -> String {
        match self {
            ContentStatus::Unknown => format!(
                "The plugin for the current game does not provide a way to check the content of <{data_dir_name}>."
            ),
            ContentStatus::Valid => {
                format!("The content of <{data_dir_name}> seems valid for the current game.")
            }
            ContentStatus::Invalid => {
                format!("The content of <{data_dir_name}> is probably not valid for the current game.")
            }
        }
    }

    pub fn severity(&self) -> StatusSeverity {
        match self {
            ContentStatus::Unknown => StatusSeverity::Warning,
            ContentStatus::Valid => StatusSeverity::Good,
            ContentStatus::Invalid => StatusSeverity::Error,
        }
    }

    /// Whether accepting should ask for confirmation first. An unknown
    /// status is treated as a problem, not as a pass.
    pub fn is_problem(&self) -> bool {
        !matches!(self, ContentStatus::Valid)
    }
}

/// User-reportable failures of the dialog's edit operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialogError {
    #[error("Cannot create directory under a file.")]
    CreateUnderFile,
    #[error("A directory name is required.")]
    EmptyName,
    #[error("A directory or file with that name already exists.")]
    NameExists,
    #[error("Only a directory can become the data root.")]
    InvalidDataRoot,
}

/// Entries of the tree's context menu, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    SetAsDataRoot,
    UnsetDataRoot,
    CreateDirectory,
    OpenFile,
}

/// What happened when the user tried to accept the dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// The layout is not known to be valid; the host shows the warning and
    /// either keeps the dialog open or accepts anyway.
    NeedsConfirmation(String),
}

const LAYOUT_WARNING: &str = "This mod was probably NOT set up correctly, most likely it will \
                              NOT work. You should first correct the directory layout using the \
                              content-tree.";

type OpenHandler = Box<dyn Fn(&EntryRef) -> anyhow::Result<()>>;

struct DialogCore {
    model: ArchiveTreeModel,
    /// The archive tree as handed in. Stays the output root unless the user
    /// designates a subdirectory.
    archive: EntryRef,
    /// Permanent wrapper around `archive`; parks the top-level rows while a
    /// subdirectory acts as data root.
    tree_root: NodeRef,
    /// The row the user sees as `<data dir>`. Wraps whichever entry is the
    /// current data root.
    view_root: NodeRef,
    data_root: RefCell<NodeRef>,
    checker: Option<Rc<dyn ModDataChecker>>,
    data_dir_name: String,
    name_variants: Vec<String>,
    current_name: RefCell<String>,
    status: Cell<ContentStatus>,
    open_handler: RefCell<Option<OpenHandler>>,
}

/// Headless state of the manual installation dialog.
///
/// The hosting UI renders [`crate::tree_model::visible_rows`] of the view
/// root, forwards expand and check interactions to the model, and calls the
/// edit operations here. All tree edits performed through the dialog keep
/// the checked rows and the authoritative tree consistent.
pub struct InstallDialog {
    core: Rc<DialogCore>,
}

impl InstallDialog {
    /// Open the dialog over `tree`. Edits mutate `tree` in place; the entry
    /// returned by [`Self::modified_tree`] reflects the chosen data root.
    /// `data_dir_name` is the game's data directory, shown lowercased in
    /// every status text.
    pub fn new(
        tree: EntryRef,
        mod_name: &GuessedValue<String>,
        checker: Option<Rc<dyn ModDataChecker>>,
        data_dir_name: &str,
    ) -> Self {
        let data_dir_name = data_dir_name.to_lowercase();
        let tree_root = TreeNode::tree_root(&tree);
        let view_root = TreeNode::view_root(&format!("<{data_dir_name}>"));
        let core = Rc::new(DialogCore {
            model: ArchiveTreeModel::new(),
            archive: tree.clone(),
            data_root: RefCell::new(tree_root.clone()),
            tree_root,
            view_root,
            checker,
            data_dir_name,
            name_variants: mod_name.variants().to_vec(),
            current_name: RefCell::new(mod_name.value().clone()),
            status: Cell::new(ContentStatus::Unknown),
            open_handler: RefCell::new(None),
        });
        let handler: Weak<DialogCore> = Rc::downgrade(&core);
        core.model.set_handler(handler);

        let initial = core.tree_root.clone();
        core.switch_root(&initial);
        core.update_problems();
        InstallDialog { core }
    }

    /// The widget-level model, for expand, toggle and drop interactions.
    pub fn model(&self) -> &ArchiveTreeModel {
        &self.core.model
    }

    /// The visible root row.
    pub fn view_root(&self) -> NodeRef {
        self.core.view_root.clone()
    }

    pub fn data_dir_name(&self) -> &str {
        &self.core.data_dir_name
    }

    pub fn status(&self) -> ContentStatus {
        self.core.status.get()
    }

    pub fn status_message(&self) -> String {
        self.status().message(&self.core.data_dir_name)
    }

    pub fn status_tooltip(&self) -> String {
        self.status().tooltip(&self.core.data_dir_name)
    }

    /// The current mod name, as typed or guessed.
    pub fn mod_name(&self) -> String {
        self.core.current_name.borrow().clone()
    }

    pub fn set_mod_name(&self, name: &str) {
        *self.core.current_name.borrow_mut() = name.to_string();
    }

    /// Alternative names offered in the name box.
    pub fn name_variants(&self) -> &[String] {
        &self.core.name_variants
    }

    /// Create a directory named `name` under `parent` and check it, which
    /// also re-attaches any pruned ancestors. The name is trimmed first.
    /// Returns the new row so the host can scroll to it.
    pub fn create_directory(&self, parent: &NodeRef, name: &str) -> Result<NodeRef, DialogError> {
        self.core.create_directory(parent, name)
    }

    /// Make `node` the data root: the view re-scopes to its subtree and the
    /// accepted output becomes its entry.
    pub fn set_data_root(&self, node: &NodeRef) -> Result<(), DialogError> {
        if Rc::ptr_eq(node, &self.core.view_root) || !node.is_dir() {
            return Err(DialogError::InvalidDataRoot);
        }
        self.core.set_data_root(node);
        Ok(())
    }

    /// Point the view back at the whole archive.
    pub fn unset_data_root(&self) {
        let root = self.core.tree_root.clone();
        self.core.set_data_root(&root);
    }

    /// Context-menu entries applicable to `node`.
    pub fn context_actions(&self, node: &NodeRef) -> Vec<ContextAction> {
        let mut actions = Vec::new();
        let is_dir = node.is_dir();
        if is_dir && !Rc::ptr_eq(node, &self.core.view_root) {
            actions.push(ContextAction::SetAsDataRoot);
        }
        let root_changed = match (self.core.view_root.entry(), self.core.tree_root.entry()) {
            (Some(current), Some(original)) => !Rc::ptr_eq(&current, &original),
            _ => false,
        };
        if root_changed {
            actions.push(ContextAction::UnsetDataRoot);
        }
        if is_dir {
            actions.push(ContextAction::CreateDirectory);
        } else {
            actions.push(ContextAction::OpenFile);
        }
        actions
    }

    /// Install the callback used to preview files from the archive.
    pub fn set_open_handler(&self, handler: impl Fn(&EntryRef) -> anyhow::Result<()> + 'static) {
        *self.core.open_handler.borrow_mut() = Some(Box::new(handler));
    }

    /// Ask the host to extract and open the file behind `node`.
    pub fn request_open(&self, node: &NodeRef) {
        let Some(entry) = node.entry() else {
            return;
        };
        if entry.is_dir() {
            return;
        }
        let handler = self.core.open_handler.borrow();
        if let Some(handler) = handler.as_ref() {
            if let Err(error) = handler(&entry) {
                warn!("could not open {:?}: {:#}", entry.name(), error);
            }
        }
    }

    /// Accept if the layout checks out; otherwise hand back the warning the
    /// user has to wave through.
    pub fn try_accept(&self) -> AcceptOutcome {
        if self.core.status.get().is_problem() {
            AcceptOutcome::NeedsConfirmation(LAYOUT_WARNING.to_string())
        } else {
            AcceptOutcome::Accepted
        }
    }

    /// The tree to install: the current data root's entry with everything
    /// the user left checked.
    pub fn modified_tree(&self) -> EntryRef {
        let root = self.core.data_root.borrow();
        root.entry().unwrap_or_else(|| self.core.archive.clone())
    }
}

impl DialogCore {
    /// Detach `node`'s entry, then walk up the entry chain detaching every
    /// directory the removal left empty.
    fn detach_parents(&self, node: &NodeRef) {
        let Some(entry) = node.entry() else {
            return;
        };
        let mut parent = entry.parent();
        entry.detach();
        while let Some(dir) = parent {
            if !dir.is_empty() {
                break;
            }
            parent = dir.parent();
            dir.detach();
        }
    }

    /// Re-attach `node`'s entry chain by walking the display parents and
    /// inserting each entry into the one above. Entries that are already in
    /// place are left alone.
    fn attach_parents(&self, node: &NodeRef) {
        let mut item = node.clone();
        while let Some(parent) = item.parent() {
            if let (Some(parent_entry), Some(entry)) = (parent.entry(), item.entry()) {
                if let Err(error) = parent_entry.insert(entry, InsertPolicy::FailIfExists) {
                    warn!("could not re-attach {:?}: {}", item.label(), error);
                }
            }
            item = parent;
        }
    }

    /// Re-attach the materialized subtree below `node`. Directories that
    /// were never populated still hold their entries, so recursion stops at
    /// them and the subtree comes back wholesale.
    fn recursive_insert(&self, node: &NodeRef) {
        if !node.is_populated() {
            return;
        }
        let Some(tree) = node.entry() else {
            return;
        };
        for child in node.children() {
            let Some(child_entry) = child.entry() else {
                continue;
            };
            if let Err(error) = tree.insert(child_entry.clone(), InsertPolicy::FailIfExists) {
                warn!("could not restore {:?}: {}", child.label(), error);
            }
            if child_entry.is_dir() {
                self.recursive_insert(&child);
            }
        }
    }

    /// Empty the entries of the materialized subtree below `node`, deepest
    /// directories first. The display nodes keep the detached entries
    /// alive for re-checking.
    fn recursive_detach(&self, node: &NodeRef) {
        if !node.is_populated() {
            return;
        }
        for child in node.children() {
            if child.entry().map(|entry| entry.is_dir()).unwrap_or(false) {
                self.recursive_detach(&child);
            }
        }
        if let Some(entry) = node.entry() {
            entry.clear();
        }
    }

    fn create_directory(&self, parent: &NodeRef, name: &str) -> Result<NodeRef, DialogError> {
        let Some(parent_entry) = parent.entry() else {
            return Err(DialogError::CreateUnderFile);
        };
        if parent_entry.is_file() {
            return Err(DialogError::CreateUnderFile);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DialogError::EmptyName);
        }

        // Unchecked rows are the sole owners of their detached entries, so
        // the collision check consults both the rows and the entry.
        if parent.find_child(name).is_some() || parent_entry.exists(name) {
            return Err(DialogError::NameExists);
        }

        // Expand before adding the entry; populating afterwards would
        // materialize a second row for it.
        self.model.expand(parent);

        let entry = parent_entry
            .add_directory(name)
            .map_err(|_| DialogError::NameExists)?;
        let node = TreeNode::for_entry(&entry);
        parent.add_child(&node);
        debug!("created directory {:?} under {:?}", name, parent.label());

        // Checking the new row raises the usual semantic event, which also
        // re-attaches a pruned ancestor chain and refreshes the status.
        self.model.set_check_state(&node, CheckState::Checked);

        Ok(node)
    }

    fn set_data_root(&self, node: &NodeRef) {
        let current = self.data_root.borrow().clone();
        if !Rc::ptr_eq(&current, node) {
            self.switch_root(node);
        }
        self.update_problems();
    }

    /// Re-scope the view to `node`: the previous root takes the visible
    /// rows back, the new root is populated and lends its rows to the view
    /// root. Row state survives both directions, so switching back restores
    /// the old view exactly.
    fn switch_root(&self, node: &NodeRef) {
        let previous = self.data_root.borrow().clone();
        previous.add_children(self.view_root.take_children());

        self.model.populate(node, false);
        *self.data_root.borrow_mut() = node.clone();
        self.view_root.set_entry(node.entry());
        self.view_root.add_children(node.take_children());
        self.model.expand(&self.view_root);
        debug!("data root is now {:?}", node.label());
    }

    /// Re-run the content checker over the current data root.
    fn update_problems(&self) {
        let status = match &self.checker {
            Some(checker) => {
                let root = self.data_root.borrow().clone();
                match root.entry() {
                    Some(entry) => match checker.data_looks_valid(&entry) {
                        CheckReturn::Valid => ContentStatus::Valid,
                        CheckReturn::Invalid => ContentStatus::Invalid,
                    },
                    None => ContentStatus::Unknown,
                }
            }
            None => ContentStatus::Unknown,
        };
        if status != self.status.get() {
            debug!("content status is now {:?}", status);
            self.status.set(status);
        }
    }
}

impl TreeEventHandler for DialogCore {
    fn check_state_changed(&self, node: &NodeRef) {
        let Some(entry) = node.entry() else {
            return;
        };

        // A directory toggle covers its materialized subtree. Directories
        // that were never populated keep their entries, so detaching the
        // directory itself below is enough for those.
        if entry.is_dir() && node.is_populated() {
            match node.check_state() {
                CheckState::Checked => self.recursive_insert(node),
                CheckState::Unchecked => self.recursive_detach(node),
                CheckState::Partial => {}
            }
        }

        if node.check_state() == CheckState::Unchecked {
            self.detach_parents(node);
        } else {
            self.attach_parents(node);
        }

        self.update_problems();
    }

    fn item_moved(&self, source: &NodeRef, target: &NodeRef) {
        let Some(source_entry) = source.entry() else {
            return;
        };
        let Some(target_entry) = target.entry() else {
            return;
        };

        self.detach_parents(source);

        // A same-named display child of the target either yields or
        // absorbs: a file is about to be replaced, so its row goes away; a
        // directory is re-checked first so a detached entry is back in the
        // tree by the time the merge runs.
        let wanted = normalize_name(source_entry.name());
        for child in target.children() {
            let Some(child_entry) = child.entry() else {
                continue;
            };
            if normalize_name(child_entry.name()) != wanted {
                continue;
            }
            if child_entry.is_file() {
                target.remove_child(&child);
            } else {
                self.model.set_check_state(&child, CheckState::Checked);
            }
            break;
        }

        if let Err(error) = target_entry.insert(source_entry, InsertPolicy::Merge) {
            warn!("could not re-home {:?}: {}", source.label(), error);
        }

        self.attach_parents(target);
        self.update_problems();
    }
}
