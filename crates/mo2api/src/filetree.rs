//! Reference-counted file tree describing archive content.
//!
//! The tree handed to an installer plugin: directories own their children,
//! children keep a weak link back to their parent, and names are unique per
//! directory under case-insensitive comparison. Detaching an entry removes
//! the parent's owning reference, so a detached subtree stays alive only as
//! long as someone else holds a handle to it.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::path::Path;
use std::rc::{Rc, Weak};

use anyhow::{Context, Result};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Shared handle to a tree entry.
pub type EntryRef = Rc<TreeEntry>;

/// Conflict resolution for [`TreeEntry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Refuse the insert when a same-named entry exists.
    FailIfExists,
    /// Drop the existing same-named entry, then insert.
    Replace,
    /// Combine same-named directories recursively; files are overwritten.
    Merge,
}

/// Errors raised by tree mutations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("an entry named \"{0}\" already exists")]
    AlreadyExists(String),
    #[error("\"{0}\" is not a directory")]
    NotADirectory(String),
}

#[derive(Debug)]
enum EntryKind {
    Directory { children: RefCell<Vec<EntryRef>> },
    File,
}

/// A single directory or file in the tree.
#[derive(Debug)]
pub struct TreeEntry {
    name: String,
    parent: RefCell<Weak<TreeEntry>>,
    kind: EntryKind,
}

/// Normalize an entry name for case-insensitive comparison.
///
/// NFC first so visually identical names compare equal, then lowercase.
pub fn normalize_name(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

/// Ordering used for directory listings: directories first, then
/// case-insensitive alphabetical.
fn entry_order(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| normalize_name(a.name()).cmp(&normalize_name(b.name())))
}

impl TreeEntry {
    /// Create a detached directory entry.
    pub fn new_directory(name: &str) -> EntryRef {
        Rc::new(TreeEntry {
            name: name.to_string(),
            parent: RefCell::new(Weak::new()),
            kind: EntryKind::Directory {
                children: RefCell::new(Vec::new()),
            },
        })
    }

    /// Create a detached file entry.
    pub fn new_file(name: &str) -> EntryRef {
        Rc::new(TreeEntry {
            name: name.to_string(),
            parent: RefCell::new(Weak::new()),
            kind: EntryKind::File,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File-name suffix without the dot; empty for directories and for
    /// names without one.
    pub fn suffix(&self) -> &str {
        if self.is_dir() {
            return "";
        }
        match self.name.rsplit_once('.') {
            Some((_, suffix)) => suffix,
            None => "",
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    /// The owning directory, if this entry is currently attached.
    pub fn parent(&self) -> Option<EntryRef> {
        self.parent.borrow().upgrade()
    }

    /// Slash-separated path from the tree root. The root itself contributes
    /// no component, so a top-level entry's path is just its name.
    pub fn path(&self) -> String {
        match self.parent() {
            Some(parent) => {
                let prefix = parent.path();
                if prefix.is_empty() {
                    self.name.clone()
                } else {
                    format!("{}/{}", prefix, self.name)
                }
            }
            None => String::new(),
        }
    }

    /// Snapshot of the children in listing order. Empty for files.
    pub fn children(&self) -> Vec<EntryRef> {
        match &self.kind {
            EntryKind::Directory { children } => children.borrow().clone(),
            EntryKind::File => Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        match &self.kind {
            EntryKind::Directory { children } => children.borrow().len(),
            EntryKind::File => 0,
        }
    }

    /// True for a directory with no children. Files are never "empty".
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            EntryKind::Directory { children } => children.borrow().is_empty(),
            EntryKind::File => false,
        }
    }

    /// Find a direct child by case-insensitive name.
    pub fn find(&self, name: &str) -> Option<EntryRef> {
        let key = normalize_name(name);
        match &self.kind {
            EntryKind::Directory { children } => children
                .borrow()
                .iter()
                .find(|child| normalize_name(&child.name) == key)
                .cloned(),
            EntryKind::File => None,
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Resolve a slash-separated path to a descendant entry.
    pub fn resolve(&self, path: &str) -> Option<EntryRef> {
        let mut components = path.split('/').filter(|s| !s.is_empty());
        let first = components.next()?;
        let mut current = self.find(first)?;
        for component in components {
            let next = current.find(component)?;
            current = next;
        }
        Some(current)
    }

    /// Remove this entry from its parent's children. Returns false when the
    /// entry had no parent.
    pub fn detach(self: &Rc<Self>) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        if let EntryKind::Directory { children } = &parent.kind {
            children.borrow_mut().retain(|child| !Rc::ptr_eq(child, self));
        }
        *self.parent.borrow_mut() = Weak::new();
        true
    }

    /// Detach every child in one call. No-op on files.
    ///
    /// Children nobody else holds a handle to are destroyed here.
    pub fn clear(&self) {
        if let EntryKind::Directory { children } = &self.kind {
            let detached: Vec<EntryRef> = children.borrow_mut().drain(..).collect();
            for child in &detached {
                *child.parent.borrow_mut() = Weak::new();
            }
        }
    }

    /// Insert `entry` as a child of this directory, removing it from its
    /// previous parent. Inserting an entry that is already a child of this
    /// directory is a no-op; other name collisions resolve per `policy`.
    pub fn insert(self: &Rc<Self>, entry: EntryRef, policy: InsertPolicy) -> Result<(), TreeError> {
        if !self.is_dir() {
            return Err(TreeError::NotADirectory(self.name.clone()));
        }

        if let Some(existing) = self.find(entry.name()) {
            if Rc::ptr_eq(&existing, &entry) {
                return Ok(());
            }
            match policy {
                InsertPolicy::FailIfExists => {
                    return Err(TreeError::AlreadyExists(entry.name().to_string()));
                }
                InsertPolicy::Merge if existing.is_dir() && entry.is_dir() => {
                    // The incoming directory's children land in the existing
                    // one; the incoming shell is discarded.
                    entry.detach();
                    for child in entry.children() {
                        existing.insert(child, InsertPolicy::Merge)?;
                    }
                    return Ok(());
                }
                _ => {
                    // Replace, or a merge across entry kinds: the incoming
                    // entry wins.
                    existing.detach();
                }
            }
        }

        entry.detach();
        self.attach_sorted(&entry);
        Ok(())
    }

    /// Create a subdirectory, or return the existing one with that name.
    pub fn add_directory(self: &Rc<Self>, name: &str) -> Result<EntryRef, TreeError> {
        if !self.is_dir() {
            return Err(TreeError::NotADirectory(self.name.clone()));
        }
        if let Some(existing) = self.find(name) {
            if existing.is_dir() {
                return Ok(existing);
            }
            return Err(TreeError::AlreadyExists(name.to_string()));
        }
        let directory = TreeEntry::new_directory(name);
        self.attach_sorted(&directory);
        Ok(directory)
    }

    /// Create a file entry under this directory.
    pub fn add_file(self: &Rc<Self>, name: &str) -> Result<EntryRef, TreeError> {
        if !self.is_dir() {
            return Err(TreeError::NotADirectory(self.name.clone()));
        }
        if self.exists(name) {
            return Err(TreeError::AlreadyExists(name.to_string()));
        }
        let file = TreeEntry::new_file(name);
        self.attach_sorted(&file);
        Ok(file)
    }

    fn attach_sorted(self: &Rc<Self>, entry: &EntryRef) {
        let EntryKind::Directory { children } = &self.kind else {
            return;
        };
        *entry.parent.borrow_mut() = Rc::downgrade(self);
        let mut children = children.borrow_mut();
        let position = children
            .iter()
            .position(|child| entry_order(entry, child) == Ordering::Less)
            .unwrap_or(children.len());
        children.insert(position, entry.clone());
    }
}

/// Build a tree from a directory on disk, typically an extracted archive.
///
/// The returned root is anonymous; case-variant directory names on disk are
/// merged, case-variant file names keep the last one walked.
pub fn from_directory(dir: &Path) -> Result<EntryRef> {
    let root = TreeEntry::new_directory("");
    let mut count = 0usize;

    for item in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let relative = match item.path().strip_prefix(dir) {
            Ok(r) => r,
            Err(_) => continue,
        };

        let mut current = root.clone();
        if let Some(parent) = relative.parent() {
            for component in parent.components() {
                let name = component.as_os_str().to_string_lossy();
                current = current
                    .add_directory(&name)
                    .with_context(|| format!("cannot descend into {:?}", relative))?;
            }
        }

        let name = item.file_name().to_string_lossy();
        if item.file_type().is_dir() {
            current
                .add_directory(&name)
                .with_context(|| format!("cannot add directory {:?}", relative))?;
        } else if item.file_type().is_file() {
            current
                .insert(TreeEntry::new_file(&name), InsertPolicy::Replace)
                .with_context(|| format!("cannot add file {:?}", relative))?;
            count += 1;
        }
    }

    debug!("built archive tree with {} file(s) from {:?}", count, dir);
    Ok(root)
}
