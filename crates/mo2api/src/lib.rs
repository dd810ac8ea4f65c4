//! Host-side interfaces consumed by installer plugins.
//!
//! The host owns the archive file tree, the game's data checker and the
//! installation manager; plugins receive them through the types in this
//! crate and hand back a (possibly modified) tree.

pub mod checker;
pub mod filetree;
pub mod guessed;
pub mod plugin;

pub use checker::{CheckReturn, HeuristicChecker, ModDataChecker};
pub use filetree::{EntryRef, InsertPolicy, TreeEntry, TreeError};
pub use guessed::{GuessedValue, Quality};
pub use plugin::{
    InstallResult, InstallationManager, Organizer, Plugin, PluginInstaller, Setting, VersionInfo,
};
