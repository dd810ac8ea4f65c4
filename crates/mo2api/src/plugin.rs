//! Plugin lifecycle and the host services plugins rely on.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::checker::ModDataChecker;
use crate::filetree::EntryRef;
use crate::guessed::GuessedValue;

/// Plugin version, displayed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionInfo {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        VersionInfo {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A host-persisted plugin setting and its default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub description: String,
    pub default: serde_json::Value,
}

/// Outcome of an installer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallResult {
    Success,
    Failed,
    Canceled,
}

/// Host context handed to plugins at init.
pub trait Organizer {
    /// Name of the managed game's data directory ("Data", "Data Files", ...).
    fn data_directory_name(&self) -> String;

    /// The game's data checker, when the game plugin provides one.
    fn mod_data_checker(&self) -> Option<Rc<dyn ModDataChecker>>;
}

/// Archive services available to installer plugins while installing.
pub trait InstallationManager {
    /// Extract a single file from the archive to a temporary location and
    /// return the extracted path. `silent` suppresses host progress UI.
    fn extract_file(&self, entry: &EntryRef, silent: bool) -> anyhow::Result<PathBuf>;
}

/// Base contract for anything the host loads.
pub trait Plugin {
    /// Called once after loading; returning false disables the plugin.
    fn init(&mut self, organizer: Rc<dyn Organizer>) -> bool;

    fn name(&self) -> &str;

    fn author(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> VersionInfo;

    /// Settings this plugin wants the host to persist.
    fn settings(&self) -> Vec<Setting>;
}

/// An installer: the host offers each new archive to installers by
/// descending priority until one takes it.
pub trait PluginInstaller: Plugin {
    fn priority(&self) -> u32;

    /// True for the installer the user invokes explicitly as "manual".
    fn is_manual_installer(&self) -> bool;

    /// Whether this installer can do anything with the given archive tree.
    fn is_archive_supported(&self, tree: &EntryRef) -> bool;

    /// Run the installation. On [`InstallResult::Success`], `tree` has been
    /// replaced with the tree to install, which can be a subtree of the
    /// original, and `mod_name` reflects the user's choice.
    fn install(&self, mod_name: &mut GuessedValue<String>, tree: &mut EntryRef) -> InstallResult;
}
