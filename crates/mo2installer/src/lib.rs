//! Manual installation plugin.
//!
//! The fallback installer: presents an archive as a checkable tree and lets
//! the user build the mod layout by hand before anything is written to
//! disk. Runs for any archive, at the lowest priority, so it only kicks in
//! when no specialized installer recognizes the content.

pub mod dialog;
pub mod tree_model;

use std::rc::Rc;

use anyhow::Context as _;
use mo2api::filetree::EntryRef;
use mo2api::guessed::{GuessedValue, Quality};
use mo2api::plugin::{
    InstallResult, InstallationManager, Organizer, Plugin, PluginInstaller, Setting, VersionInfo,
};
use tracing::{debug, warn};

use crate::dialog::InstallDialog;

/// How the hosting UI closed the modal dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogOutcome {
    Accepted,
    Rejected,
}

/// Presents the dialog to the user and reports how it was closed. In
/// production this enters the UI event loop; tests script interactions
/// against the dialog directly.
pub type DialogRunner = Box<dyn Fn(&InstallDialog) -> DialogOutcome>;

/// The manual installer plugin.
pub struct ManualInstaller {
    organizer: Option<Rc<dyn Organizer>>,
    manager: Rc<dyn InstallationManager>,
    runner: DialogRunner,
}

impl ManualInstaller {
    pub fn new(
        manager: Rc<dyn InstallationManager>,
        runner: impl Fn(&InstallDialog) -> DialogOutcome + 'static,
    ) -> Self {
        ManualInstaller {
            organizer: None,
            manager,
            runner: Box::new(runner),
        }
    }
}

impl Plugin for ManualInstaller {
    fn init(&mut self, organizer: Rc<dyn Organizer>) -> bool {
        self.organizer = Some(organizer);
        true
    }

    fn name(&self) -> &str {
        "Manual Installer"
    }

    fn author(&self) -> &str {
        "Tannin"
    }

    fn description(&self) -> &str {
        "Fallback installer for archives that no other installer can handle"
    }

    fn version(&self) -> VersionInfo {
        VersionInfo::new(1, 0, 0)
    }

    fn settings(&self) -> Vec<Setting> {
        Vec::new()
    }
}

impl PluginInstaller for ManualInstaller {
    fn priority(&self) -> u32 {
        0
    }

    fn is_manual_installer(&self) -> bool {
        true
    }

    fn is_archive_supported(&self, _tree: &EntryRef) -> bool {
        true
    }

    fn install(&self, mod_name: &mut GuessedValue<String>, tree: &mut EntryRef) -> InstallResult {
        let Some(organizer) = self.organizer.clone() else {
            warn!("install called before init");
            return InstallResult::Failed;
        };

        debug!("offering installation dialog");
        let dialog = InstallDialog::new(
            tree.clone(),
            mod_name,
            organizer.mod_data_checker(),
            &organizer.data_directory_name(),
        );

        let manager = self.manager.clone();
        dialog.set_open_handler(move |entry| {
            let path = manager
                .extract_file(entry, false)
                .with_context(|| format!("could not extract {:?}", entry.path()))?;
            opener::open(&path).with_context(|| format!("could not open {:?}", path))?;
            Ok(())
        });

        match (self.runner)(&dialog) {
            DialogOutcome::Accepted => {
                mod_name.update(&dialog.mod_name(), Quality::User);
                *tree = dialog.modified_tree();
                InstallResult::Success
            }
            DialogOutcome::Rejected => InstallResult::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use mo2api::checker::{HeuristicChecker, ModDataChecker};
    use mo2api::filetree::{from_directory, TreeEntry};

    use crate::dialog::AcceptOutcome;
    use crate::tree_model::{CheckState, NodeRef};

    struct TestOrganizer {
        data_dir: String,
        checker: Option<Rc<dyn ModDataChecker>>,
    }

    impl Organizer for TestOrganizer {
        fn data_directory_name(&self) -> String {
            self.data_dir.clone()
        }

        fn mod_data_checker(&self) -> Option<Rc<dyn ModDataChecker>> {
            self.checker.clone()
        }
    }

    struct TestManager;

    impl InstallationManager for TestManager {
        fn extract_file(&self, entry: &EntryRef, _silent: bool) -> anyhow::Result<PathBuf> {
            Ok(std::env::temp_dir().join(entry.name()))
        }
    }

    fn test_organizer() -> Rc<dyn Organizer> {
        Rc::new(TestOrganizer {
            data_dir: "Data".to_string(),
            checker: Some(Rc::new(HeuristicChecker)),
        })
    }

    fn node_at(dialog: &InstallDialog, path: &str) -> NodeRef {
        let mut current = dialog.view_root();
        for part in path.split('/') {
            dialog.model().expand(&current);
            current = current
                .find_child(part)
                .unwrap_or_else(|| panic!("missing node {part:?}"));
        }
        current
    }

    #[test]
    fn test_plugin_metadata() {
        let installer = ManualInstaller::new(Rc::new(TestManager), |_| DialogOutcome::Rejected);

        assert_eq!(installer.name(), "Manual Installer");
        assert_eq!(installer.priority(), 0);
        assert!(installer.is_manual_installer());
        assert!(installer.settings().is_empty());
        let tree = TreeEntry::new_directory("");
        assert!(installer.is_archive_supported(&tree));
    }

    #[test]
    fn test_install_requires_init() {
        let installer = ManualInstaller::new(Rc::new(TestManager), |_| DialogOutcome::Accepted);
        let mut name = GuessedValue::new();
        let mut tree = TreeEntry::new_directory("");

        assert_eq!(
            installer.install(&mut name, &mut tree),
            InstallResult::Failed
        );
    }

    #[test]
    fn test_canceled_install_leaves_inputs_alone() {
        let mut installer = ManualInstaller::new(Rc::new(TestManager), |_| DialogOutcome::Rejected);
        assert!(installer.init(test_organizer()));

        let mut name = GuessedValue::new();
        name.update("Guessed", Quality::Good);
        let original = TreeEntry::new_directory("");
        original.add_file("mod.esp").unwrap();
        let mut tree = original.clone();

        assert_eq!(
            installer.install(&mut name, &mut tree),
            InstallResult::Canceled
        );
        assert!(Rc::ptr_eq(&tree, &original));
        assert_eq!(name.value(), "Guessed");
        assert_eq!(name.quality(), Quality::Good);
    }

    #[test]
    fn test_install_applies_dialog_edits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("textures")).unwrap();
        std::fs::write(dir.path().join("textures").join("armor.dds"), b"dds").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"docs").unwrap();

        let mut installer = ManualInstaller::new(Rc::new(TestManager), |dialog| {
            let readme = node_at(dialog, "readme.txt");
            dialog.model().set_check_state(&readme, CheckState::Unchecked);
            dialog.set_mod_name("Armor Pack");
            assert_eq!(dialog.try_accept(), AcceptOutcome::Accepted);
            DialogOutcome::Accepted
        });
        assert!(installer.init(test_organizer()));

        let mut name = GuessedValue::new();
        name.update("armor-pack-1.0", Quality::Fallback);
        let mut tree = from_directory(dir.path()).unwrap();

        assert_eq!(
            installer.install(&mut name, &mut tree),
            InstallResult::Success
        );
        assert_eq!(name.value(), "Armor Pack");
        assert_eq!(name.quality(), Quality::User);
        assert!(tree.resolve("textures/armor.dds").is_some());
        assert!(tree.resolve("readme.txt").is_none());
    }

    #[test]
    fn test_install_uses_selected_data_root() {
        let root = TreeEntry::new_directory("");
        let data = root.add_directory("data").unwrap();
        let textures = data.add_directory("textures").unwrap();
        textures.add_file("a.dds").unwrap();
        root.add_file("manifest.json").unwrap();

        let mut installer = ManualInstaller::new(Rc::new(TestManager), |dialog| {
            let data_node = node_at(dialog, "data");
            dialog.set_data_root(&data_node).unwrap();
            DialogOutcome::Accepted
        });
        assert!(installer.init(test_organizer()));

        let mut name = GuessedValue::new();
        let mut tree = root.clone();

        assert_eq!(
            installer.install(&mut name, &mut tree),
            InstallResult::Success
        );
        assert_eq!(tree.name(), "data");
        assert!(tree.resolve("textures/a.dds").is_some());
        assert!(!Rc::ptr_eq(&tree, &root));
    }
}
