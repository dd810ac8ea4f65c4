//! Layout checking for candidate mod content.
//!
//! The game plugin decides what a correctly laid out mod looks like; the
//! installer only asks. Hosts without a game-specific checker can fall back
//! to [`HeuristicChecker`].

use crate::filetree::{normalize_name, EntryRef};

/// Verdict on a candidate data tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckReturn {
    Valid,
    Invalid,
}

/// Game-supplied judgment on whether a tree's top level is installable as-is.
pub trait ModDataChecker {
    fn data_looks_valid(&self, tree: &EntryRef) -> CheckReturn;
}

/// Directory names that mark game data at the top level.
const CONTENT_DIRECTORIES: &[&str] = &[
    "textures",
    "meshes",
    "scripts",
    "sound",
    "interface",
    "seq",
    "skse",
    "obse",
    "fose",
    "nvse",
    "f4se",
    "sfse",
    "strings",
    "grass",
    "shadersfx",
    "lodsettings",
    "music",
    "video",
    "terrain",
];

/// File suffixes that mark game data at the top level.
const CONTENT_SUFFIXES: &[&str] = &["esp", "esm", "esl", "bsa", "ba2"];

/// Checker driven by well-known directory names and plugin/archive suffixes.
///
/// A tree looks valid when at least one top-level entry is a recognized
/// content directory or carries a recognized suffix.
#[derive(Debug, Default)]
pub struct HeuristicChecker;

impl ModDataChecker for HeuristicChecker {
    fn data_looks_valid(&self, tree: &EntryRef) -> CheckReturn {
        for child in tree.children() {
            if child.is_dir() {
                let name = normalize_name(child.name());
                if CONTENT_DIRECTORIES.contains(&name.as_str()) {
                    return CheckReturn::Valid;
                }
            } else {
                let suffix = child.suffix().to_lowercase();
                if CONTENT_SUFFIXES.contains(&suffix.as_str()) {
                    return CheckReturn::Valid;
                }
            }
        }
        CheckReturn::Invalid
    }
}
