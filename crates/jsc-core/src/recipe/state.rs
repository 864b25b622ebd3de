//! Deployment state accumulated while a recipe runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Everything a deploy records about itself.
///
/// Sent along with every `rc_*` call and returned, mutated, by each
/// successful statement. Persisted as `state.json` at finalize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeState {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_dev: bool,
    #[serde(default)]
    pub software_list: SoftwareList,
}

impl RecipeState {
    /// Empty state at the start of a recipe run.
    pub fn new(is_dev: bool) -> Self {
        Self {
            name: None,
            is_dev,
            software_list: SoftwareList::default(),
        }
    }
}

/// Installed software, keyed by package name and checkout path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareList {
    #[serde(default)]
    pub package: BTreeMap<String, PackageEntry>,
    #[serde(default)]
    pub gd: BTreeMap<String, GdEntry>,
}

impl SoftwareList {
    pub fn is_empty(&self) -> bool {
        self.package.is_empty() && self.gd.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub version: String,
}

/// A git checkout performed by `gd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GdEntry {
    pub repo: String,
    /// Symbolic ref that was checked out (`refs/heads/..` or `refs/tags/..`),
    /// `None` for a detached checkout.
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub commit: String,
}
