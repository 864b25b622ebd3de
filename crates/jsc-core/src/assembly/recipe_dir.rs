//! Bookkeeping files of a recipe directory.
//!
//! The same layout is used for the staged recipe, the committed recipe and
//! the copy saved inside each backup:
//!
//! ```text
//! src/Jumpstart-Recipe
//! software-list               installed software as JSON
//! state.json                  full recipe state
//! is-dev                      "1" or "0"
//! is-software-list-synced     "1" or "0"
//! deploy-time                 RFC 3339 timestamp
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};

use crate::recipe::{self, Command, RECIPE_FILE_NAME, RecipeState, SoftwareList};

use super::fsutil::sync_dir;

pub const SOFTWARE_LIST: &str = "software-list";
pub const STATE: &str = "state.json";
pub const IS_DEV: &str = "is-dev";
pub const IS_SYNCED: &str = "is-software-list-synced";
pub const DEPLOY_TIME: &str = "deploy-time";

/// Shown when a recipe has no readable name.
pub const UNKNOWN_NAME: &str = "<broken/unknown>";

/// Shown where no recipe was deployed at all.
pub const NO_RECIPE: &str = "<none>";

#[derive(Debug, Clone)]
pub struct RecipeDir {
    path: PathBuf,
}

impl RecipeDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn script(&self) -> PathBuf {
        self.path.join("src").join(RECIPE_FILE_NAME)
    }

    /// Recipe name from `state.json`, falling back to the first `name`
    /// statement of the script.
    pub fn name(&self) -> String {
        if let Some(name) = self.state().and_then(|s| s.name) {
            return name;
        }
        let Ok(text) = fs::read_to_string(self.script()) else {
            return UNKNOWN_NAME.to_string();
        };
        recipe::parse(&text)
            .ok()
            .and_then(|stmts| {
                stmts
                    .into_iter()
                    .find(|s| s.command == Command::Name)
                    .and_then(|s| s.args.into_iter().next())
            })
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    pub fn state(&self) -> Option<RecipeState> {
        let text = fs::read_to_string(self.path.join(STATE)).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn software_list(&self) -> Option<SoftwareList> {
        let text = self.software_list_raw().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// The software list exactly as stored, for posting upstream.
    pub fn software_list_raw(&self) -> io::Result<String> {
        fs::read_to_string(self.path.join(SOFTWARE_LIST))
    }

    pub fn deploy_time(&self) -> Option<String> {
        fs::read_to_string(self.path.join(DEPLOY_TIME))
            .ok()
            .map(|s| s.trim().to_string())
    }

    pub fn is_dev(&self) -> bool {
        self.flag(IS_DEV)
    }

    pub fn is_synced(&self) -> bool {
        self.flag(IS_SYNCED)
    }

    pub fn set_synced(&self, synced: bool) -> io::Result<()> {
        write_flag(&self.path.join(IS_SYNCED), synced)?;
        sync_dir(&self.path)
    }

    /// Write everything a finalized deploy records.
    pub fn write_deploy(
        &self,
        state: &RecipeState,
        dev: bool,
        at: DateTime<Local>,
    ) -> io::Result<()> {
        let software = serde_json::to_string(&state.software_list).map_err(io::Error::other)?;
        let full = serde_json::to_string(state).map_err(io::Error::other)?;
        fs::write(self.path.join(SOFTWARE_LIST), software)?;
        fs::write(self.path.join(STATE), full)?;
        write_flag(&self.path.join(IS_DEV), dev)?;
        write_flag(&self.path.join(IS_SYNCED), false)?;
        fs::write(self.path.join(DEPLOY_TIME), at.to_rfc3339_opts(SecondsFormat::Secs, false))?;
        sync_dir(&self.path)
    }

    fn flag(&self, name: &str) -> bool {
        fs::read_to_string(self.path.join(name)).is_ok_and(|s| s.trim() == "1")
    }
}

fn write_flag(path: &Path, on: bool) -> io::Result<()> {
    fs::write(path, if on { "1" } else { "0" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::PackageEntry;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn staged(tmp: &TempDir, script: &str) -> RecipeDir {
        let dir = RecipeDir::new(tmp.path().join("recipe"));
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.script(), script).unwrap();
        dir
    }

    #[test]
    fn test_name_falls_back_to_script() {
        let tmp = TempDir::new().unwrap();
        let dir = staged(&tmp, "# demo\nname 'my site'\nrun true\n");
        assert_eq!(dir.name(), "my site");
    }

    #[test]
    fn test_unknown_name() {
        let tmp = TempDir::new().unwrap();
        let dir = staged(&tmp, "bogus\n");
        assert_eq!(dir.name(), UNKNOWN_NAME);
        assert_eq!(RecipeDir::new(tmp.path().join("missing")).name(), UNKNOWN_NAME);
    }

    #[test]
    fn test_write_deploy() {
        let tmp = TempDir::new().unwrap();
        let dir = staged(&tmp, "name ignored\n");
        let mut state = RecipeState::new(true);
        state.name = Some("demo".into());
        state.software_list.package.insert(
            "nginx".into(),
            PackageEntry {
                version: "1.9.9-1".into(),
            },
        );

        dir.write_deploy(&state, true, Local::now()).unwrap();

        assert_eq!(dir.name(), "demo");
        assert!(dir.is_dev());
        assert!(!dir.is_synced());
        assert_eq!(dir.software_list().unwrap(), state.software_list);
        assert!(
            DateTime::parse_from_rfc3339(&dir.deploy_time().unwrap()).is_ok(),
            "deploy time must be RFC 3339"
        );

        dir.set_synced(true).unwrap();
        assert!(dir.is_synced());
    }
}
