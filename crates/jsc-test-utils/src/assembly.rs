//! Throwaway assembly filesystems.
//!
//! [`TestAssembly`] lays out `app/code`, `app/state` and `app/env.json`
//! under a temporary root. The directory is deleted when the value is
//! dropped, even on panic.

use std::fs;
use std::path::{Path, PathBuf};

use jsc_config::AppConfig;
use jsc_core::assembly::Layout;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::config::TestConfigBuilder;

/// Package manager stand-in: reports every requested package as installed
/// at version `1.0-1`.
pub const FAKE_PACKAGE_MANAGER: [&str; 4] = [
    "sh",
    "-c",
    r#"printf 'Packages (%d)' "$#"; for p in "$@"; do printf ' %s-1.0-1' "$p"; done; echo"#,
    "pm",
];

pub struct TestAssembly {
    layout: Layout,
    _temp_dir: TempDir,
}

impl TestAssembly {
    /// An assembly whose environment marks it as one, with no sync endpoint.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let layout = Layout::new(temp_dir.path());
        fs::create_dir_all(layout.code_dir()).expect("failed to create app/code");
        fs::create_dir_all(layout.state_dir()).expect("failed to create app/state");
        let assembly = Self {
            layout,
            _temp_dir: temp_dir,
        };
        assembly.write_env(&json!({
            "ident": {
                "container": { "is_assembly": true },
                "user": { "name": "Test Operator", "email": "ops@example.com" }
            }
        }));
        assembly
    }

    /// Same as [`new`](Self::new) but syncing software lists to `url`.
    pub fn with_sync(url: &str, session_key: &str) -> Self {
        let assembly = Self::new();
        assembly.write_env(&json!({
            "ident": {
                "container": {
                    "is_assembly": true,
                    "software_list_sync_url": url,
                    "session_key": session_key
                }
            }
        }));
        assembly
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Configuration pointing at this root with a fake package manager.
    pub fn config(&self) -> AppConfig {
        TestConfigBuilder::new()
            .assembly_root(self.root())
            .package_manager(&FAKE_PACKAGE_MANAGER)
            .build()
    }

    /// Replace `app/env.json`.
    pub fn write_env(&self, env: &Value) {
        let text = serde_json::to_string_pretty(env).expect("env must serialize");
        fs::write(self.layout.env_file(), text).expect("failed to write env.json");
    }

    pub fn code_path(&self, rel: &str) -> PathBuf {
        self.layout.code_dir().join(rel)
    }

    pub fn state_path(&self, rel: &str) -> PathBuf {
        self.layout.state_dir().join(rel)
    }

    /// Write a file under `app/code`, creating parents.
    pub fn write_code(&self, rel: &str, content: &str) {
        let path = self.code_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent");
        }
        fs::write(path, content).expect("failed to write code file");
    }

    /// Write a file under `app/state`, creating parents.
    pub fn write_state(&self, rel: &str, content: &str) {
        let path = self.state_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent");
        }
        fs::write(path, content).expect("failed to write state file");
    }
}

impl Default for TestAssembly {
    fn default() -> Self {
        Self::new()
    }
}
