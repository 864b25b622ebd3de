//! Typed params and results of the remote methods.
//!
//! Shared by the dispatcher (deserializing params, serializing results) and
//! the client wrappers (the other way round).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::recipe::{OptionValue, RecipeState, SoftwareList};

/// Params of methods that take none. Any object is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInit {
    pub needs_init: bool,
}

/// Content of the session lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSessionParams {
    pub hostname: String,
    pub unix_epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanParams {
    #[serde(default)]
    pub code: bool,
    #[serde(default)]
    pub state: bool,
    #[serde(default)]
    pub all: bool,
}

impl CleanParams {
    /// `(code, state)` datasets to clean. Nothing selected means code.
    pub fn datasets(&self) -> (bool, bool) {
        if self.all {
            return (true, true);
        }
        if !self.code && !self.state {
            return (true, false);
        }
        (self.code, self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadNewRecipeParams {
    pub path: String,
    #[serde(default)]
    pub dev: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeParams {
    #[serde(default)]
    pub dev: bool,
    pub state: RecipeState,
}

/// Append base64 `content` to a file under the staging `src` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAppendParams {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkParams {
    pub path: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirParams {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIdParams {
    pub id: u64,
}

/// Params of every `rc_*` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeCallParams {
    pub args: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    pub state: RecipeState,
}

/// One backup as listed by `do_backup_ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub id: u64,
    pub date: String,
    pub time: String,
    pub zone: String,
    pub recipe_name: String,
}

impl fmt::Display for BackupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {}, {}",
            self.id, self.date, self.time, self.zone, self.recipe_name
        )
    }
}

/// One backup as listed by `do_backup_du`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupUsage {
    #[serde(flatten)]
    pub entry: BackupEntry,
    /// Compressed archive size in bytes.
    pub size: u64,
    pub percent_of_disk: f64,
    /// Uncompressed tar stream size in bytes.
    pub raw_size: u64,
}

impl fmt::Display for BackupUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} ({:.1}% of disk) ({} raw)",
            self.entry,
            human_size(self.size),
            self.percent_of_disk,
            human_size(self.raw_size)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub dir: String,
    pub used: u64,
    pub total: u64,
    pub percent_used: f64,
}

impl fmt::Display for DiskUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} used of {} ({:.1}% used)",
            self.dir,
            human_size(self.used),
            human_size(self.total),
            self.percent_used
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub code_usage: DiskUsage,
    pub state_usage: DiskUsage,
    pub recipe_name: String,
    pub deploy_time: Option<String>,
    pub is_dev: bool,
    pub is_synced: bool,
    pub total_backups: usize,
    #[serde(default)]
    pub software: Option<SoftwareList>,
}

/// Typed view of `app/env.json`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    #[serde(default)]
    pub ident: Ident,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    #[serde(default)]
    pub container: ContainerIdent,
    #[serde(default)]
    pub user: UserIdent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerIdent {
    #[serde(default)]
    pub is_assembly: bool,
    #[serde(default)]
    pub software_list_sync_url: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Binary-prefixed size, `"1.5KiB"`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}YiB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_clean_datasets() {
        assert_eq!(CleanParams::default().datasets(), (true, false));
        let state_only = CleanParams {
            state: true,
            ..Default::default()
        };
        assert_eq!(state_only.datasets(), (false, true));
        let all = CleanParams {
            all: true,
            ..Default::default()
        };
        assert_eq!(all.datasets(), (true, true));
    }

    #[test]
    fn test_no_params_accepts_any_object() {
        let _: NoParams = serde_json::from_value(json!({"-v": true})).unwrap();
    }

    #[test]
    fn test_env_ignores_unknown_keys() {
        let env: Env = serde_json::from_value(json!({
            "ident": {
                "container": {"is_assembly": true, "id": 4711},
                "user": {"name": "Op", "email": "op@example.com"}
            },
            "settings": {}
        }))
        .unwrap();
        assert!(env.ident.container.is_assembly);
        assert_eq!(env.ident.user.email.as_deref(), Some("op@example.com"));
        assert_eq!(env.ident.container.software_list_sync_url, None);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0.0B");
        assert_eq!(human_size(1023), "1023.0B");
        assert_eq!(human_size(1536), "1.5KiB");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024), "5.0GiB");
    }

    #[test]
    fn test_backup_usage_flattens_entry() {
        let usage = BackupUsage {
            entry: BackupEntry {
                id: 3,
                date: "2016-01-05".into(),
                time: "12:00:00".into(),
                zone: "UTC".into(),
                recipe_name: "demo".into(),
            },
            size: 2048,
            percent_of_disk: 0.5,
            raw_size: 4096,
        };
        let value = serde_json::to_value(&usage).unwrap();
        assert_eq!(value["id"], json!(3));
        assert_eq!(value["raw_size"], json!(4096));
        assert_eq!(
            usage.to_string(),
            "3: 2016-01-05 12:00:00 UTC, demo, 2.0KiB (0.5% of disk) (4.0KiB raw)"
        );
    }
}
