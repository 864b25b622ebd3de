//! Disk usage and the `do_status` report.

use std::io;
use std::path::Path;

use nix::sys::statvfs::statvfs;

use crate::api::{DiskUsage, StatusReport};
use crate::server::HandlerError;

use super::Layout;
use super::backup;
use super::recipe_dir::{NO_RECIPE, RecipeDir};

/// Total size in bytes of the filesystem holding `path`.
pub fn filesystem_size(path: &Path) -> Result<u64, HandlerError> {
    let stat = statvfs(path).map_err(|errno| {
        HandlerError::io(format!("statvfs {}", path.display()))(io::Error::from(errno))
    })?;
    Ok(stat.fragment_size() as u64 * stat.blocks() as u64)
}

/// Usage of the filesystem holding `path`, labelled `dir`.
pub fn disk_usage(path: &Path, dir: String) -> Result<DiskUsage, HandlerError> {
    let stat = statvfs(path).map_err(|errno| {
        HandlerError::io(format!("statvfs {}", path.display()))(io::Error::from(errno))
    })?;
    let block = stat.fragment_size() as u64;
    let total = block * stat.blocks() as u64;
    let free = block * stat.blocks_available() as u64;
    let used = total.saturating_sub(free);
    let percent_used = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    };
    Ok(DiskUsage {
        dir,
        used,
        total,
        percent_used,
    })
}

pub fn report(layout: &Layout) -> Result<StatusReport, HandlerError> {
    let code = layout.code_dir();
    let state = layout.state_dir();
    let recipe = RecipeDir::new(layout.recipe_dir());
    let deployed = recipe.exists();

    Ok(StatusReport {
        code_usage: disk_usage(&code, layout.display(&code))?,
        state_usage: disk_usage(&state, layout.display(&state))?,
        recipe_name: if deployed {
            recipe.name()
        } else {
            NO_RECIPE.to_string()
        },
        deploy_time: recipe.deploy_time(),
        is_dev: recipe.is_dev(),
        is_synced: recipe.is_synced(),
        total_backups: backup::list(layout)?.len(),
        software: recipe.software_list(),
    })
}
