//! Remote method handlers.
//!
//! `do_*` methods administer the assembly; `rc_*` methods execute one
//! recipe statement each and return the updated recipe state.

pub mod backup;
pub mod deploy;
pub mod recipe;
pub mod session;

use crate::handler;
use crate::server::Registry;

/// Register every method.
pub fn register(registry: &mut Registry) {
    registry.register("do_assert_is_assembly", handler!(session::do_assert_is_assembly));
    registry.register("do_check_init", handler!(session::do_check_init));
    registry.register("do_clean", handler!(session::do_clean));
    registry.register("do_env", handler!(session::do_env));
    registry.register("do_init", handler!(session::do_init));
    registry.register("do_lock_session", handler!(session::do_lock_session));
    registry.register("do_run", handler!(session::do_run));
    registry.register("do_status", handler!(session::do_status));
    registry.register("do_sync", handler!(session::do_sync));
    registry.register("do_version", handler!(session::do_version));

    registry.register("do_backup_du", handler!(backup::do_backup_du));
    registry.register("do_backup_ls", handler!(backup::do_backup_ls));
    registry.register("do_backup_new", handler!(backup::do_backup_new));
    registry.register("do_backup_rm", handler!(backup::do_backup_rm));
    registry.register("do_revert", handler!(backup::do_revert));

    registry.register("do_deploy_reset_check", handler!(deploy::do_deploy_reset_check));
    registry.register("do_deploy_read_new_recipe", handler!(deploy::do_deploy_read_new_recipe));
    registry.register("do_deploy_finalize", handler!(deploy::do_deploy_finalize));
    registry.register("do_file_append", handler!(deploy::do_file_append));
    registry.register("do_mkdir", handler!(deploy::do_mkdir));
    registry.register("do_symlink", handler!(deploy::do_symlink));

    registry.register("rc_name", handler!(recipe::rc_name));
    registry.register("rc_package", handler!(recipe::rc_package));
    registry.register("rc_gd", handler!(recipe::rc_gd));
    registry.register("rc_run", handler!(recipe::rc_run));
    registry.register("rc_install", handler!(recipe::rc_install));
    registry.register("rc_append", handler!(recipe::rc_append));
    registry.register("rc_put", handler!(recipe::rc_put));
    registry.register("rc_replace", handler!(recipe::rc_replace));
    registry.register("rc_insert", handler!(recipe::rc_insert));
    registry.register("rc_rinsert", handler!(recipe::rc_rinsert));
}
