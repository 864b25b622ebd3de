//! Typed wrappers for the `do_*` methods.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{
    BackupEntry, BackupIdParams, BackupUsage, CheckInit, CleanParams, FileAppendParams,
    FinalizeParams, LockSessionParams, MkdirParams, NoParams, ReadNewRecipeParams, StatusReport,
    SymlinkParams,
};

use super::client::{Client, ClientError};

impl Client {
    /// Call with typed params and decode the typed result.
    pub async fn call_typed<P, R>(&mut self, method: &str, params: &P) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(|source| ClientError::Decode {
            method: method.to_string(),
            source,
        })?;
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|source| ClientError::Decode {
            method: method.to_string(),
            source,
        })
    }

    async fn call_unit<P: Serialize + ?Sized>(
        &mut self,
        method: &str,
        params: &P,
    ) -> Result<(), ClientError> {
        let _: Value = self.call_typed(method, params).await?;
        Ok(())
    }

    pub async fn assert_is_assembly(&mut self) -> Result<(), ClientError> {
        self.call_unit("do_assert_is_assembly", &NoParams {}).await
    }

    pub async fn backup_new(&mut self) -> Result<BackupEntry, ClientError> {
        self.call_typed("do_backup_new", &NoParams {}).await
    }

    pub async fn backup_ls(&mut self) -> Result<Vec<BackupEntry>, ClientError> {
        self.call_typed("do_backup_ls", &NoParams {}).await
    }

    pub async fn backup_du(&mut self) -> Result<Vec<BackupUsage>, ClientError> {
        self.call_typed("do_backup_du", &NoParams {}).await
    }

    pub async fn backup_rm(&mut self, id: u64) -> Result<(), ClientError> {
        self.call_unit("do_backup_rm", &BackupIdParams { id }).await
    }

    pub async fn check_init(&mut self) -> Result<CheckInit, ClientError> {
        self.call_typed("do_check_init", &NoParams {}).await
    }

    pub async fn clean(&mut self, params: &CleanParams) -> Result<(), ClientError> {
        self.call_unit("do_clean", params).await
    }

    pub async fn deploy_reset_check(&mut self) -> Result<(), ClientError> {
        self.call_unit("do_deploy_reset_check", &NoParams {}).await
    }

    /// Returns the recipe text.
    pub async fn deploy_read_new_recipe(
        &mut self,
        params: &ReadNewRecipeParams,
    ) -> Result<String, ClientError> {
        self.call_typed("do_deploy_read_new_recipe", params).await
    }

    pub async fn deploy_finalize(&mut self, params: &FinalizeParams) -> Result<(), ClientError> {
        self.call_unit("do_deploy_finalize", params).await
    }

    /// Raw `app/env.json`.
    pub async fn env(&mut self) -> Result<Value, ClientError> {
        self.call("do_env", Value::Object(Default::default())).await
    }

    pub async fn file_append(&mut self, params: &FileAppendParams) -> Result<(), ClientError> {
        self.call_unit("do_file_append", params).await
    }

    pub async fn init(&mut self) -> Result<(), ClientError> {
        self.call_unit("do_init", &NoParams {}).await
    }

    pub async fn lock_session(&mut self, params: &LockSessionParams) -> Result<(), ClientError> {
        self.call_unit("do_lock_session", params).await
    }

    pub async fn mkdir(&mut self, path: &str) -> Result<(), ClientError> {
        self.call_unit(
            "do_mkdir",
            &MkdirParams {
                path: path.to_string(),
            },
        )
        .await
    }

    pub async fn revert(&mut self, id: u64) -> Result<(), ClientError> {
        self.call_unit("do_revert", &BackupIdParams { id }).await
    }

    /// Runs `app/code/init` interactively; returns its exit code.
    pub async fn run(&mut self) -> Result<i32, ClientError> {
        self.call_typed("do_run", &NoParams {}).await
    }

    pub async fn status(&mut self) -> Result<StatusReport, ClientError> {
        self.call_typed("do_status", &NoParams {}).await
    }

    pub async fn symlink(&mut self, params: &SymlinkParams) -> Result<(), ClientError> {
        self.call_unit("do_symlink", params).await
    }

    pub async fn sync(&mut self) -> Result<(), ClientError> {
        self.call_unit("do_sync", &NoParams {}).await
    }

    pub async fn version(&mut self) -> Result<String, ClientError> {
        self.call_typed("do_version", &NoParams {}).await
    }
}
