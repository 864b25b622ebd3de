//! Backup create, list, usage, delete and restore over the wire.

mod common;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use jsc_core::api::CleanParams;
use jsc_core::assembly::RecipeDir;
use jsc_core::deploy;
use jsc_core::protocol::ErrorCode;
use jsc_test_utils::TestAssembly;

use common::{open_session, write_recipe};

fn code_of(err: &jsc_core::ClientError) -> i64 {
    err.rpc_error().map(|e| e.code).unwrap_or_default()
}

#[test_log::test(tokio::test)]
async fn test_backup_of_clean_workspace_is_refused() {
    let assembly = TestAssembly::new();
    let (mut client, _) = open_session(&assembly).await;

    let err = client.backup_new().await.unwrap_err();
    assert_eq!(code_of(&err), ErrorCode::BackupIsClean.code());
    assert!(client.backup_ls().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_ids_are_never_reused() {
    let assembly = TestAssembly::new();
    assembly.write_code("index.html", "v1");
    let (mut client, sink) = open_session(&assembly).await;

    let first = client.backup_new().await.unwrap();
    let second = client.backup_new().await.unwrap();
    assert_eq!((first.id, second.id), (1, 2));
    assert_eq!(first.zone, "UTC");
    assert_eq!(first.recipe_name, "<none>");
    assert!(sink.stdout_text().contains("Creating backup 1"));

    client.backup_rm(2).await.unwrap();
    let third = client.backup_new().await.unwrap();
    assert_eq!(third.id, 3);

    let ids: Vec<u64> = client.backup_ls().await.unwrap().iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![1, 3]);

    let err = client.backup_rm(2).await.unwrap_err();
    assert_eq!(code_of(&err), ErrorCode::BackupInvalidId.code());
}

#[test_log::test(tokio::test)]
async fn test_backup_usage() {
    let assembly = TestAssembly::new();
    assembly.write_code("data.bin", &"x".repeat(10_000));
    let (mut client, _) = open_session(&assembly).await;
    client.backup_new().await.unwrap();

    let usage = client.backup_du().await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].entry.id, 1);
    assert!(usage[0].raw_size >= 10_000);
    assert!(usage[0].size > 0);
    assert!(usage[0].size < usage[0].raw_size);
}

#[test_log::test(tokio::test)]
async fn test_revert_restores_files_and_recipe() {
    let assembly = TestAssembly::new();
    let recipe = TempDir::new().unwrap();
    write_recipe(
        recipe.path(),
        "name demo\npackage nginx\nput /app/code/index.html 'hello'\n",
        &[],
    );
    let (mut client, sink) = open_session(&assembly).await;
    deploy::deploy(&mut client, &recipe.path().to_string_lossy(), false)
        .await
        .unwrap();

    let backup = client.backup_new().await.unwrap();
    assert_eq!(backup.recipe_name, "demo");

    let err = client.revert(backup.id).await.unwrap_err();
    assert_eq!(code_of(&err), ErrorCode::RevertNotClean.code());

    client.clean(&CleanParams::default()).await.unwrap();
    assert!(!assembly.code_path("index.html").exists());
    assert_eq!(client.status().await.unwrap().recipe_name, "<none>");

    let err = client.revert(99).await.unwrap_err();
    assert_eq!(code_of(&err), ErrorCode::RevertInvalidId.code());

    client.revert(backup.id).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(assembly.code_path("index.html")).unwrap(),
        "hello"
    );
    let status = client.status().await.unwrap();
    assert_eq!(status.recipe_name, "<none>", "nothing is committed by a revert");
    assert!(!status.is_synced);
    assert_eq!(status.total_backups, 1);

    let pending = RecipeDir::new(assembly.layout().new_recipe_dir());
    assert!(pending.exists());
    assert_eq!(pending.name(), "demo");
    assert!(!assembly.layout().recipe_dir().exists());
    assert!(sink.stdout_text().contains("Restaging recipe"));
}
