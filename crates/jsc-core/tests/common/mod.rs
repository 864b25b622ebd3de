//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jsc_core::Client;
use jsc_core::api::LockSessionParams;
use jsc_core::rpc::MemorySink;
use jsc_test_utils::{LocalTransport, TestAssembly};

pub fn holder(hostname: &str) -> LockSessionParams {
    LockSessionParams {
        hostname: hostname.to_string(),
        unix_epoch: 1_700_000_000,
    }
}

/// A client that went through the usual session start.
pub async fn open_session(assembly: &TestAssembly) -> (Client, Arc<MemorySink>) {
    let (mut client, sink) = LocalTransport::client(assembly.config());
    client.assert_is_assembly().await.unwrap();
    client.lock_session(&holder("test-host")).await.unwrap();
    if client.check_init().await.unwrap().needs_init {
        client.init().await.unwrap();
    }
    (client, sink)
}

/// Write a recipe directory with the given script and extra files.
pub fn write_recipe(dir: &Path, script: &str, files: &[(&str, &str)]) {
    std::fs::write(dir.join("Jumpstart-Recipe"), script).unwrap();
    write_recipe_files(dir, files);
}

/// Run git in `dir` with a throwaway identity; returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args([
            "-c",
            "user.name=Test Operator",
            "-c",
            "user.email=ops@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// One commit of a fixture repository: files to write, then an optional
/// lightweight tag.
pub struct Commit<'a> {
    pub files: &'a [(&'a str, &'a str)],
    pub tag: Option<&'a str>,
}

/// Build `<parent>/<name>.git`, a bare repository whose `main` branch holds
/// `history` in order.
pub fn bare_repo(parent: &Path, name: &str, history: &[Commit<'_>]) -> PathBuf {
    let work = parent.join(format!("{name}-work"));
    std::fs::create_dir_all(&work).unwrap();
    git(&work, &["init", "--quiet"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    for (n, commit) in history.iter().enumerate() {
        write_recipe_files(&work, commit.files);
        git(&work, &["add", "--all"]);
        git(&work, &["commit", "--quiet", "-m", &format!("commit {n}")]);
        if let Some(tag) = commit.tag {
            git(&work, &["tag", tag]);
        }
    }
    let bare = parent.join(format!("{name}.git"));
    git(
        parent,
        &["clone", "--quiet", "--bare", &*work.to_string_lossy(), &*bare.to_string_lossy()],
    );
    bare
}

fn write_recipe_files(dir: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}
