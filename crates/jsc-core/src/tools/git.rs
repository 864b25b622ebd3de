//! Git wrapper for `gd` statements and VCS deploys.

use std::path::Path;

use tracing::{debug, info};

use crate::server::HandlerError;

use super::{ToolOutput, run_captured};

/// How to clone.
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// Truncate history to this many commits.
    pub depth: Option<u32>,
    pub branch: Option<String>,
    /// Private key for ssh remotes.
    pub pkey: Option<String>,
}

/// What ended up checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub commit: String,
    /// Symbolic ref, `None` when HEAD is detached.
    pub reference: Option<String>,
}

async fn git(
    program: &str,
    args: &[&str],
    env: &[(&str, String)],
) -> Result<ToolOutput, HandlerError> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    run_captured(program, &args, None, env).await
}

fn failed(what: &str, output: &ToolOutput) -> HandlerError {
    HandlerError::recipe(format!(
        "git {what} failed with status {}: {}",
        output.status,
        output.failure_text()
    ))
}

/// Clone `url` into `dst` and report the resulting checkout.
pub async fn clone(
    program: &str,
    url: &str,
    dst: &Path,
    options: &CloneOptions,
) -> Result<Checkout, HandlerError> {
    let depth = options.depth.map(|d| d.to_string());
    let dst_str = dst.to_string_lossy();
    let mut args = vec!["clone", "--quiet"];
    if let Some(depth) = &depth {
        args.extend(["--depth", depth.as_str()]);
    }
    if let Some(branch) = &options.branch {
        args.extend(["--branch", branch.as_str()]);
    }
    args.extend(["--", url, &*dst_str]);

    let mut env = Vec::new();
    if let Some(key) = &options.pkey {
        env.push(("GIT_SSH_COMMAND", ssh_command(key)));
    }

    info!(%url, dst = %dst.display(), "cloning");
    let output = git(program, &args, &env).await?;
    if !output.success() {
        return Err(failed("clone", &output));
    }
    head(program, dst).await
}

/// `GIT_SSH_COMMAND` using only the given private key. Git hands the value
/// to a shell, so the path is single-quoted.
fn ssh_command(key: &str) -> String {
    let quoted = key.replace('\'', r"'\''");
    format!("ssh -i '{quoted}' -o IdentitiesOnly=yes")
}

/// Commit and symbolic ref of HEAD in `repo`.
pub async fn head(program: &str, repo: &Path) -> Result<Checkout, HandlerError> {
    let repo = repo.to_string_lossy();
    let rev = git(program, &["-C", &*repo, "rev-parse", "HEAD"], &[]).await?;
    if !rev.success() {
        return Err(failed("rev-parse", &rev));
    }
    let symbolic = git(program, &["-C", &*repo, "symbolic-ref", "-q", "HEAD"], &[]).await?;
    let reference = symbolic
        .success()
        .then(|| symbolic.stdout.trim().to_string())
        .filter(|r| !r.is_empty());
    Ok(Checkout {
        commit: rev.stdout.trim().to_string(),
        reference,
    })
}

/// Check out the highest purely numeric tag (`1.2.10` beats `1.2.9`), if
/// any. Returns the new checkout, or `None` when no such tag exists.
pub async fn checkout_latest_tag(
    program: &str,
    repo: &Path,
) -> Result<Option<Checkout>, HandlerError> {
    let repo_str = repo.to_string_lossy();
    let fetch = git(program, &["-C", &*repo_str, "fetch", "--quiet", "--tags"], &[]).await?;
    if !fetch.success() {
        debug!(output = fetch.failure_text(), "fetching tags failed");
    }
    let refs = git(program, &["-C", &*repo_str, "show-ref", "--tags"], &[]).await?;
    let Some(tag) = latest_version_tag(&refs.stdout) else {
        return Ok(None);
    };

    let checkout = git(program, &["-C", &*repo_str, "checkout", "--quiet", tag.as_str()], &[]).await?;
    if !checkout.success() {
        return Err(failed("checkout", &checkout));
    }
    let current = head(program, repo).await?;
    info!(%tag, commit = %current.commit, "checked out latest version tag");
    Ok(Some(Checkout {
        commit: current.commit,
        reference: Some(format!("refs/tags/{tag}")),
    }))
}

/// Highest tag made only of digits and dots in `git show-ref --tags` output.
pub fn latest_version_tag(show_ref: &str) -> Option<String> {
    show_ref
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|r| r.strip_prefix("refs/tags/"))
        .filter(|tag| {
            tag.starts_with(|c: char| c.is_ascii_digit())
                && tag.chars().all(|c| c.is_ascii_digit() || c == '.')
        })
        .max_by_key(|tag| version_key(tag))
        .map(str::to_string)
}

fn version_key(tag: &str) -> Vec<u64> {
    tag.split('.').map(|part| part.parse().unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_latest_version_tag() {
        let refs = "\
            1111 refs/tags/1.2.9\n\
            2222 refs/tags/1.2.10\n\
            3333 refs/tags/v2.0.0\n\
            4444 refs/tags/1.3-rc1\n\
            5555 refs/tags/0.9\n";
        assert_eq!(latest_version_tag(refs), Some("1.2.10".to_string()));
    }

    #[test]
    fn test_ssh_command_quotes_key_path() {
        assert_eq!(
            ssh_command("/keys/deploy"),
            "ssh -i '/keys/deploy' -o IdentitiesOnly=yes"
        );
        assert_eq!(
            ssh_command("/keys/it's mine"),
            r"ssh -i '/keys/it'\''s mine' -o IdentitiesOnly=yes"
        );
    }

    #[test]
    fn test_no_numeric_tags() {
        assert_eq!(latest_version_tag(""), None);
        assert_eq!(latest_version_tag("1111 refs/tags/release\n"), None);
    }

    #[test]
    fn test_version_key_orders_numerically() {
        assert!(version_key("10.0") > version_key("9.9.9"));
        assert!(version_key("1.2.10") > version_key("1.2.9"));
    }
}
