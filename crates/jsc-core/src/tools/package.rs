//! Package manager wrapper for the `package` statement.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{info, warn};

use jsc_config::ToolsConfig;

use crate::server::HandlerError;

use super::run_captured;

/// Install `packages`; returns name → version of those the package manager
/// reports as installed.
pub async fn install(
    tools: &ToolsConfig,
    packages: &[String],
) -> Result<BTreeMap<String, String>, HandlerError> {
    let Some((program, prefix)) = tools.package_manager.split_first() else {
        return Err(HandlerError::Internal(
            "no package manager configured".to_string(),
        ));
    };
    let mut args = prefix.to_vec();
    args.extend(packages.iter().cloned());

    let output = run_captured(program, &args, None, &[]).await?;
    if !output.success() {
        return Err(HandlerError::recipe(format!(
            "package manager exited with status {}: {}",
            output.status,
            output.failure_text()
        )));
    }

    let versions = parse_installed(&output.stdout, packages)?;
    for name in packages {
        match versions.get(name) {
            Some(version) => info!(package = %name, %version, "package installed"),
            None => warn!(package = %name, "package manager did not report a version"),
        }
    }
    Ok(versions)
}

/// Pick the versions of `requested` out of a `Packages (N) name-ver-rel ...`
/// line. Dependencies pulled in alongside are ignored.
pub fn parse_installed(
    output: &str,
    requested: &[String],
) -> Result<BTreeMap<String, String>, HandlerError> {
    let pattern = Regex::new(r"^\s*Packages \((\d+)\)\s+(.*)$")
        .map_err(|e| HandlerError::Internal(format!("package line pattern: {e}")))?;

    let mut versions = BTreeMap::new();
    for line in output.lines() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        let count: usize = caps[1].parse().unwrap_or(0);
        for token in caps[2].split_whitespace().take(count) {
            let (name, version) = split_package(token);
            if requested.iter().any(|r| r == name) {
                versions.insert(name.to_string(), version.to_string());
            }
        }
    }
    Ok(versions)
}

/// `"php-fpm-7.0.2-1"` → `("php-fpm", "7.0.2-1")`.
fn split_package(token: &str) -> (&str, &str) {
    let mut parts = token.rsplitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_rel), Some(_ver), Some(name)) => (name, &token[name.len() + 1..]),
        _ => token.split_once('-').unwrap_or((token, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("nginx-1.9.9-1"), ("nginx", "1.9.9-1"));
        assert_eq!(split_package("php-fpm-7.0.2-1"), ("php-fpm", "7.0.2-1"));
        assert_eq!(split_package("odd-1"), ("odd", "1"));
        assert_eq!(split_package("plain"), ("plain", ""));
    }

    #[test]
    fn test_parse_installed() {
        let output = "resolving dependencies...\n\
                      Packages (3) geoip-1.6.9-1  nginx-1.9.9-1  php-fpm-7.0.2-1\n\
                      \n\
                      Total Installed Size:  5.00 MiB\n";
        let versions = parse_installed(output, &names(&["nginx", "php-fpm"])).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions["nginx"], "1.9.9-1");
        assert_eq!(versions["php-fpm"], "7.0.2-1");
    }

    #[test]
    fn test_parse_without_package_line() {
        let versions = parse_installed("there is nothing to do\n", &names(&["nginx"])).unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn test_install_with_scripted_manager() {
        let tools = ToolsConfig {
            package_manager: names(&["sh", "-c", "echo \"Packages (1) $1-1.9.9-1\"", "pm"]),
            ..Default::default()
        };
        let versions = install(&tools, &names(&["nginx"])).await.unwrap();
        assert_eq!(versions["nginx"], "1.9.9-1");
    }

    #[tokio::test]
    async fn test_install_failure_is_recipe_error() {
        let tools = ToolsConfig {
            package_manager: names(&["sh", "-c", "echo 'target not found' >&2; exit 1", "pm"]),
            ..Default::default()
        };
        let err = install(&tools, &names(&["nope"])).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "package manager exited with status 1: target not found"
        );
    }
}
