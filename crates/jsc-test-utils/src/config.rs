//! Configuration builders for tests.

use std::path::Path;

use jsc_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .assembly_root(tmp.path())
///     .package_manager(&["sh", "-c", "exit 0", "pm"])
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn assembly_root(mut self, root: &Path) -> Self {
        self.config.assembly.root = root.to_path_buf();
        self
    }

    pub fn package_manager(mut self, command: &[&str]) -> Self {
        self.config.tools.package_manager = command.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn git(mut self, program: &str) -> Self {
        self.config.tools.git = program.to_string();
        self
    }

    pub fn shell(mut self, program: &str) -> Self {
        self.config.tools.shell = program.to_string();
        self
    }

    pub fn ssh_host(mut self, host: &str) -> Self {
        self.config.ssh.host = host.to_string();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
