//! Launch resolution: turning deployment configuration into a concrete
//! command line, or refusing when the engine is not installed.

use crate::config::{DeployMode, EngineConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A fully resolved way to start the engine.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
}

/// The seam between the supervisor core and platform-specific launch logic.
///
/// `None` means "nothing to launch" and is treated as fatal until the
/// configuration changes; the supervisor never retries it on its own.
#[async_trait]
pub trait LaunchResolver: Send + Sync {
    async fn resolve(&self) -> Option<LaunchSpec>;
}

/// Resolver driven by [`EngineConfig`]: picks the development or production
/// command line, splits it shell-style and checks that a path-like
/// executable actually exists on disk.
pub struct ConfigResolver {
    engine: EngineConfig,
}

impl ConfigResolver {
    pub fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    fn command_line(&self) -> Option<&str> {
        match self.engine.mode {
            DeployMode::Development => self.engine.dev_command.as_deref(),
            DeployMode::Production => Some(&self.engine.command),
        }
    }
}

#[async_trait]
impl LaunchResolver for ConfigResolver {
    async fn resolve(&self) -> Option<LaunchSpec> {
        let Some(line) = self.command_line() else {
            warn!(mode = ?self.engine.mode, "No launch command configured");
            return None;
        };
        let words = match shell_words::split(line) {
            Ok(words) if !words.is_empty() => words,
            Ok(_) => {
                warn!("Empty launch command");
                return None;
            }
            Err(err) => {
                warn!(?err, "Invalid launch command");
                return None;
            }
        };

        let executable = Path::new(&words[0]);
        // Bare program names are left to PATH lookup at spawn time; anything
        // path-like must exist before we claim it is launchable.
        if executable.components().count() > 1 && !executable.exists() {
            warn!(executable = %executable.display(), "Engine executable missing");
            return None;
        }

        debug!(command = %words[0], "Resolved engine launch");
        Some(LaunchSpec {
            command: words[0].clone(),
            args: words[1..].to_vec(),
            working_directory: self.engine.working_directory.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(command: &str, dev: Option<&str>, mode: DeployMode) -> EngineConfig {
        EngineConfig {
            command: command.into(),
            dev_command: dev.map(Into::into),
            mode,
            working_directory: "/tmp".into(),
            port: 8765,
        }
    }

    #[tokio::test]
    async fn missing_executable_resolves_to_none() {
        let resolver = ConfigResolver::new(engine(
            "/definitely/not/here/engine --serve",
            None,
            DeployMode::Production,
        ));
        assert!(resolver.resolve().await.is_none());
    }

    #[tokio::test]
    async fn existing_executable_resolves_with_args() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let line = format!("{} --serve --port 8765", file.path().display());
        let resolver = ConfigResolver::new(engine(&line, None, DeployMode::Production));
        let spec = resolver.resolve().await.unwrap();
        assert_eq!(spec.command, file.path().display().to_string());
        assert_eq!(spec.args, vec!["--serve", "--port", "8765"]);
        assert_eq!(spec.working_directory, PathBuf::from("/tmp"));
    }

    #[tokio::test]
    async fn bare_program_names_are_trusted_to_path() {
        let resolver = ConfigResolver::new(engine("sleep 30", None, DeployMode::Production));
        let spec = resolver.resolve().await.unwrap();
        assert_eq!(spec.command, "sleep");
        assert_eq!(spec.args, vec!["30"]);
    }

    #[tokio::test]
    async fn development_mode_without_dev_command_is_none() {
        let resolver = ConfigResolver::new(engine("sleep 30", None, DeployMode::Development));
        assert!(resolver.resolve().await.is_none());
    }

    #[tokio::test]
    async fn development_mode_prefers_dev_command() {
        let resolver = ConfigResolver::new(engine(
            "/opt/engine/engine",
            Some("python3 main.py"),
            DeployMode::Development,
        ));
        let spec = resolver.resolve().await.unwrap();
        assert_eq!(spec.command, "python3");
        assert_eq!(spec.args, vec!["main.py"]);
    }
}
