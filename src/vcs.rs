use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::TransportError;

/// Directory whose presence marks a path as a git checkout
pub const VCS_MARKER: &str = ".git";

/// Whether `path` contains a version-control marker directory
pub fn has_vcs_marker(path: &Path) -> bool {
    path.join(VCS_MARKER).exists()
}

/// External version-control client.
///
/// Only the exit status matters; output is not parsed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Create a new checkout of `url` at `path`
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), TransportError>;

    /// Update the existing checkout at `path`
    async fn pull(&self, path: &Path) -> Result<(), TransportError>;
}

/// [`VersionControl`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
    fast_forward_only: bool,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
            fast_forward_only: false,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(Duration::from_secs(config.timeout)).fast_forward_only(config.fast_forward_only)
    }

    pub fn fast_forward_only(mut self, enabled: bool) -> Self {
        self.fast_forward_only = enabled;
        self
    }

    /// Use a different executable than `git` from PATH
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(
        &self,
        operation: &'static str,
        mut command: AsyncCommand,
    ) -> Result<std::process::Output, TransportError> {
        // A timed-out child must not linger once its future is dropped.
        command.kill_on_drop(true);

        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TransportError::Spawn(format!("{}: {}", self.program, e))),
            Err(_) => Err(TransportError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), TransportError> {
        info!("Cloning repository: {} -> {}", url, path.display());

        let mut command = AsyncCommand::new(&self.program);
        command.args(["clone", "--", url]).arg(path);

        let output = self.run("clone", command).await?;
        if !output.status.success() {
            return Err(TransportError::Clone(failure_detail(&output)));
        }

        debug!("Clone finished: {}", path.display());
        Ok(())
    }

    async fn pull(&self, path: &Path) -> Result<(), TransportError> {
        info!("Pulling repository: {}", path.display());

        let mut command = AsyncCommand::new(&self.program);
        command.arg("pull");
        if self.fast_forward_only {
            command.arg("--ff-only");
        }
        command.current_dir(path);

        let output = self.run("pull", command).await?;
        if !output.status.success() {
            return Err(TransportError::Pull(failure_detail(&output)));
        }

        debug!("Pull finished: {}", path.display());
        Ok(())
    }
}

/// Last stderr line, or the exit status when git printed nothing
fn failure_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| output.status.to_string())
}
