//! Preflight checks for `groupsync doctor`
//!
//! Verifies the git client, API access to the root group and the output
//! directory before a long mirror run.

use std::path::Path;

use crate::api::{fetch_group, ApiTransport};
use crate::Config;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Root group lookup through the API
    pub api: CheckResult,
    /// Output directory status
    pub output_dir: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config, api: &dyn ApiTransport) -> Self {
        Self {
            git: Self::check_git(),
            api: Self::check_api(config, api).await,
            output_dir: Self::check_output_dir(&config.output_root()),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, r)| r.passed)
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check git installation
    fn check_git() -> CheckResult {
        match std::process::Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Look up the root group
    async fn check_api(config: &Config, api: &dyn ApiTransport) -> CheckResult {
        if let Err(e) = config.validate(true) {
            return CheckResult::error_with_details("Configuration incomplete", e.to_string());
        }

        let Some(root) = config.root_group() else {
            return CheckResult::error("No root group configured");
        };

        match fetch_group(api, root).await {
            Ok(group) => CheckResult::ok_with_details(
                "Root group reachable",
                format!("{} ({}) at {}", group.name, group.id, config.gitlab.base_url),
            ),
            Err(e) => CheckResult::error_with_details(
                "Root group lookup failed",
                format!("{}\nCheck gitlab.base_url, the token and its read_api scope", e),
            ),
        }
    }

    /// Check the output directory exists and is writable
    fn check_output_dir(path: &Path) -> CheckResult {
        if !path.exists() {
            return CheckResult::warning_with_details(
                "Output directory does not exist yet",
                format!("It will be created: {}", path.display()),
            );
        }

        match tempfile::tempfile_in(path) {
            Ok(_) => CheckResult::ok_with_details(
                "Output directory writable",
                path.display().to_string(),
            ),
            Err(e) => CheckResult::error_with_details(
                "Output directory not writable",
                format!("{}: {}", path.display(), e),
            ),
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 3] {
        [
            ("Git Installation", &self.git),
            ("API Access", &self.api),
            ("Output Directory", &self.output_dir),
        ]
    }
}
