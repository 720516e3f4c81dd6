use anyhow::{Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Main configuration structure for groupsync
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote group/project API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitLabConfig {
    /// Instance base URL, e.g. "https://gitlab.com"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Access token, passed through opaquely. Usually supplied via GITLAB_TOKEN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Root group id or full path to mirror
    pub root_group: Option<String>,

    /// Page size for listing requests
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Timeout for a single API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Clone URL flavour, chosen once for the whole run
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    Https,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Root directory the group tree is mirrored into
    #[serde(default = "default_output_directory")]
    pub output_directory: String,

    /// Clone over SSH or HTTPS
    #[serde(default)]
    pub transport: Transport,

    /// Repositories synced concurrently within one group
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for a single git clone/pull in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Pass --ff-only to git pull
    #[serde(default)]
    pub fast_forward_only: bool,

    /// Also clone and pull archived repositories
    #[serde(default)]
    pub include_archived: bool,

    /// Repository exclusion patterns ("*" wildcard)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Values supplied on the command line or via environment, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub root_group: Option<String>,
    pub output_directory: Option<String>,
    pub transport: Option<Transport>,
    pub max_parallel: Option<usize>,
}

// Default value functions
fn default_base_url() -> String {
    "https://gitlab.com".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_request_timeout() -> u64 {
    30
}
fn default_output_directory() -> String {
    ".".to_string()
}
fn default_max_parallel() -> usize {
    1
}
fn default_timeout() -> u64 {
    600
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            root_group: None,
            per_page: default_per_page(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            transport: Transport::default(),
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            fast_forward_only: false,
            include_archived: false,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults.
    ///
    /// Unlike [`Config::load`] a missing file is not an error and nothing is written.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("groupsync").join("config.yml"))
    }

    /// Expand `~` and environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.sync.output_directory = shellexpand::full(&self.sync.output_directory)
            .context("Failed to expand output_directory path")?
            .into_owned();

        Ok(())
    }

    /// Apply command line / environment overrides on top of file values
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(base_url) = overrides.base_url {
            self.gitlab.base_url = base_url;
        }
        if let Some(token) = overrides.token {
            self.gitlab.token = Some(token);
        }
        if let Some(group) = overrides.root_group {
            self.gitlab.root_group = Some(group);
        }
        if let Some(output) = overrides.output_directory {
            self.sync.output_directory = output;
        }
        if let Some(transport) = overrides.transport {
            self.sync.transport = transport;
        }
        if let Some(max_parallel) = overrides.max_parallel {
            self.sync.max_parallel = max_parallel;
        }

        self.expand_paths()
    }

    /// Check the settings every mode needs. Discovery additionally needs
    /// a token and a root group.
    pub fn validate(&self, discovery: bool) -> Result<(), ConfigError> {
        let base_url = self.gitlab.base_url.trim();
        match reqwest::Url::parse(base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::InvalidBaseUrl(base_url.to_string())),
        }

        if !(1..=100).contains(&self.gitlab.per_page) {
            return Err(ConfigError::InvalidPageSize(self.gitlab.per_page));
        }

        if discovery {
            if self.token().is_none() {
                return Err(ConfigError::MissingToken);
            }
            if self.root_group().is_none() {
                return Err(ConfigError::MissingRootGroup);
            }
        }

        Ok(())
    }

    /// Non-empty API token, if configured
    pub fn token(&self) -> Option<&str> {
        self.gitlab
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Non-empty root group, if configured
    pub fn root_group(&self) -> Option<&str> {
        self.gitlab
            .root_group
            .as_deref()
            .map(|g| g.trim().trim_matches('/'))
            .filter(|g| !g.is_empty())
    }

    /// Normalized output root
    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(&self.sync.output_directory).clean()
    }

    /// Host part of the base URL, used to synthesize SSH URLs
    pub fn host(&self) -> String {
        reqwest::Url::parse(self.gitlab.base_url.trim())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| {
                self.gitlab
                    .base_url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn discovery_config() -> Config {
        let mut config = Config::default();
        config.gitlab.token = Some("glpat-test".to_string());
        config.gitlab.root_group = Some("org".to_string());
        config
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.gitlab.base_url, "https://gitlab.com");
        assert_eq!(config.gitlab.per_page, 100);
        assert_eq!(config.gitlab.request_timeout, 30);
        assert!(config.gitlab.token.is_none());
        assert_eq!(config.sync.transport, Transport::Ssh);
        assert_eq!(config.sync.max_parallel, 1);
        assert_eq!(config.sync.timeout, 600);
        assert!(!config.sync.include_archived);
        assert!(config.sync.exclude_patterns.is_empty());
    }

    #[test]
    fn test_validate_accepts_complete_discovery_config() {
        assert_eq!(discovery_config().validate(true), Ok(()));
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = discovery_config();
        config.gitlab.token = Some("   ".to_string());
        assert_eq!(config.validate(true), Err(ConfigError::MissingToken));

        // Manual mode never talks to the API.
        assert_eq!(config.validate(false), Ok(()));
    }

    #[test]
    fn test_validate_missing_root_group() {
        let mut config = discovery_config();
        config.gitlab.root_group = Some("/".to_string());
        assert_eq!(config.validate(true), Err(ConfigError::MissingRootGroup));
    }

    #[test]
    fn test_validate_base_url_and_page_size() {
        let mut config = discovery_config();
        config.gitlab.base_url = "ftp://gitlab.example.com".to_string();
        assert!(matches!(
            config.validate(true),
            Err(ConfigError::InvalidBaseUrl(_))
        ));

        let mut config = discovery_config();
        config.gitlab.per_page = 0;
        assert_eq!(config.validate(true), Err(ConfigError::InvalidPageSize(0)));
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut config = discovery_config();
        config
            .apply_overrides(Overrides {
                root_group: Some("other".to_string()),
                transport: Some(Transport::Https),
                output_directory: Some("/srv/mirror/./".to_string()),
                ..Default::default()
            })
            .expect("overrides apply");

        assert_eq!(config.root_group(), Some("other"));
        assert_eq!(config.sync.transport, Transport::Https);
        assert_eq!(config.output_root(), PathBuf::from("/srv/mirror"));
        assert_eq!(config.token(), Some("glpat-test"));
    }

    #[test]
    fn test_host_from_base_url() {
        let mut config = Config::default();
        config.gitlab.base_url = "https://git.example.com:8443/".to_string();
        assert_eq!(config.host(), "git.example.com");
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        env::set_var("TEST_GROUPSYNC_HOME", "/test/home");

        let mut config = Config::default();
        config.sync.output_directory = "${TEST_GROUPSYNC_HOME}/mirror".to_string();
        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.sync.output_directory, "/test/home/mirror");

        env::remove_var("TEST_GROUPSYNC_HOME");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialize_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = discovery_config();
        config.sync.output_directory = "/custom/path".to_string();
        config.sync.exclude_patterns = vec!["*-archive".to_string()];
        let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
        std::fs::write(&config_path, yaml).expect("Failed to write config");

        let loaded = Config::load(&config_path).expect("Failed to load config");
        assert_eq!(loaded.sync.output_directory, "/custom/path");
        assert_eq!(loaded.root_group(), Some("org"));
        assert_eq!(loaded.sync.exclude_patterns, vec!["*-archive".to_string()]);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
gitlab:
  base_url: "https://gitlab.example.com"
  root_group: "platform/backend"
  per_page: 50
sync:
  output_directory: "/tmp/mirror"
  transport: https
  max_parallel: 4
  fast_forward_only: true
  include_archived: true
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.gitlab.base_url, "https://gitlab.example.com");
        assert_eq!(config.root_group(), Some("platform/backend"));
        assert_eq!(config.gitlab.per_page, 50);
        assert_eq!(config.sync.transport, Transport::Https);
        assert_eq!(config.sync.max_parallel, 4);
        assert!(config.sync.fast_forward_only);
        assert!(config.sync.include_archived);
        assert_eq!(config.sync.timeout, 600);
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("groupsync"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }
}
