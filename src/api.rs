//! Group / project listing API
//!
//! The walker only ever needs three endpoints:
//!
//! - `GET /groups/{id}` for group metadata
//! - `GET /groups/{id}/projects?page&per_page`
//! - `GET /groups/{id}/subgroups?page&per_page`
//!
//! Access goes through the [`ApiTransport`] trait so traversal logic can be
//! exercised against an in-memory tree. [`HttpTransport`] is the real
//! implementation on top of `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, Transport};
use crate::error::ApiError;

const API_PREFIX: &str = "/api/v4";

/// Stable repository identity, independent of which listing surfaced it.
///
/// GitLab hands out numeric ids; manually entered repositories use their path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RepoId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RepoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(deserialize_id(deserializer)?))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// A node in the remote namespace
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Group {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    /// Path segment, used as the local directory name
    #[serde(alias = "path")]
    pub slug: String,
}

/// A subgroup listing item; only the identity is needed to recurse.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GroupRef {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A project listing item
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub id: RepoId,
    pub name: String,
    /// Path segment, when the API provides one
    #[serde(default)]
    pub path: Option<String>,
    #[serde(alias = "ssh_url_to_repo")]
    pub ssh_url: String,
    #[serde(alias = "http_url_to_repo")]
    pub http_url: String,
    #[serde(default)]
    pub archived: bool,
}

impl Repository {
    /// Directory name inside the owning group's directory
    pub fn local_name(&self) -> &str {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.name)
    }

    /// Clone URL for the configured transport
    pub fn url_for(&self, transport: Transport) -> &str {
        match transport {
            Transport::Ssh => &self.ssh_url,
            Transport::Https => &self.http_url,
        }
    }
}

/// Raw access to the listing API.
///
/// Implementations return the decoded JSON body, or an [`ApiError`] when the
/// endpoint cannot be reached or answers with an error object.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError>;
}

/// Endpoint for a single group's metadata
pub fn group_endpoint(group_id: &str) -> String {
    format!("/groups/{}", encode_group_id(group_id))
}

/// Endpoint listing a group's direct projects
pub fn projects_endpoint(group_id: &str) -> String {
    format!("/groups/{}/projects", encode_group_id(group_id))
}

/// Endpoint listing a group's direct subgroups
pub fn subgroups_endpoint(group_id: &str) -> String {
    format!("/groups/{}/subgroups", encode_group_id(group_id))
}

/// Full paths like `org/team` go in a single URL segment.
fn encode_group_id(group_id: &str) -> String {
    group_id.replace('/', "%2F")
}

/// Turn an error object into an [`ApiError`]; pass anything else through.
///
/// Both `{"message": ...}` and `{"error": ...}` count as errors.
pub fn check_error_payload(value: Value) -> Result<Value, ApiError> {
    if let Value::Object(map) = &value {
        for key in ["message", "error"] {
            if let Some(detail) = map.get(key) {
                let message = match detail {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(ApiError::new(message));
            }
        }
    }
    Ok(value)
}

/// Instance root for a configured base URL: trimmed, without trailing `/`
/// or `/api/v4` suffix.
pub fn instance_url(base_url: &str) -> &str {
    let base_url = base_url.trim().trim_end_matches('/');
    base_url
        .strip_suffix(API_PREFIX)
        .unwrap_or(base_url)
        .trim_end_matches('/')
}

/// Look up a group's metadata
pub async fn fetch_group(api: &dyn ApiTransport, group_id: &str) -> Result<Group, ApiError> {
    let value = api.get(&group_endpoint(group_id), &[]).await?;
    let value = check_error_payload(value)?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::new(format!("unexpected group payload for {}: {}", group_id, e)))
}

/// HTTP implementation of [`ApiTransport`]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the instance at `base_url` (without `/api/v4`).
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("groupsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: instance_url(base_url).to_string(),
            token,
        })
    }

    /// Build from configuration
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.gitlab.base_url,
            config.token().map(str::to_string),
            Duration::from_secs(config.gitlab.request_timeout),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Value>(&body) {
            // Error objects are surfaced by the caller's payload check.
            Ok(value) if status.is_success() || value.is_object() => Ok(value),
            Err(e) if status.is_success() => {
                Err(ApiError::new(format!("invalid JSON from {}: {}", path, e)))
            }
            _ => Err(ApiError::new(format!("{} returned HTTP {}", path, status))),
        }
    }
}
