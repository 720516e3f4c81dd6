//! Common test utilities and helpers for groupsync tests
#![allow(dead_code)]

use async_trait::async_trait;
use groupsync::{ApiError, ApiTransport, TransportError, VersionControl};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Test configuration helper
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub original_env: Vec<(String, Option<String>)>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("groupsync");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        // Store original environment variables
        let env_vars = [
            "GITLAB_TOKEN",
            "GITLAB_URL",
            "GITLAB_GROUP",
            "XDG_CONFIG_HOME",
        ];
        let original_env = env_vars
            .iter()
            .map(|var| (var.to_string(), env::var(var).ok()))
            .collect();

        Self {
            temp_dir,
            config_dir,
            original_env,
        }
    }

    pub fn set_config_dir(&self) {
        env::set_var("XDG_CONFIG_HOME", self.temp_dir.path());
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.config_dir.join("config.yml");
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("mirror")
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        // Restore original environment variables
        for (key, value) in &self.original_env {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

/// In-memory group tree served through [`ApiTransport`].
///
/// Listings honor `page`/`per_page` the way the real API does, and any
/// endpoint can be made to answer with an error object instead.
#[derive(Default)]
pub struct FakeApi {
    groups: HashMap<String, Value>,
    projects: HashMap<String, Vec<Value>>,
    subgroups: HashMap<String, Vec<Value>>,
    failures: HashMap<String, Value>,
    requests: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, id: u64, name: &str, slug: &str) -> Self {
        self.groups.insert(
            id.to_string(),
            json!({ "id": id, "name": name, "path": slug, "full_path": slug }),
        );
        self
    }

    /// Register `child` as a subgroup of `parent`, in call order
    pub fn subgroup(mut self, parent: u64, child: u64) -> Self {
        self.subgroups
            .entry(parent.to_string())
            .or_default()
            .push(json!({ "id": child }));
        self
    }

    pub fn project(self, group: u64, id: u64, name: &str) -> Self {
        self.project_with(group, id, name, false)
    }

    pub fn archived_project(self, group: u64, id: u64, name: &str) -> Self {
        self.project_with(group, id, name, true)
    }

    fn project_with(mut self, group: u64, id: u64, name: &str, archived: bool) -> Self {
        self.projects
            .entry(group.to_string())
            .or_default()
            .push(json!({
                "id": id,
                "name": name,
                "path": name,
                "ssh_url_to_repo": format!("git@gitlab.test:{}.git", name),
                "http_url_to_repo": format!("https://gitlab.test/{}.git", name),
                "archived": archived,
            }));
        self
    }

    /// Answer `endpoint` with `{"message": ...}`
    pub fn fail(mut self, endpoint: &str, message: &str) -> Self {
        self.failures
            .insert(endpoint.to_string(), json!({ "message": message }));
        self
    }

    /// Requests made so far, as `endpoint` or `endpoint?page=N`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, endpoint: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.split('?').next() == Some(endpoint))
            .count()
    }
}

#[async_trait]
impl ApiTransport for FakeApi {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let param = |key: &str| {
            query
                .iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v.parse::<usize>().ok())
        };
        let page = param("page");
        let per_page = param("per_page").unwrap_or(100);

        self.requests.lock().unwrap().push(match page {
            Some(page) => format!("{}?page={}", path, page),
            None => path.to_string(),
        });

        if let Some(error) = self.failures.get(path) {
            return Ok(error.clone());
        }

        let rest = path
            .strip_prefix("/groups/")
            .ok_or_else(|| ApiError::new(format!("unknown endpoint {}", path)))?;
        let mut parts = rest.splitn(2, '/');
        let id = parts.next().unwrap_or_default().replace("%2F", "/");

        let listing = match parts.next() {
            None => {
                return Ok(self
                    .groups
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| json!({ "message": "404 Group Not Found" })))
            }
            Some("projects") => self.projects.get(&id),
            Some("subgroups") => self.subgroups.get(&id),
            Some(other) => return Err(ApiError::new(format!("unknown listing {}", other))),
        };

        let items = listing.cloned().unwrap_or_default();
        let start = (page.unwrap_or(1) - 1) * per_page;
        let batch: Vec<Value> = items.into_iter().skip(start).take(per_page).collect();
        Ok(Value::Array(batch))
    }
}

/// A version-control call seen by [`FakeGit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Clone { url: String, path: PathBuf },
    Pull { path: PathBuf },
}

/// Recording [`VersionControl`] that fakes a checkout by creating `.git`
#[derive(Default)]
pub struct FakeGit {
    calls: Mutex<Vec<GitCall>>,
    failing_urls: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_clone(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    /// Hold every call for `delay` so overlapping calls can be observed
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clone_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GitCall::Clone { .. }))
            .count()
    }

    pub fn pull_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GitCall::Pull { .. }))
            .count()
    }

    /// Highest number of calls that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: GitCall) {
        self.calls.lock().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionControl for FakeGit {
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<(), TransportError> {
        self.enter(GitCall::Clone {
            url: url.to_string(),
            path: path.to_path_buf(),
        })
        .await;

        if self.failing_urls.contains(url) {
            return Err(TransportError::Clone(format!(
                "fatal: could not read from remote repository {}",
                url
            )));
        }

        std::fs::create_dir_all(path.join(".git"))
            .map_err(|e| TransportError::Clone(e.to_string()))
    }

    async fn pull(&self, path: &Path) -> Result<(), TransportError> {
        self.enter(GitCall::Pull {
            path: path.to_path_buf(),
        })
        .await;
        Ok(())
    }
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
