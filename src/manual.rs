//! Manual entry
//!
//! Bypasses discovery: user-supplied repository paths such as
//! `org/team/svc` become [`Repository`] descriptors with synthesized clone
//! URLs and go through the same [`Synchronizer`] as discovered ones.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

use crate::api::{instance_url, RepoId, Repository};
use crate::sync::{is_safe_component, Synchronizer};
use crate::walker::RunReport;

/// A user-supplied repository path, split into its owning groups and name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualEntry {
    pub groups: Vec<String>,
    pub repository: Repository,
}

impl ManualEntry {
    /// Full `group/.../name` path
    pub fn full_path(&self) -> String {
        self.repository.id.to_string()
    }

    /// Directory the repository's group mirrors to below `root`
    pub fn target_dir(&self, root: &Path) -> PathBuf {
        target_dir(root, &self.groups)
    }
}

/// Join the group segments of a repository path onto the output root
pub fn target_dir(root: &Path, groups: &[String]) -> PathBuf {
    groups.iter().fold(root.to_path_buf(), |dir, segment| dir.join(segment))
}

/// Parse one `group/sub/repo` path.
///
/// Accepts an optional leading `/` and trailing `.git`. Returns `None` for
/// input without a group or with segments that are unsafe as directory names.
pub fn parse_entry(input: &str, host: &str, base_url: &str) -> Option<ManualEntry> {
    let trimmed = input.trim().trim_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let segments: Vec<&str> = trimmed.split('/').map(str::trim).collect();
    if segments.len() < 2 || !segments.iter().all(|s| is_safe_component(s)) {
        return None;
    }

    let full_path = segments.join("/");
    let (name, groups) = segments.split_last()?;

    let repository = Repository {
        id: RepoId::new(full_path.clone()),
        name: name.to_string(),
        path: Some(name.to_string()),
        ssh_url: format!("git@{}:{}.git", host, full_path),
        http_url: format!("{}/{}.git", instance_url(base_url), full_path),
        archived: false,
    };

    Some(ManualEntry {
        groups: groups.iter().map(|g| g.to_string()).collect(),
        repository,
    })
}

/// Parse every non-blank, non-comment line. Invalid entries are returned
/// separately so they can be reported.
pub fn repositories_from_paths<I, S>(
    inputs: I,
    host: &str,
    base_url: &str,
) -> (Vec<ManualEntry>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut entries = Vec::new();
    let mut rejected = Vec::new();

    for input in inputs {
        let input = input.as_ref().trim();
        if input.is_empty() || input.starts_with('#') {
            continue;
        }

        match parse_entry(input, host, base_url) {
            Some(entry) => {
                debug!("Manual entry {} -> {:?}", entry.full_path(), entry.groups);
                entries.push(entry);
            }
            None => rejected.push(input.to_string()),
        }
    }

    (entries, rejected)
}

/// Synchronize manual entries, in order, below `root`
pub async fn sync_entries(
    synchronizer: &Synchronizer,
    entries: &[ManualEntry],
    root: &Path,
) -> RunReport {
    let start = Instant::now();
    let mut report = RunReport::default();

    for entry in entries {
        let dir = entry.target_dir(root);
        report
            .repos
            .push(synchronizer.process(&entry.repository, &dir).await);
    }

    report.duration = start.elapsed();
    report
}
