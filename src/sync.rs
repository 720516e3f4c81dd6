//! Repository Synchronizer
//!
//! Decides, for one repository and its owning group's directory, whether to
//! clone, pull, skip or fail. Git itself is reached through the injected
//! [`VersionControl`] capability.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::Repository;
use crate::config::{SyncConfig, Transport};
use crate::error::SyncFailure;
use crate::registry::DedupRegistry;
use crate::vcs::{has_vcs_marker, VersionControl};

pub const REASON_ALREADY_PROCESSED: &str = "already processed this run";
pub const REASON_ARCHIVED: &str = "archived";
pub const REASON_EXCLUDED: &str = "excluded by pattern";

/// Result of synchronizing one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Repository was freshly cloned
    Cloned,
    /// Existing checkout was pulled
    Updated,
    /// Nothing was attempted
    Skipped { reason: String },
    /// Clone, pull or local preparation failed
    Failed(SyncFailure),
}

impl SyncOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Cloned | Self::Updated)
    }
}

/// Where a repository goes and which URL fetches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonePlan {
    pub target_dir: PathBuf,
    pub url: String,
}

/// Outcome of one repository, as reported to observers and in the run summary
#[derive(Debug, Clone)]
pub struct RepoReport {
    pub name: String,
    pub path: PathBuf,
    pub outcome: SyncOutcome,
}

/// Whether `name` is usable as exactly one directory level
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Compiled exclusion patterns ("*" wildcard, whole-name match)
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<Regex>,
}

impl ExclusionFilter {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| {
                let body = regex::escape(pattern).replace(r"\*", ".*");
                match Regex::new(&format!("^{}$", body)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Ignoring invalid exclude pattern '{}': {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Clone-or-update decision procedure for single repositories
#[derive(Clone)]
pub struct Synchronizer {
    vcs: Arc<dyn VersionControl>,
    registry: Arc<DedupRegistry>,
    transport: Transport,
    include_archived: bool,
    exclusions: ExclusionFilter,
}

impl Synchronizer {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        registry: Arc<DedupRegistry>,
        transport: Transport,
    ) -> Self {
        Self {
            vcs,
            registry,
            transport,
            include_archived: false,
            exclusions: ExclusionFilter::default(),
        }
    }

    /// Build with transport, archive and exclusion settings from configuration
    pub fn from_config(
        vcs: Arc<dyn VersionControl>,
        registry: Arc<DedupRegistry>,
        config: &SyncConfig,
    ) -> Self {
        let mut synchronizer = Self::new(vcs, registry, config.transport);
        synchronizer.include_archived = config.include_archived;
        synchronizer.exclusions = ExclusionFilter::new(&config.exclude_patterns);
        synchronizer
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &DedupRegistry {
        &self.registry
    }

    /// Resolve target directory and clone URL
    pub fn plan(&self, repo: &Repository, group_dir: &Path) -> ClonePlan {
        ClonePlan {
            target_dir: group_dir.join(repo.local_name()),
            url: repo.url_for(self.transport).to_string(),
        }
    }

    /// Filters applied before a repository reaches [`Synchronizer::sync`]:
    /// archived state (unless included) and exclusion patterns.
    pub fn skip_reason(&self, repo: &Repository) -> Option<&'static str> {
        if repo.archived && !self.include_archived {
            Some(REASON_ARCHIVED)
        } else if self.exclusions.is_excluded(repo.local_name())
            || self.exclusions.is_excluded(&repo.name)
        {
            Some(REASON_EXCLUDED)
        } else {
            None
        }
    }

    /// Synchronize one repository into `group_dir`.
    ///
    /// The dedup claim is taken first and kept even if the clone later fails,
    /// so a failed repository is not retried within the same run.
    pub async fn sync(&self, repo: &Repository, group_dir: &Path) -> SyncOutcome {
        if !self.registry.try_claim(&repo.id) {
            debug!("Skipping {} ({}): already processed", repo.name, repo.id);
            return SyncOutcome::skipped(REASON_ALREADY_PROCESSED);
        }

        if !is_safe_component(repo.local_name()) {
            return SyncOutcome::Failed(SyncFailure::UnsafeName(repo.local_name().to_string()));
        }

        let plan = self.plan(repo, group_dir);
        let path = &plan.target_dir;

        if !path.exists() {
            if let Err(e) = tokio::fs::create_dir_all(group_dir).await {
                return SyncOutcome::Failed(SyncFailure::Filesystem {
                    path: group_dir.to_path_buf(),
                    message: e.to_string(),
                });
            }

            return match self.vcs.clone_repo(&plan.url, path).await {
                Ok(()) => {
                    info!("Cloned {} into {}", repo.name, path.display());
                    SyncOutcome::Cloned
                }
                Err(e) => {
                    warn!("Clone of {} failed: {}", repo.name, e);
                    SyncOutcome::Failed(e.into())
                }
            };
        }

        if !has_vcs_marker(path) {
            warn!(
                "{} exists but is not a repository, leaving it untouched",
                path.display()
            );
            return SyncOutcome::Failed(SyncFailure::LocalConflict { path: path.clone() });
        }

        match self.vcs.pull(path).await {
            Ok(()) => {
                info!("Updated {} at {}", repo.name, path.display());
                SyncOutcome::Updated
            }
            Err(e) => {
                warn!("Pull of {} failed: {}", repo.name, e);
                SyncOutcome::Failed(e.into())
            }
        }
    }

    /// Apply the pre-sync filters, then [`Synchronizer::sync`], and package
    /// the outcome for reporting.
    pub async fn process(&self, repo: &Repository, group_dir: &Path) -> RepoReport {
        let path = group_dir.join(repo.local_name());
        let outcome = match self.skip_reason(repo) {
            Some(reason) => {
                debug!("Skipping {}: {}", repo.name, reason);
                SyncOutcome::skipped(reason)
            }
            None => self.sync(repo, group_dir).await,
        };

        RepoReport {
            name: repo.name.clone(),
            path,
            outcome,
        }
    }
}
