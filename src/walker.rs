//! Group Tree Walker
//!
//! Depth-first traversal of a group and all of its subgroups. Each group is
//! mirrored as `<parent dir>/<slug>`; its repositories are synchronized before
//! any subgroup is entered, and subgroups are visited in listing order.
//!
//! The remote hierarchy is assumed to be a tree. Nothing guards against a
//! cyclic group graph beyond the dedup registry keeping repositories from
//! being synced twice.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::{
    fetch_group, projects_endpoint, subgroups_endpoint, ApiTransport, Group, GroupRef, Repository,
};
use crate::error::{ApiError, GroupError, SyncFailure};
use crate::pagination::{Paginator, DEFAULT_PER_PAGE};
use crate::sync::{is_safe_component, RepoReport, SyncOutcome, Synchronizer};

/// Progress hooks, called as the walk proceeds.
///
/// `depth` is 0 for the root group and only meant for indentation.
pub trait SyncObserver: Send + Sync {
    fn group_started(&self, _group: &Group, _dir: &Path, _depth: usize) {}

    fn repo_finished(&self, _report: &RepoReport, _depth: usize) {}

    fn group_failed(&self, _failure: &GroupFailure, _depth: usize) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Which step of a group failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStage {
    Lookup,
    Directory,
    Projects,
    Subgroups,
}

/// A recorded, non-fatal group failure
#[derive(Debug, Clone)]
pub struct GroupFailure {
    pub group_id: String,
    pub stage: GroupStage,
    pub error: GroupError,
}

/// Everything that happened during one walk
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub repos: Vec<RepoReport>,
    pub group_failures: Vec<GroupFailure>,
    pub groups_visited: usize,
    pub duration: Duration,
}

/// Counts by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_groups: usize,
    pub groups_visited: usize,
    /// Manually entered paths that could not be parsed
    pub invalid_entries: usize,
}

impl SyncSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.failed_groups > 0 || self.invalid_entries > 0
    }
}

impl RunReport {
    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary {
            total_repositories: self.repos.len(),
            failed_groups: self.group_failures.len(),
            groups_visited: self.groups_visited,
            ..Default::default()
        };

        for report in &self.repos {
            match report.outcome {
                SyncOutcome::Cloned => summary.cloned += 1,
                SyncOutcome::Updated => summary.updated += 1,
                SyncOutcome::Skipped { .. } => summary.skipped += 1,
                SyncOutcome::Failed(_) => summary.failed += 1,
            }
        }

        summary
    }

    /// Repositories that ended in failure
    pub fn failures(&self) -> impl Iterator<Item = (&RepoReport, &SyncFailure)> {
        self.repos.iter().filter_map(|report| match &report.outcome {
            SyncOutcome::Failed(failure) => Some((report, failure)),
            _ => None,
        })
    }

    /// Outcome recorded for the repository mirrored at `path`
    pub fn outcome_at(&self, path: &Path) -> Option<&SyncOutcome> {
        self.repos
            .iter()
            .find(|report| report.path == path)
            .map(|report| &report.outcome)
    }
}

/// Pending group on the traversal stack
struct WorkItem {
    group_id: String,
    resolved: Option<Group>,
    parent_dir: PathBuf,
    depth: usize,
}

/// Walks a group tree and feeds every repository to the [`Synchronizer`]
pub struct GroupWalker {
    api: Arc<dyn ApiTransport>,
    synchronizer: Synchronizer,
    observer: Arc<dyn SyncObserver>,
    per_page: u32,
    max_parallel: usize,
}

impl GroupWalker {
    pub fn new(api: Arc<dyn ApiTransport>, synchronizer: Synchronizer) -> Self {
        Self {
            api,
            synchronizer,
            observer: Arc::new(NoopObserver),
            per_page: DEFAULT_PER_PAGE,
            max_parallel: 1,
        }
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Repositories of one group synced concurrently. Outcomes are still
    /// recorded in listing order.
    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Mirror `root_group` and everything below it into `base`.
    ///
    /// Only a failed lookup of the root group is returned as an error;
    /// failures further down are recorded in the [`RunReport`].
    pub async fn walk(&self, root_group: &str, base: &Path) -> Result<RunReport, ApiError> {
        let start = Instant::now();

        let root = fetch_group(self.api.as_ref(), root_group).await?;
        info!("Mirroring group {} ({}) into {}", root.name, root.id, base.display());

        let mut report = RunReport::default();
        let mut stack = vec![WorkItem {
            group_id: root.id.clone(),
            resolved: Some(root),
            parent_dir: base.to_path_buf(),
            depth: 0,
        }];

        while let Some(item) = stack.pop() {
            let depth = item.depth;
            match self.visit(item, &mut report).await {
                Ok(children) => {
                    // Reversed so the first listed subgroup is popped first.
                    stack.extend(children.into_iter().rev());
                }
                Err(failure) => {
                    warn!(
                        "Group {} failed at {:?}: {}",
                        failure.group_id, failure.stage, failure.error
                    );
                    self.observer.group_failed(&failure, depth);
                    report.group_failures.push(failure);
                }
            }
        }

        report.duration = start.elapsed();
        let summary = report.summary();
        info!(
            "Walk completed in {:.2}s: {} cloned, {} updated, {} skipped, {} failed, {} group failures",
            report.duration.as_secs_f64(),
            summary.cloned,
            summary.updated,
            summary.skipped,
            summary.failed,
            summary.failed_groups
        );

        Ok(report)
    }

    /// Process one group. Returns its subgroups as new work items, or the
    /// failure that stopped this group from being processed at all.
    ///
    /// A failed project listing is recorded directly and the subgroups are
    /// still visited.
    async fn visit(
        &self,
        item: WorkItem,
        report: &mut RunReport,
    ) -> Result<Vec<WorkItem>, GroupFailure> {
        let fail = |stage: GroupStage, error: GroupError| GroupFailure {
            group_id: item.group_id.clone(),
            stage,
            error,
        };

        let group = match item.resolved {
            Some(group) => group,
            None => fetch_group(self.api.as_ref(), &item.group_id)
                .await
                .map_err(|e| fail(GroupStage::Lookup, e.into()))?,
        };

        if !is_safe_component(&group.slug) {
            return Err(fail(
                GroupStage::Directory,
                GroupError::UnsafeSlug(group.slug.clone()),
            ));
        }

        let dir = item.parent_dir.join(&group.slug);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            fail(
                GroupStage::Directory,
                GroupError::CreateDir {
                    path: dir.clone(),
                    message: e.to_string(),
                },
            )
        })?;

        debug!("Entering group {} at depth {}", group.id, item.depth);
        self.observer.group_started(&group, &dir, item.depth);
        report.groups_visited += 1;

        let paginator = Paginator::new(self.api.as_ref(), self.per_page);

        match paginator
            .fetch_all::<Repository>(&projects_endpoint(&group.id))
            .await
        {
            Ok(repos) => {
                debug!("Group {} has {} repositories", group.id, repos.len());
                let reports = self.sync_repositories(&repos, &dir, item.depth).await;
                report.repos.extend(reports);
            }
            Err(e) => {
                let failure = fail(GroupStage::Projects, e.into());
                warn!("Listing projects of group {} failed: {}", group.id, failure.error);
                self.observer.group_failed(&failure, item.depth);
                report.group_failures.push(failure);
            }
        }

        let subgroups = paginator
            .fetch_all::<GroupRef>(&subgroups_endpoint(&group.id))
            .await
            .map_err(|e| fail(GroupStage::Subgroups, e.into()))?;

        Ok(subgroups
            .into_iter()
            .map(|sub| WorkItem {
                group_id: sub.id,
                resolved: None,
                parent_dir: dir.clone(),
                depth: item.depth + 1,
            })
            .collect())
    }

    async fn sync_repositories(
        &self,
        repos: &[Repository],
        dir: &Path,
        depth: usize,
    ) -> Vec<RepoReport> {
        stream::iter(repos)
            .map(|repo| async move {
                let report = self.synchronizer.process(repo, dir).await;
                self.observer.repo_finished(&report, depth + 1);
                report
            })
            .buffered(self.max_parallel)
            .collect()
            .await
    }
}
