//! groupsync - Mirror a GitLab group tree onto the local filesystem
//!
//! groupsync walks a root group and every subgroup below it, recreates the
//! hierarchy as nested directories and keeps one checkout per repository up
//! to date: missing checkouts are cloned, existing ones pulled.
//!
//! ## Core Features
//!
//! - **Paginated discovery**: group, project and subgroup listings via the REST API
//! - **Depth-first mirroring**: repositories of a group before its subgroups
//! - **Per-run deduplication**: a repository is synced at most once per run
//! - **Safe updates**: directories that are not checkouts are never touched
//! - **Partial-failure tolerance**: one broken group or repository never blocks its siblings
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`api`]: Listing API access and wire types
//! - [`pagination`]: Paginated fetcher
//! - [`registry`]: Run-scoped dedup registry
//! - [`vcs`]: Version-control capability and the git CLI implementation
//! - [`sync`]: Clone-or-update decisions for single repositories
//! - [`walker`]: Group tree traversal and run reporting
//! - [`manual`]: Manually entered repository paths
//! - [`health`]: Preflight checks

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod manual;
pub mod pagination;
pub mod registry;
pub mod sync;
pub mod vcs;
pub mod walker;

pub use api::{ApiTransport, Group, HttpTransport, RepoId, Repository};
pub use config::{Config, Transport};
pub use error::{ApiError, ConfigError, GroupError, SyncFailure, TransportError};
pub use pagination::Paginator;
pub use registry::DedupRegistry;
pub use sync::{ClonePlan, RepoReport, SyncOutcome, Synchronizer};
pub use vcs::{GitCli, VersionControl};
pub use walker::{GroupWalker, RunReport, SyncObserver, SyncSummary};
