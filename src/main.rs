use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use groupsync::config::Overrides;
use groupsync::health::HealthCheck;
use groupsync::manual;
use groupsync::walker::{GroupFailure, SyncObserver};
use groupsync::{
    Config, DedupRegistry, GitCli, Group, GroupWalker, HttpTransport, RepoReport, SyncOutcome,
    SyncSummary, Synchronizer, Transport,
};

#[derive(Parser)]
#[command(name = "groupsync")]
#[command(about = "Mirror a GitLab group tree of repositories onto the local filesystem")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the group tree and clone or pull every repository
    Sync {
        /// Root group id or full path
        #[arg(short, long, env = "GITLAB_GROUP")]
        group: Option<String>,

        /// API token (passed through as PRIVATE-TOKEN)
        #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Repositories synced concurrently within one group
        #[arg(short = 'j', long)]
        parallel: Option<usize>,
    },

    /// Clone or pull explicit repository paths (group/sub/repo), skipping discovery.
    /// Reads paths from stdin when none are given.
    Manual {
        /// Repository paths
        paths: Vec<String>,
    },

    /// System health check and diagnostics
    Doctor {
        /// Root group id or full path
        #[arg(short, long, env = "GITLAB_GROUP")]
        group: Option<String>,

        /// API token (passed through as PRIVATE-TOKEN)
        #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

/// Options shared by every command
#[derive(Args, Clone, Default)]
struct TargetArgs {
    /// Instance base URL
    #[arg(long, env = "GITLAB_URL", global = true)]
    url: Option<String>,

    /// Output root directory
    #[arg(short, long, global = true)]
    output: Option<String>,

    /// Clone transport
    #[arg(long, value_enum, global = true)]
    transport: Option<Transport>,

    /// Exit with status 2 if any repository or group failed
    #[arg(long, global = true)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting groupsync v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(cli.config.as_deref())?;
    let target = cli.target.clone();
    let strict = target.strict;

    let summary = match cli.command {
        Commands::Sync {
            group,
            token,
            parallel,
        } => {
            config.apply_overrides(overrides(&target, group, token, parallel))?;
            cmd_sync(&config).await?
        }
        Commands::Manual { paths } => {
            config.apply_overrides(overrides(&target, None, None, None))?;
            cmd_manual(&config, paths).await?
        }
        Commands::Doctor { group, token } => {
            config.apply_overrides(overrides(&target, group, token, None))?;
            return cmd_doctor(&config).await;
        }
    };

    if strict && summary.has_failures() {
        std::process::exit(2);
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

fn overrides(
    target: &TargetArgs,
    group: Option<String>,
    token: Option<String>,
    parallel: Option<usize>,
) -> Overrides {
    Overrides {
        base_url: target.url.clone(),
        token,
        root_group: group,
        output_directory: target.output.clone(),
        transport: target.transport,
        max_parallel: parallel,
    }
}

fn synchronizer(config: &Config, registry: Arc<DedupRegistry>) -> Synchronizer {
    let git = Arc::new(GitCli::from_config(&config.sync));
    Synchronizer::from_config(git, registry, &config.sync)
}

/// Discover the group tree and synchronize it
async fn cmd_sync(config: &Config) -> Result<SyncSummary> {
    config.validate(true)?;
    let root_group = config
        .root_group()
        .context("No root group configured")?
        .to_string();
    let output_root = config.output_root();

    let api = Arc::new(HttpTransport::from_config(config)?);
    let registry = Arc::new(DedupRegistry::new());
    let walker = GroupWalker::new(api, synchronizer(config, registry))
        .per_page(config.gitlab.per_page)
        .max_parallel(config.sync.max_parallel)
        .with_observer(Arc::new(ConsoleObserver));

    println!(
        "🔍 Mirroring group {} from {} into {}",
        root_group,
        config.gitlab.base_url,
        output_root.display()
    );

    let report = walker
        .walk(&root_group, &output_root)
        .await
        .with_context(|| format!("Failed to resolve root group '{}'", root_group))?;

    let summary = report.summary();
    print_summary(&summary, report.duration.as_secs_f64());

    if !report.group_failures.is_empty() {
        println!("\n🔍 Failed Groups:");
        for failure in &report.group_failures {
            println!("   ❌ {} ({:?}): {}", failure.group_id, failure.stage, failure.error);
        }
    }
    print_failures(report.failures().map(|(r, f)| (r, f.to_string())));

    Ok(summary)
}

/// Synchronize explicitly listed repository paths
async fn cmd_manual(config: &Config, mut paths: Vec<String>) -> Result<SyncSummary> {
    config.validate(false)?;

    if paths.is_empty() {
        println!("📝 Enter repository paths (group/sub/repo), one per line. Finish with an empty line or EOF.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            if line.trim().is_empty() {
                break;
            }
            paths.push(line);
        }
    }

    let (entries, rejected) =
        manual::repositories_from_paths(&paths, &config.host(), &config.gitlab.base_url);
    for input in &rejected {
        println!("   ⚠️  Ignoring '{}': expected group/.../repository", input);
    }

    let output_root = config.output_root();
    let registry = Arc::new(DedupRegistry::new());
    let sync = synchronizer(config, registry);

    let report = manual::sync_entries(&sync, &entries, &output_root).await;
    for repo in &report.repos {
        ConsoleObserver.repo_finished(repo, 0);
    }

    let summary = SyncSummary {
        invalid_entries: rejected.len(),
        ..report.summary()
    };
    print_summary(&summary, report.duration.as_secs_f64());
    print_failures(report.failures().map(|(r, f)| (r, f.to_string())));

    Ok(summary)
}

/// System health check and diagnostics
async fn cmd_doctor(config: &Config) -> Result<()> {
    let api = HttpTransport::from_config(config)?;
    let health = HealthCheck::run(config, &api).await;

    println!("🔍 groupsync System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning {
                "⚠️ "
            } else {
                "✅"
            }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
        Ok(())
    } else {
        println!("❌ Some checks failed");
        std::process::exit(1);
    }
}

/// Prints each outcome as it happens, indented by group depth
struct ConsoleObserver;

impl SyncObserver for ConsoleObserver {
    fn group_started(&self, group: &Group, _dir: &Path, depth: usize) {
        println!("{}📁 {} ({})", indent(depth), group.name, group.slug);
    }

    fn repo_finished(&self, report: &RepoReport, depth: usize) {
        let pad = indent(depth);
        match &report.outcome {
            SyncOutcome::Cloned => println!("{}📥 {} cloned", pad, report.name),
            SyncOutcome::Updated => println!("{}🔄 {} updated", pad, report.name),
            SyncOutcome::Skipped { reason } => {
                println!("{}⏭️  {} skipped ({})", pad, report.name, reason)
            }
            SyncOutcome::Failed(failure) => {
                println!("{}❌ {} failed: {}", pad, report.name, failure)
            }
        }
    }

    fn group_failed(&self, failure: &GroupFailure, depth: usize) {
        println!(
            "{}❌ group {} ({:?}): {}",
            indent(depth),
            failure.group_id,
            failure.stage,
            failure.error
        );
    }
}

fn indent(depth: usize) -> String {
    "   ".repeat(depth)
}

fn print_summary(summary: &SyncSummary, seconds: f64) {
    println!("\n🎉 Synchronization Complete!");
    println!("   📊 Total repositories: {}", summary.total_repositories);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   🔄 Updated: {}", summary.updated);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   ❌ Failed: {}", summary.failed);
    if summary.invalid_entries > 0 {
        println!("   ⚠️  Invalid entries: {}", summary.invalid_entries);
    }
    if summary.groups_visited > 0 || summary.failed_groups > 0 {
        println!(
            "   📁 Groups: {} visited, {} failed",
            summary.groups_visited, summary.failed_groups
        );
    }
    println!("   ⏱️  Duration: {:.2}s", seconds);
}

fn print_failures<'a>(failures: impl Iterator<Item = (&'a RepoReport, String)>) {
    let failures: Vec<_> = failures.collect();
    if failures.is_empty() {
        return;
    }

    println!("\n🔍 Failed Operations:");
    for (report, error) in failures {
        println!("   ❌ {}: {}", report.path.display(), error);
    }
}
