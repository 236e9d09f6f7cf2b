//! Govern CLI - governed production cycles and governance tooling.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use govern_core::ThreatLevel;
use govern_execution::{CommandWorkUnit, CycleDriver, GovernConfig, RunOptions};
use govern_guard::ThreatScanner;
use govern_hooks::{HeuristicAdvisor, HookPipeline};
use govern_routing::{DimensionExtractor, TaskRouter};
use govern_storage::{AuditStore, SqliteAuditStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "govern")]
#[command(about = "Governance middleware for autonomous agent cycles", long_about = None)]
struct Cli {
    /// Config file (TOML, optional)
    #[arg(long, global = true, default_value = "govern.toml")]
    config: PathBuf,

    /// Audit database, overrides the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a governed production cycle
    Run(RunArgs),
    /// Scan text for threats
    Scan {
        /// Text to scan
        text: String,
    },
    /// Learn a threat pattern
    Learn {
        /// Regular expression
        pattern: String,
        /// Severity (critical, high, medium, low, safe)
        #[arg(long, default_value = "medium")]
        level: ThreatLevel,
        /// Description
        #[arg(long)]
        description: Option<String>,
    },
    /// Report a previously scanned text as a false positive
    FalsePositive {
        /// Text that was scanned
        text: String,
    },
    /// Show threat scanner metrics
    SecurityReport {
        /// Reporting period
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Assign a task to a worker
    Assign {
        /// Task description
        description: String,
    },
    /// Tag text along the six dimensions
    Extract {
        /// Text to tag
        text: String,
    },
    /// List worker profiles
    Workers {
        /// Show a coordination report over this many days instead
        #[arg(long)]
        report: Option<u32>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Requested iterations
    #[arg(long, env = "AF_PROD_ITERATIONS")]
    iterations: Option<u32>,

    /// Base depth
    #[arg(long, env = "AF_PROD_DEPTH")]
    depth: Option<u32>,

    /// Fix the circle for every iteration
    #[arg(long, env = "AF_PROD_CIRCLE")]
    circle: Option<String>,

    /// Rotate circles across iterations
    #[arg(long, overrides_with = "no_rotate_circles")]
    rotate_circles: bool,

    /// Keep the default circle
    #[arg(long, overrides_with = "rotate_circles")]
    no_rotate_circles: bool,

    /// Allow autocommit while SAFE
    #[arg(long, overrides_with = "no_autocommit")]
    autocommit: bool,

    /// Never autocommit
    #[arg(long, overrides_with = "autocommit")]
    no_autocommit: bool,

    /// Shadow mode, never autocommit
    #[arg(long, visible_alias = "shadow")]
    dry_run: bool,

    /// Skip the pre-flight safety gate
    #[arg(long)]
    force: bool,

    /// Deployment environment
    #[arg(long, env = "AF_PROD_ENVIRONMENT")]
    environment: Option<String>,

    /// Run the work unit without the hook pipeline
    #[arg(long)]
    no_hooks: bool,

    /// Work-unit command
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn options(&self, config: &GovernConfig) -> RunOptions {
        let defaults = &config.run;
        RunOptions {
            iterations: self.iterations.unwrap_or(defaults.iterations),
            depth: self.depth.unwrap_or(defaults.depth),
            circle: self.circle.clone().filter(|c| !c.is_empty()),
            rotate_circles: flag(self.rotate_circles, self.no_rotate_circles, defaults.rotate_circles),
            autocommit: flag(self.autocommit, self.no_autocommit, defaults.autocommit),
            dry_run: self.dry_run,
            force: self.force,
            environment: self
                .environment
                .clone()
                .unwrap_or_else(|| defaults.environment.clone()),
        }
    }
}

/// Resolve a `--x/--no-x` pair against a default.
fn flag(on: bool, off: bool, default: bool) -> bool {
    if off {
        false
    } else {
        on || default
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = GovernConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        config.database = db;
    }

    let sqlite = Arc::new(open_store(&config.database).await?);
    let store: Arc<dyn AuditStore> = sqlite.clone();

    let result = dispatch(cli.command, store, config).await;
    sqlite.close().await;
    result
}

async fn dispatch(command: Commands, store: Arc<dyn AuditStore>, config: GovernConfig) -> Result<ExitCode> {
    let code = match command {
        Commands::Run(args) => run(store, config, args).await?,
        Commands::Scan { text } => {
            let scanner = scanner(store).await?;
            print_json(&scanner.scan(&text).await?)?;
            ExitCode::SUCCESS
        }
        Commands::Learn {
            pattern,
            level,
            description,
        } => {
            ThreatScanner::new(store).learn(&pattern, level, description).await?;
            println!("Learned pattern: {pattern} ({level})");
            ExitCode::SUCCESS
        }
        Commands::FalsePositive { text } => {
            let adjusted = ThreatScanner::new(store).report_false_positive(&text).await?;
            print_json(&adjusted)?;
            ExitCode::SUCCESS
        }
        Commands::SecurityReport { days } => {
            let scanner = scanner(store).await?;
            print_json(&scanner.report(days).await?)?;
            ExitCode::SUCCESS
        }
        Commands::Assign { description } => {
            let router = router(store, &config).await?;
            print_json(&router.assign(&description).await?)?;
            ExitCode::SUCCESS
        }
        Commands::Extract { text } => {
            let extractor = DimensionExtractor::with_config(store, config.extractor)?;
            print_json(&extractor.extract(&text).await?)?;
            ExitCode::SUCCESS
        }
        Commands::Workers { report } => {
            let router = router(store, &config).await?;
            match report {
                Some(days) => print_json(&router.report(days).await?)?,
                None => {
                    let workers = router.workers().await?;
                    println!("Workers ({})", workers.len());
                    for w in workers {
                        println!(
                            "  {} | {} | tasks: {} | success: {:.2} | expertise: {:.2} | {}",
                            w.id,
                            w.name,
                            w.total_tasks,
                            w.success_rate,
                            w.expertise,
                            w.specializations.join(", "),
                        );
                    }
                }
            }
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

async fn run(store: Arc<dyn AuditStore>, config: GovernConfig, args: RunArgs) -> Result<ExitCode> {
    let options = args.options(&config);
    let work_unit = CommandWorkUnit::from_argv(&args.command)
        .context("missing work-unit command after --")?;

    let hooks = if args.no_hooks {
        None
    } else {
        let pipeline = HookPipeline::new(store.clone())?
            .with_config(config.hooks.clone())
            .with_router(TaskRouter::new(store.clone()).with_config(config.router.clone()))
            .with_extractor(DimensionExtractor::with_config(
                store.clone(),
                config.extractor.clone(),
            )?)
            .with_advisor(Box::new(HeuristicAdvisor::default()));
        pipeline.seed().await?;
        Some(pipeline)
    };

    info!(
        iterations = options.iterations,
        depth = options.depth,
        environment = %options.environment,
        "Governing: {}",
        args.command.join(" ")
    );

    let mut driver = CycleDriver::new(store, Box::new(work_unit), config, options);
    if let Some(hooks) = hooks {
        driver = driver.with_hooks(hooks);
    }

    let shutdown = driver.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current iteration");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let summary = driver.run().await?;
    print_json(&summary)?;
    Ok(ExitCode::from(summary.exit_code()))
}

async fn open_store(path: &Path) -> Result<SqliteAuditStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteAuditStore::open(path)
        .await
        .with_context(|| format!("opening audit store {}", path.display()))
}

async fn scanner(store: Arc<dyn AuditStore>) -> Result<ThreatScanner> {
    let scanner = ThreatScanner::new(store);
    scanner.seed_defaults().await?;
    Ok(scanner)
}

async fn router(store: Arc<dyn AuditStore>, config: &GovernConfig) -> Result<TaskRouter> {
    let router = TaskRouter::new(store).with_config(config.router.clone());
    router.seed_workers().await?;
    Ok(router)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_override_defaults() {
        let cli = Cli::parse_from([
            "govern",
            "run",
            "--iterations",
            "4",
            "--no-rotate-circles",
            "--shadow",
            "--",
            "af",
            "full-cycle",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = args.options(&GovernConfig::default());
        assert_eq!(options.iterations, 4);
        assert_eq!(options.depth, 3);
        assert!(!options.rotate_circles);
        assert!(options.autocommit);
        assert!(options.dry_run);
        assert_eq!(args.command, vec!["af", "full-cycle"]);
    }

    #[tokio::test]
    async fn test_store_is_closed_when_a_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("govern.db");
        let cli = Cli::parse_from([
            "govern",
            "--config",
            dir.path().join("missing.toml").to_str().unwrap(),
            "--db",
            db.to_str().unwrap(),
            "learn",
            "(unclosed",
        ]);

        assert!(execute(cli).await.is_err());

        // Closing checkpoints the WAL, so no side files are left behind
        assert!(db.exists());
        assert!(!dir.path().join("govern.db-wal").exists());
    }

    #[test]
    fn test_flag_pairs() {
        assert!(flag(false, false, true));
        assert!(!flag(false, false, false));
        assert!(flag(true, false, false));
        assert!(!flag(false, true, true));
    }
}
