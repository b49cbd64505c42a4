//! Quill migration command line
//!
//! Migrates legacy Quill workspaces into the current layout, inspects and
//! rolls back migrations, and optionally serves the HTTP API.
//!
//! Home directory precedence:
//!   1. --home flag
//!   2. QUILL_HOME env var
//!   3. ~/.quill via dirs crate
//!   4. Fallback: ./.quill

use std::{net::SocketAddr, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quill_migrate::{
    cache_mgmt::{
        maintenance::{CacheMaintenance, MaintenanceIntervals},
        store::FileCacheStore,
        CacheManagementService,
    },
    migration::{
        backup::DEFAULT_RETENTION_DAYS, report::WARNING_PREVIEW, BackupFilter, MigrationEngine,
        MigrationRequest, MigrationResult, MigrationType, ReportFormat, ReportRequest,
    },
    server, Settings,
};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Exit code after Ctrl+C
const EXIT_INTERRUPTED: u8 = 130;

/// Command line interface for the Quill migration engine.
#[derive(Debug, Parser)]
#[command(
    name = "quill-migrate",
    version,
    about = "Migrate legacy Quill workspaces to the current layout, with backup and rollback"
)]
struct Cli {
    /// Quill home directory (overrides env + platform default)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress info logs (only warnings+)
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Force ANSI color output in logs
    #[arg(long, global = true)]
    color: bool,

    /// Disable ANSI color output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print the resolved home directory and exit
    #[arg(long)]
    print_home: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Migrate a legacy workspace
    Migrate {
        /// Legacy workspace directory
        source: PathBuf,
        /// Name of the migrated workspace
        workspace: String,
        /// Analyze and count without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the backup of the source
        #[arg(long)]
        no_backup: bool,
        /// Slice to migrate (full, workspace, config, cache, templates)
        #[arg(long = "type", default_value = "full")]
        migration_type: MigrationType,
        /// Target directory (default: <home>/workspaces/<workspace>)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Write a report (.json or .md) after the run
        #[arg(long, value_name = "PATH")]
        output_report: Option<PathBuf>,
    },
    /// Inspect and manage migrations
    Migration {
        #[command(subcommand)]
        action: MigrationAction,
    },
    /// Serve the HTTP API and run background cache maintenance
    Serve {
        /// Address to bind (e.g. 127.0.0.1:8765)
        #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8765")]
        listen: String,
    },
}

#[derive(Debug, Subcommand)]
enum MigrationAction {
    /// Show the state of a migrated workspace
    Status { workspace: String },
    /// Restore a source from a backup (preview unless --force)
    Rollback {
        /// Backup directory or backup id
        backup_path: String,
        /// Workspace the backup must belong to
        workspace: String,
        /// Apply the rollback
        #[arg(long)]
        force: bool,
        /// Restore somewhere other than the recorded source path
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// List backups, newest first
    ListBackups {
        #[arg(long)]
        workspace: Option<String>,
    },
    /// Delete backups older than the retention period
    Cleanup {
        /// Days of backups to keep
        #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logging / tracing setup
    let level = if cli.verbose {
        "quill_migrate=debug"
    } else if cli.quiet {
        "quill_migrate=warn"
    } else {
        "quill_migrate=info"
    };
    let mut fmt = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .with_target(false);

    // Color handling precedence: --no-color > inherited tty auto > --color
    if cli.no_color {
        fmt = fmt.with_ansi(false);
    } else if cli.color {
        fmt = fmt.with_ansi(true);
    }
    fmt.init();

    let settings = Settings::resolve(cli.home.as_deref())?;
    if cli.print_home {
        println!("{}", settings.home.display());
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        anyhow::bail!("no command given (see --help)");
    };

    tracing::debug!(
        "quill-migrate v{} (home: {})",
        env!("CARGO_PKG_VERSION"),
        settings.home.display()
    );

    if let Command::Serve { listen } = &command {
        let addr: SocketAddr = listen
            .parse()
            .with_context(|| format!("Invalid --listen address '{listen}'"))?;
        let store = Arc::new(FileCacheStore::new(settings.cache_dir()));
        let cache = CacheManagementService::from_settings(store, &settings)?;
        let maintenance =
            CacheMaintenance::spawn(Arc::new(Mutex::new(cache)), MaintenanceIntervals::default());

        let served = server::serve(MigrationEngine::new(settings), addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
        maintenance.shutdown().await;
        served?;
        return Ok(ExitCode::SUCCESS);
    }
    let engine = MigrationEngine::new(settings);

    tokio::select! {
        outcome = run(&engine, command) => Ok(if outcome? { ExitCode::SUCCESS } else { ExitCode::FAILURE }),
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

/// Execute a command; `Ok(false)` maps to exit code 1
async fn run(engine: &MigrationEngine, command: Command) -> Result<bool> {
    match command {
        Command::Migrate {
            source,
            workspace,
            dry_run,
            no_backup,
            migration_type,
            target,
            output_report,
        } => {
            let mut request = MigrationRequest::new(&source)
                .workspace_name(&workspace)
                .migration_type(migration_type)
                .dry_run(dry_run)
                .create_backup(!no_backup);
            if let Some(target) = target {
                request = request.target_path(target);
            }
            let target_path = request.target_path.clone();

            let run = engine.start(request).await?;
            print_result(&run.result);

            if let Some(path) = output_report {
                let report = engine
                    .report(&ReportRequest {
                        source_path: source,
                        workspace_name: Some(workspace),
                        target_path,
                        migration_id: Some(run.migration_id),
                    })
                    .await?;
                let text = report.render(ReportFormat::from_path(&path))?;
                std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
            Ok(run.result.success)
        }
        Command::Migration { action } => run_migration_action(engine, action).await,
        Command::Serve { .. } => anyhow::bail!("serve is handled before dispatch"),
    }
}

async fn run_migration_action(engine: &MigrationEngine, action: MigrationAction) -> Result<bool> {
    match action {
        MigrationAction::Status { workspace } => {
            let status = engine.workspace_status(&workspace).await?;
            println!("Workspace: {}", status.workspace_name);
            println!("Location:  {}", status.target_path.display());
            match &status.metadata {
                Some(meta) => {
                    println!(
                        "Migrated:  yes ({} from {}, migration {})",
                        meta.created_at.to_rfc3339(),
                        meta.migrated_from.display(),
                        meta.migration_id
                    );
                }
                None => println!("Migrated:  no"),
            }
            if let Some(validation) = &status.validation {
                let verdict = if validation.valid { "valid" } else { "invalid" };
                println!(
                    "Layout:    {verdict} ({} pipelines, {} templates, {} cache entries)",
                    validation.pipelines, validation.templates, validation.cache_entries
                );
                print_list("Issues", &validation.issues);
            }
            println!("Backups:   {}", status.backups);
            Ok(status.validation.map_or(true, |v| v.valid))
        }
        MigrationAction::Rollback {
            backup_path,
            workspace,
            force,
            target,
        } => {
            let backup = engine.preview_rollback(&backup_path, &workspace)?;
            let destination = target.clone().unwrap_or_else(|| backup.source_path.clone());
            if !force {
                println!(
                    "Would restore {} backup {} ({} bytes, created {}) onto {}",
                    backup.backup_type,
                    backup.backup_id,
                    backup.size_bytes,
                    backup.created_at.to_rfc3339(),
                    destination.display()
                );
                println!("Re-run with --force to apply.");
                return Ok(false);
            }
            let result = engine
                .rollback_backup(&backup_path, &workspace, target.as_deref())
                .await?;
            println!("{}", result.message);
            for (kind, count) in &result.rolled_back {
                println!("  {kind}: {count}");
            }
            print_list("Errors", &result.errors);
            Ok(result.success)
        }
        MigrationAction::ListBackups { workspace } => {
            let backups = engine.list_backups(&BackupFilter {
                workspace_name: workspace,
                ..Default::default()
            })?;
            if backups.is_empty() {
                println!("No backups in {}", engine.backups().root().display());
            }
            for backup in backups {
                println!(
                    "{}  {:<9} {:<20} {:>10} bytes  {}",
                    backup.created_at.format("%Y-%m-%d %H:%M:%S"),
                    backup.backup_type.as_str(),
                    backup.workspace_name,
                    backup.size_bytes,
                    backup.backup_path.display()
                );
            }
            Ok(true)
        }
        MigrationAction::Cleanup { days } => {
            let summary = engine.cleanup_backups(days).await?;
            println!(
                "Removed {} backups older than {} days ({} bytes freed, {} failed)",
                summary.removed, days, summary.freed_bytes, summary.failed
            );
            Ok(summary.failed == 0)
        }
    }
}

fn print_result(result: &MigrationResult) {
    let status = if result.success { "succeeded" } else { "failed" };
    println!("Migration {status}: {}", result.message);
    println!(
        "  {} items migrated, {} errors, {} ms",
        result.migrated_count, result.error_count, result.duration_ms
    );
    if let Some(backup) = &result.backup_path {
        println!("  Backup: {}", backup.display());
    }
    print_list("Warnings", &result.warnings);
}

/// Print up to `WARNING_PREVIEW` lines, then a truncation notice
fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{title} ({}):", items.len());
    for item in items.iter().take(WARNING_PREVIEW) {
        println!("  - {item}");
    }
    if items.len() > WARNING_PREVIEW {
        println!(
            "  ... and {} more (use --output-report for the full list)",
            items.len() - WARNING_PREVIEW
        );
    }
}
