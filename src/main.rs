use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backup_rotate::cli::{handle_list, handle_log, handle_prune, handle_run, RunArgs, RunStatus};
use backup_rotate::config::{paths::BackupPaths, settings::Settings};
use backup_rotate::error::{BackupError, EXIT_PARTIAL_FAILURE};

#[derive(Parser)]
#[command(
    name = "backup-rotate",
    version,
    about = "Timestamped tarball backups with mount checks and retention",
    long_about = "backup-rotate archives a fixed set of directories into a new \
                  timestamped folder under a backup root, then deletes the oldest \
                  folders beyond the retention count. Run it from a timer; without \
                  a subcommand it performs one backup run."
)]
struct Cli {
    /// Configuration directory
    #[arg(long, global = true, env = "BACKUP_ROTATE_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform one backup run (the default)
    Run(RunArgs),

    /// List existing backups, newest first
    #[command(alias = "ls")]
    List {
        /// Show full paths
        #[arg(short, long)]
        verbose: bool,
    },

    /// Delete backups beyond the retention count
    Prune {
        /// Actually delete; without this only a summary is shown
        #[arg(short, long)]
        force: bool,
    },

    /// Show the most recent run log lines
    Log {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration and paths
    Config,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<BackupError>()
                .map(BackupError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let paths = match cli.home {
        Some(home) => BackupPaths::with_base_dir(home),
        None => BackupPaths::new()?,
    };
    let mut settings = Settings::load_or_create(&paths)
        .with_context(|| format!("loading {}", paths.settings_file().display()))?;

    match cli.command {
        None => return run_backup(&paths, &settings),
        Some(Commands::Run(args)) => {
            args.apply(&mut settings);
            return run_backup(&paths, &settings);
        }
        Some(Commands::List { verbose }) => handle_list(&settings, verbose)?,
        Some(Commands::Prune { force }) => handle_prune(&paths, &settings, force)?,
        Some(Commands::Log { lines }) => handle_log(&paths, &settings, lines)?,
        Some(Commands::Init { force }) => {
            if paths.is_initialized() && !force {
                println!(
                    "Configuration already exists: {}",
                    paths.settings_file().display()
                );
                println!("Use --force to overwrite it with defaults.");
            } else {
                Settings::default().save(&paths)?;
                println!("Wrote default configuration: {}", paths.settings_file().display());
                println!("Edit it to set the backup root, sources and required mounts.");
            }
        }
        Some(Commands::Config) => {
            println!("backup-rotate Configuration");
            println!("===========================");
            println!("Config directory: {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Run log:          {}", settings.log_path(&paths).display());
            println!();
            println!("Settings:");
            println!("  Backup root:     {}", settings.root.display());
            println!("  Prefix:          {}", settings.prefix);
            println!("  Max backups:     {}", settings.max_backups);
            println!("  Archive timeout: {}s", settings.archive_timeout_secs);
            println!("  Fail on partial: {}", settings.fail_on_partial);
            println!("  Sources:");
            for source in &settings.sources {
                println!("    {}", source.display());
            }
            println!("  Required mounts:");
            for mount in &settings.required_mounts {
                println!("    {}", mount.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn run_backup(paths: &BackupPaths, settings: &Settings) -> Result<ExitCode> {
    let status = handle_run(paths, settings)?;

    if status == RunStatus::Partial && settings.fail_on_partial {
        return Ok(ExitCode::from(EXIT_PARTIAL_FAILURE));
    }
    Ok(ExitCode::SUCCESS)
}
