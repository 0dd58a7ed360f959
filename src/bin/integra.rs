//! CLI binary for Integra's self-updater.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use integra::update::{UpdateInfo, UpdateState};
use integra::{
    CheckEvent, DownloadEvent, IntegraConfig, UpdateContext, UpdateCoordinator, Version,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Integra Client Manager updater.
#[derive(Parser)]
#[command(name = "integra", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Check the release index once.
    Check,

    /// Download and install the latest release.
    Update {
        /// Install without asking for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Never offer this version again.
    Skip {
        /// Version to skip, e.g. `1.2.0`.
        version: Version,
    },

    /// List skipped versions.
    Skipped,

    /// Print the running version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(IntegraConfig::default_config_path);
    let config = IntegraConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let _log_guard = integra::logging::init(&config.logging, &integra::app_dirs::logs_dir())?;

    match cli.command.unwrap_or(Command::Check) {
        Command::Check => run_check(config).await,
        Command::Update { yes } => run_update(config, yes).await,
        Command::Skip { version } => skip(config, &version),
        Command::Skipped => list_skipped(),
        Command::Version => {
            println!("Integra Client Manager v{}", Version::current());
            Ok(())
        }
    }
}

fn coordinator(config: IntegraConfig) -> anyhow::Result<UpdateCoordinator> {
    let ctx = UpdateContext::detect(config.update)?;
    Ok(UpdateCoordinator::new(ctx))
}

/// Run one check and wait for its event.
async fn check_once(coordinator: &mut UpdateCoordinator) -> Option<CheckEvent> {
    coordinator.check_for_update();
    coordinator.next_check_event().await
}

async fn run_check(config: IntegraConfig) -> anyhow::Result<()> {
    let mut coordinator = coordinator(config)?;
    println!("Integra Client Manager v{}", Version::current());

    match check_once(&mut coordinator).await {
        Some(CheckEvent::UpdateAvailable(info)) => {
            print_available(&info);
            println!("\nRun `integra update` to install it.");
        }
        Some(CheckEvent::NoUpdate) | None => println!("You are running the latest version."),
        Some(CheckEvent::CheckFailed(e)) => eprintln!("warning: could not check for updates: {e}"),
    }
    Ok(())
}

async fn run_update(config: IntegraConfig, yes: bool) -> anyhow::Result<()> {
    let mut coordinator = coordinator(config)?;

    let info = match check_once(&mut coordinator).await {
        Some(CheckEvent::UpdateAvailable(info)) => info,
        Some(CheckEvent::NoUpdate) | None => {
            println!("You are running the latest version.");
            return Ok(());
        }
        Some(CheckEvent::CheckFailed(e)) => bail!("could not check for updates: {e}"),
    };

    print_available(&info);
    if !yes {
        match prompt(&info)? {
            Answer::Install => {}
            Answer::Later => return Ok(()),
            Answer::Skip => {
                coordinator.skip_version(&info.version);
                println!("Version {} will not be offered again.", info.version);
                return Ok(());
            }
        }
    }

    let Some(downloader) = coordinator.download_update(info) else {
        bail!("an update download is already in progress");
    };
    let mut task = downloader.start()?;

    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("  [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}")
    {
        pb.set_style(style);
    }

    while let Some(event) = task.next_event().await {
        match event {
            DownloadEvent::Progress {
                bytes_downloaded,
                total_bytes,
            } => {
                if let Some(total) = total_bytes {
                    pb.set_length(total);
                }
                pb.set_position(bytes_downloaded);
            }
            DownloadEvent::ExtractionStarted => {
                pb.finish();
                println!("Extracting update...");
            }
            DownloadEvent::InstallationStarted => println!("Installing update..."),
            DownloadEvent::Completed { script } => {
                println!("Update installed. Integra will restart shortly.");
                tracing::debug!(script = %script.display(), "exiting for swap");
                tokio::time::sleep(Duration::from_secs(1)).await;
                return Ok(());
            }
            DownloadEvent::Failed { message } => {
                pb.abandon();
                bail!("update failed: {message}");
            }
        }
    }

    bail!("update worker stopped without a result")
}

fn print_available(info: &UpdateInfo) {
    println!(
        "A new version is available: v{} (you have v{})",
        info.version,
        Version::current()
    );
    let notes = info.release_notes.trim();
    if !notes.is_empty() {
        println!("\nWhat's new:\n{notes}");
    }
}

enum Answer {
    Install,
    Later,
    Skip,
}

fn prompt(info: &UpdateInfo) -> anyhow::Result<Answer> {
    print!("\nInstall v{} now? [y]es / [N]o / [s]kip this version: ", info.version);
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Install,
        "s" | "skip" => Answer::Skip,
        _ => Answer::Later,
    })
}

fn skip(config: IntegraConfig, version: &Version) -> anyhow::Result<()> {
    if !config.update.persist_skipped_versions {
        eprintln!(
            "warning: skipped versions are not persisted; set `update.persist_skipped_versions = true` in the config"
        );
        return Ok(());
    }
    let mut coordinator = coordinator(config)?;
    coordinator.skip_version(version);
    println!("Version {version} will not be offered again.");
    Ok(())
}

fn list_skipped() -> anyhow::Result<()> {
    let state = UpdateState::load();
    if state.skipped_versions.is_empty() {
        println!("No skipped versions.");
    }
    for version in &state.skipped_versions {
        println!("{version}");
    }
    if let Some(at) = state.last_check {
        println!("Last checked: {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}
