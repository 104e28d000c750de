use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use novelloader::browser::ChromiumSession;
use novelloader::config::Config;
use novelloader::links::load_chapter_links;
use novelloader::orchestrator::{CancelFlag, Orchestrator};
use novelloader::storage::{chapter_identity, StorageManager};

#[derive(Parser)]
#[command(name = "novelloader")]
#[command(about = "Resilient browser-driven web novel downloader")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every chapter in the link file that is not on disk yet
    Fetch {
        /// JSON array of {"title", "url", "sequenceIndex"?} records
        #[arg(short, long)]
        links: PathBuf,
    },
    /// Show which chapters of the link file are already downloaded
    Status {
        #[arg(short, long)]
        links: PathBuf,
    },
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Init => {
            if Path::new(&cli.config).exists() {
                info!("Configuration already exists at {}", cli.config);
            } else {
                Config::default().save(&cli.config)?;
                info!("Wrote default configuration to {}", cli.config);
            }
        }
        Commands::Fetch { links } => {
            let config = load_config(&cli.config)?;
            run_fetch(&config, &links).await?;
        }
        Commands::Status { links } => {
            let config = load_config(&cli.config)?;
            show_status(&config, &links).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!("novelloader={}", level))
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load(path).with_context(|| format!("failed to load {}", path))
    } else {
        warn!("No configuration at {}, using defaults", path);
        Ok(Config::default())
    }
}

async fn run_fetch(config: &Config, links_path: &Path) -> Result<()> {
    let links = load_chapter_links(links_path)
        .with_context(|| format!("cannot read chapter links from {:?}", links_path))?
        .into_vec();

    info!("📚 {} chapter(s) to process", links.len());

    let cancel = CancelFlag::new();
    let listener = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current chapter before exiting...");
            listener.cancel();
        }
    });

    let orchestrator = Orchestrator::new(config, cancel)?;
    let workers = config.acquisition.workers.clamp(1, links.len());

    let mut sessions = Vec::with_capacity(workers);
    for _ in 0..workers {
        let session = ChromiumSession::launch(&config.browser)
            .await
            .context("cannot start a browser session")?;
        sessions.push(session);
    }

    let summary = if workers == 1 {
        orchestrator.run(&links, &mut sessions[0]).await?
    } else {
        info!("Running {} workers", workers);
        orchestrator.run_partitioned(&links, &mut sessions).await?
    };

    for session in sessions {
        if let Err(e) = session.close().await {
            warn!("Browser did not shut down cleanly: {}", e);
        }
    }

    if summary.failed > 0 {
        error!("{} chapter(s) failed; run again to retry them", summary.failed);
    }
    Ok(())
}

async fn show_status(config: &Config, links_path: &Path) -> Result<()> {
    let links = load_chapter_links(links_path)?;
    let storage = StorageManager::new(&config.storage);

    println!("📚 Chapter Status:");
    println!("{:<6} {:<40} {:<12} {:<8}", "No.", "Title", "Status", "Images");
    println!("{}", "-".repeat(70));

    let mut downloaded = 0;
    for link in links.as_slice() {
        let identity = chapter_identity(link);
        let done = storage.chapter_exists(&identity).await;
        let images = storage.chapter_images(&identity).await?.len();
        if done {
            downloaded += 1;
        }

        println!(
            "{:<6} {:<40} {:<12} {:<8}",
            link.sequence_index,
            link.title,
            if done { "downloaded" } else { "missing" },
            images
        );
    }

    println!("{}", "-".repeat(70));
    println!("{}/{} downloaded", downloaded, links.len());
    Ok(())
}
