use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use tracing_subscriber::EnvFilter;

use podkeeper::{
    AutoDownloadPolicy, CleanupPolicy, DownloadResult, EventReporter, ItemId, JsonLibrary,
    NoopReporter, PolicyConfig, PolicyContext, PolicyEvent, SharedEventReporter,
    StaticDeviceState,
};

// Emoji with fallback for terminals without Unicode support
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static DICE: Emoji<'_, '_> = Emoji("🎲 ", "[?] ");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[=] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static QUEUE: Emoji<'_, '_> = Emoji("🎧 ", "[+] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[ok] ");

/// Automatic download, cleanup and queue ordering for a podcast library
#[derive(Parser, Debug)]
#[command(name = "podkeeper")]
#[command(about = "Automatic download, cleanup and queue ordering for a podcast library")]
#[command(version)]
struct Args {
    /// Library file (JSON)
    library: PathBuf,

    /// Policy configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "podkeeper=trace"
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Quiet mode - suppress event output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one auto-download pass
    AutoDownload {
        /// Treat the network as unsuitable for automatic downloads
        #[arg(long)]
        offline: bool,

        /// Treat the device as charging
        #[arg(long)]
        charging: bool,
    },

    /// Delete played episodes from the episode cache
    Cleanup {
        /// Number of episodes to delete (default: the cache overflow)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Show how many episodes could be deleted
    Reclaimable,

    /// Add items to the queue
    Enqueue {
        /// Item ids to queue
        #[arg(required = true)]
        ids: Vec<u64>,

        /// Insert at the front of the queue
        #[arg(long)]
        front: bool,

        /// Keep a partially played front item in place
        #[arg(long)]
        keep_in_progress: bool,
    },

    /// Record how a requested download ended
    Finish {
        /// Item id of the download
        id: u64,

        /// Where the downloaded file was stored
        #[arg(long, required_unless_present = "failed", conflicts_with = "failed")]
        path: Option<PathBuf>,

        /// Mark the download as failed, with a reason
        #[arg(long)]
        failed: Option<String>,
    },
}

/// Prints policy events to the terminal
struct ConsoleReporter;

impl EventReporter for ConsoleReporter {
    fn report(&self, event: PolicyEvent) {
        match event {
            PolicyEvent::AutoDownloadSkipped { reason } => {
                println!("{PAUSE}Auto-download skipped: {}", reason.to_string().yellow());
            }

            PolicyEvent::CandidatesSelected {
                queue_len,
                new_items,
                candidates,
                non_auto_download,
            } => {
                println!(
                    "{SEARCH}{} queued, {} new • {} candidates, {} without auto-download",
                    queue_len.to_string().cyan(),
                    new_items.to_string().cyan(),
                    candidates.to_string().green(),
                    non_auto_download.to_string().dimmed()
                );
            }

            PolicyEvent::CleanupCompleted {
                requested,
                deleted,
                failed,
            } => {
                println!(
                    "{BROOM}Cleanup: {} of {} deleted{}",
                    deleted.to_string().green(),
                    requested.to_string().cyan(),
                    if failed > 0 {
                        format!(", {} failed", failed.to_string().red().bold())
                    } else {
                        String::new()
                    }
                );
            }

            PolicyEvent::DownloadsRequested { count } => {
                println!("{DOWNLOAD}{} episodes requested", count.to_string().green().bold());
            }

            PolicyEvent::DispatchFailed { error } => {
                println!("{FAILURE}{}", error.red());
            }

            PolicyEvent::CourtesyDownloadRequested { item_title } => {
                println!("{DICE}Also trying: {}", item_title.bold());
            }

            PolicyEvent::ItemEnqueued { item, position } => {
                println!("{QUEUE}{} queued at position {}", item, position.to_string().cyan());
            }
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = match &args.config {
        Some(path) => PolicyConfig::from_json_file(path).context("Failed to load config")?,
        None => PolicyConfig::default(),
    };

    let library = JsonLibrary::open(&args.library).context("Failed to open library")?;

    let reporter: SharedEventReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(ConsoleReporter)
    };

    let now = Utc::now();

    match args.command {
        Command::AutoDownload { offline, charging } => {
            let device = StaticDeviceState::new(!offline, charging);
            let ctx = PolicyContext {
                reader: &library,
                writer: &library,
                requester: &library,
                device: &device,
                reporter: &*reporter,
            };

            let outcome = AutoDownloadPolicy::new(&config)
                .run(&ctx, now, &mut rand::rng())
                .await
                .context("Auto-download pass failed")?;

            if !args.quiet && outcome.skipped.is_none() && outcome.requested.is_empty() {
                println!("{DOWNLOAD}{}", "Nothing to download".dimmed());
            }
        }

        Command::Cleanup { count } => {
            let policy = CleanupPolicy::new(config.days_after_playback);
            let outcome = match count {
                Some(count) => policy.perform_cleanup(&library, &library, count, now).await,
                None => {
                    policy
                        .default_cleanup(&library, &library, config.cache_size, now)
                        .await
                }
            }
            .context("Cleanup failed")?;

            reporter.report(PolicyEvent::CleanupCompleted {
                requested: outcome.requested,
                deleted: outcome.deleted,
                failed: outcome.failures.len(),
            });

            if !args.quiet {
                for (item, error) in &outcome.failures {
                    println!("  {FAILURE}{} - {}", item, error.dimmed());
                }
            }
        }

        Command::Reclaimable => {
            let count = CleanupPolicy::new(config.days_after_playback)
                .reclaimable_count(&library, now)
                .await
                .context("Failed to read library")?;
            println!("{BROOM}{} episodes can be deleted", count.to_string().cyan().bold());
        }

        Command::Enqueue {
            ids,
            front,
            keep_in_progress,
        } => {
            let mut options = config.enqueue;
            options.enqueue_at_front |= front;
            options.keep_in_progress_at_front |= keep_in_progress;

            let ids: Vec<ItemId> = ids.into_iter().map(ItemId).collect();
            let placed = library
                .enqueue(&ids, options)
                .context("Failed to enqueue items")?;

            for (item, position) in placed {
                reporter.report(PolicyEvent::ItemEnqueued { item, position });
            }
        }

        Command::Finish { id, path, failed } => {
            let item = ItemId(id);
            let result = match (path, failed) {
                (_, Some(reason)) => DownloadResult::Failed { reason },
                (Some(local_path), None) => DownloadResult::Completed { local_path },
                (None, None) => anyhow::bail!("Either --path or --failed is required"),
            };
            let failed = matches!(result, DownloadResult::Failed { .. });

            library
                .finish_download(item, result, now)
                .context("Failed to record download result")?;

            if !args.quiet {
                if failed {
                    println!("{FAILURE}{} marked as failed", item);
                } else {
                    println!("{SUCCESS}{} downloaded", item);
                }
            }
        }
    }

    library.save().context("Failed to save library")?;

    if !args.quiet {
        println!(
            "\n{FOLDER}Library: {}\n",
            args.library.display().to_string().cyan()
        );
    }

    Ok(())
}
