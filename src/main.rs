use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;

use podkeep::{
    DownloadStore, EpisodeRow, FeedCache, ProgressBoard, ReqwestClient, ViewComposer, compose,
    run_download,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Fetch a podcast feed, download episodes, and keep playback state
#[derive(Parser, Debug)]
#[command(name = "podkeep")]
#[command(about = "Fetch a podcast feed, download episodes, and keep playback state")]
#[command(version)]
struct Args {
    /// Directory holding downloaded audio and the downloads database
    #[arg(short, long, default_value = "podkeep", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh the feed and list every episode with its download state
    List {
        /// RSS feed URL
        feed: String,
    },

    /// Download episodes that are not downloaded yet
    Download {
        /// RSS feed URL
        feed: String,

        /// Maximum number of episodes to download
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum number of concurrent downloads
        #[arg(short = 'c', long, default_value = "3")]
        concurrent: usize,
    },

    /// Show recorded downloads and playback positions
    Status {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the record for one enclosure URL
    Delete {
        /// Enclosure URL of the record to remove
        enclosure_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!(
        "\n{}{} {}\n",
        MICROPHONE,
        "podkeep".bold().magenta(),
        "- Podcast Downloader".dimmed()
    );

    std::fs::create_dir_all(&args.dir)
        .with_context(|| format!("Failed to create {}", args.dir.display()))?;
    let store = Arc::new(
        DownloadStore::open(&args.dir.join("downloads.db"))
            .context("Failed to open downloads database")?,
    );

    match args.command {
        Command::List { feed } => cmd_list(&feed, &store).await,
        Command::Download {
            feed,
            limit,
            concurrent,
        } => cmd_download(&feed, limit, concurrent, &args.dir, store).await,
        Command::Status { json } => cmd_status(&store, json),
        Command::Delete { enclosure_url } => cmd_delete(&enclosure_url, &store).await,
    }
}

async fn cmd_list(feed: &str, store: &DownloadStore) -> Result<()> {
    let client = ReqwestClient::new();
    let cache = FeedCache::new(feed);

    println!("{SEARCH}Fetching feed: {}", feed.cyan());
    cache
        .refresh(&client)
        .await
        .context("Failed to refresh feed")?;

    let items = cache.items().borrow().clone();
    let records = store.observe_all().borrow().clone();
    let rows = compose(&items, &records, &HashMap::new());

    for (index, row) in rows.iter().enumerate() {
        let marker = if row.is_downloaded {
            SUCCESS.to_string()
        } else if !row.episode.is_downloadable() {
            format!("{FAILURE}")
        } else {
            "   ".to_string()
        };

        let title = row.episode.display_title();
        let note = if row.is_downloaded {
            row.local_ref.clone().unwrap_or_default().dimmed()
        } else if !row.episode.is_downloadable() {
            "no enclosure".dimmed()
        } else {
            "".dimmed()
        };

        println!("{:>3}. {marker}{} {note}", index + 1, title.bold());
    }

    println!(
        "\n{} episodes, {} downloaded",
        rows.len().to_string().cyan(),
        rows.iter()
            .filter(|r| r.is_downloaded)
            .count()
            .to_string()
            .green()
    );

    Ok(())
}

async fn cmd_download(
    feed: &str,
    limit: Option<usize>,
    concurrent: usize,
    dir: &PathBuf,
    store: Arc<DownloadStore>,
) -> Result<()> {
    let client = ReqwestClient::new();
    let cache = FeedCache::new(feed);

    println!("{SEARCH}Fetching feed: {}", feed.cyan());
    let total = cache
        .refresh(&client)
        .await
        .context("Failed to refresh feed")?;

    let board = Arc::new(ProgressBoard::new());
    let (composer, rows_rx) =
        ViewComposer::new(cache.items(), store.observe_all(), board.subscribe());
    let composer_task = tokio::spawn(composer.run());
    let render_task = tokio::spawn(render_progress(rows_rx));

    let items = cache.items().borrow().clone();
    let mut skipped = 0usize;
    let mut to_download = Vec::new();
    for episode in items {
        let Some(url) = episode.enclosure_url.clone() else {
            continue;
        };
        let already = store
            .get(&url)
            .await?
            .is_some_and(|record| record.is_downloaded);
        if already {
            skipped += 1;
        } else {
            to_download.push(episode);
        }
    }
    if let Some(limit) = limit {
        to_download.truncate(limit);
    }

    let results: Vec<_> = futures::stream::iter(to_download.into_iter().map(|episode| {
        let client = client.clone();
        let store = store.clone();
        let board = board.clone();
        let dir = dir.clone();
        async move {
            let outcome = run_download(&client, &episode, &dir, &store, &board).await;
            (episode, outcome)
        }
    }))
    .buffer_unordered(concurrent.max(1))
    .collect()
    .await;

    // Closing the feed and board channels winds down the composer and renderer
    drop(cache);
    drop(board);
    let _ = composer_task.await;
    let _ = render_task.await;

    let downloaded = results.iter().filter(|(_, r)| r.is_ok()).count();
    let failed: Vec<_> = results
        .iter()
        .filter_map(|(episode, result)| result.as_ref().err().map(|e| (episode, e)))
        .collect();

    println!(
        "\n{} {} downloaded, {} already present, {} failed ({} in feed)",
        "Done:".bold().green(),
        downloaded.to_string().green().bold(),
        skipped.to_string().yellow(),
        if failed.is_empty() {
            failed.len().to_string().green()
        } else {
            failed.len().to_string().red().bold()
        },
        total.to_string().cyan(),
    );

    for (episode, error) in &failed {
        println!(
            "  {FAILURE}{} - {}",
            episode.display_title().yellow(),
            error.to_string().dimmed()
        );
    }

    println!("\n{FOLDER}Output: {}\n", dir.display().to_string().cyan());

    if downloaded == 0 && !failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

/// Render live download progress from composed rows using indicatif bars
async fn render_progress(mut rows_rx: watch::Receiver<Vec<EpisodeRow>>) {
    const BAR_SCALE: u64 = 1000;

    let multi = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template(&format!("  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{wide_msg}}"))
        .unwrap()
        .progress_chars("█▓░");

    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    loop {
        {
            let rows = rows_rx.borrow_and_update();
            for row in rows.iter() {
                let Some(url) = row.episode.enclosure_url.as_deref() else {
                    continue;
                };

                if row.is_downloaded {
                    if let Some(bar) = bars.remove(url) {
                        bar.set_position(BAR_SCALE);
                        bar.finish_with_message(format!(
                            "{SUCCESS}{}",
                            row.episode.display_title().green()
                        ));
                    }
                    continue;
                }

                if row.progress != 0.0 {
                    let bar = bars.entry(url.to_string()).or_insert_with(|| {
                        let bar = multi.add(ProgressBar::new(BAR_SCALE));
                        bar.set_style(style.clone());
                        bar.set_message(row.episode.display_title().to_string());
                        bar
                    });
                    if row.progress < 0.0 {
                        // Unknown total size; show motion without a fraction
                        bar.tick();
                    } else {
                        bar.set_position((row.progress as f64 * BAR_SCALE as f64) as u64);
                    }
                }
            }
        }

        if rows_rx.changed().await.is_err() {
            break;
        }
    }

    for bar in bars.into_values() {
        bar.finish_and_clear();
    }
}

fn cmd_status(store: &DownloadStore, json: bool) -> Result<()> {
    let records = store.observe_all().borrow().clone();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No downloads recorded yet".dimmed());
        return Ok(());
    }

    for record in &records {
        let position = record
            .last_played_position()
            .map(format_position)
            .unwrap_or_else(|| "never played".to_string());

        println!(
            "{SUCCESS}{}\n     {} {}\n     {} {}",
            record.enclosure_url.bold(),
            "file:".dimmed(),
            record.local_ref,
            "position:".dimmed(),
            position.cyan(),
        );
    }

    println!("\n{} records", records.len().to_string().cyan());
    Ok(())
}

async fn cmd_delete(enclosure_url: &str, store: &DownloadStore) -> Result<()> {
    store
        .delete(enclosure_url)
        .await
        .context("Failed to delete record")?;
    println!("{SUCCESS}Removed record for {}", enclosure_url.cyan());
    Ok(())
}

fn format_position(position: std::time::Duration) -> String {
    let total_seconds = position.as_secs();
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
