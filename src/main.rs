use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use video_saver::discovery::browser::{activate_overlays, ProbedVideo};
use video_saver::discovery::scanner::ScanReport;
use video_saver::{config, logging, BrowserProbe, ChannelBridge, MediaDiscoveryEngine, Normalizer, PageDom};

/// Finds playable video sources on web pages.
#[derive(Debug, Parser)]
#[command(name = "video-saver")]
#[command(about = "Discover downloadable video sources on web pages", long_about = None)]
struct Cli {
    /// Log discovery details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/video-saver/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a page in Chromium and report the sources offered for each video.
    Probe {
        /// Page URL (http or https).
        url: String,

        /// Show the browser window.
        #[arg(long)]
        headful: bool,

        /// Seconds to let the page load and play before taking the snapshot.
        #[arg(long, default_value = "8", value_name = "N")]
        settle_secs: u64,
    },

    /// Run discovery on a saved HTML file (embedded page data only).
    Scan {
        /// Path to the HTML file.
        path: PathBuf,

        /// URL the page was saved from, used to tell same-origin frames apart.
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },

    /// Print the normalized form of each URL, or `excluded` for audio tracks.
    Normalize {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct ScanOutput {
    scan: ScanReport,
    videos: Vec<ProbedVideo>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("video-saver error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Probe {
            url,
            headful,
            settle_secs,
        } => {
            let probe = BrowserProbe::new(!headful, Duration::from_secs(settle_secs), cfg);
            let report = probe
                .probe(&url)
                .await
                .with_context(|| format!("probe of {} failed", url))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Scan { path, base_url } => {
            let output = scan_file(&path, base_url.as_deref(), cfg)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Normalize { urls } => {
            let normalizer = Normalizer::new(cfg.normalizer);
            for url in urls {
                match normalizer.normalize(&url) {
                    Some(clean) => println!("{}", clean),
                    None => println!("excluded"),
                }
            }
        }
    }

    Ok(())
}

fn scan_file(path: &Path, base_url: Option<&str>, cfg: config::EngineConfig) -> Result<ScanOutput> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let base = base_url
        .map(url::Url::parse)
        .transpose()
        .context("invalid --base-url")?;

    let dom = PageDom::from_html(&html, base.as_ref());
    let (bridge, mut delivered) = ChannelBridge::new();
    let engine = MediaDiscoveryEngine::new(dom.clone(), dom.body(), Arc::new(bridge), cfg);

    let scan = engine.scan();
    let videos = activate_overlays(&dom, &mut delivered);
    tracing::debug!(file = %path.display(), videos = videos.len(), "scanned saved page");

    Ok(ScanOutput { scan, videos })
}
