//! One-shot scanner for a saved marketplace page snapshot.
//!
//! Loads an HTML snapshot, runs the full protection pipeline against the
//! MarketShield API, prints a per-listing report, and optionally writes the
//! badge-annotated document and the updated scan history back to disk.

use anyhow::{bail, Context, Result};
use clap::Parser;
use marketshield::{
    is_supported_marketplace, run_protection, BackgroundRelay, HistoryStore, PageDom,
    ProtectionSettings, ScanState, ScanTracker, ShieldApi, WatcherConfig,
};
use serde::Serialize;
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "page_scan",
    about = "Scan a marketplace page snapshot for scam-risk signals"
)]
struct Cli {
    /// Path to a saved HTML page snapshot.
    page: PathBuf,

    /// URL the snapshot was captured from.
    #[arg(long, env = "MARKETSHIELD_PAGE_URL")]
    url: String,

    /// Base URL of the MarketShield scanning service.
    #[arg(
        long,
        env = "MARKETSHIELD_API_BASE",
        default_value = "http://localhost:5000"
    )]
    api_base: String,

    /// Write the badge-annotated document here.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Load and persist scan history at this path.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Skip badge injection, report only.
    #[arg(long, default_value_t = false)]
    no_badges: bool,

    /// Emit the report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Serialize)]
struct ReportEntry {
    url: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    risk_factors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Serialize)]
struct Report {
    page: String,
    authenticated: bool,
    summary: marketshield::TrackerSummary,
    listings: Vec<ReportEntry>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let local = LocalSet::new();
    runtime.block_on(local.run_until(run(cli)))
}

async fn run(cli: Cli) -> Result<()> {
    if !is_supported_marketplace(&cli.url) {
        bail!("not a supported marketplace URL: {}", cli.url);
    }
    let page_url = Url::parse(&cli.url).context("parsing --url")?;
    let api_base = Url::parse(&cli.api_base).context("parsing --api-base")?;
    let html = fs::read_to_string(&cli.page)
        .with_context(|| format!("reading {}", cli.page.display()))?;

    let settings = ProtectionSettings {
        show_safety_badges: !cli.no_badges,
        ..ProtectionSettings::default()
    };
    let mut relay = BackgroundRelay::new(ShieldApi::new(api_base)?, settings);
    if let Some(path) = &cli.history {
        if path.exists() {
            relay = relay.with_history(
                HistoryStore::load(path)
                    .with_context(|| format!("loading history from {}", path.display()))?,
            );
        }
    }
    let (handle, serve) = relay.spawn();

    let status = handle.get_user_status().await?;
    if !status.authenticated {
        tracing::warn!(
            error = status.error.as_deref().unwrap_or("no active session"),
            "not logged in; scans will be rejected"
        );
    }

    let dom = Rc::new(RefCell::new(PageDom::parse(&html, page_url)));
    // A snapshot never mutates: close the channel up front so the pipeline
    // runs its initial sweep and exits.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    drop(events_tx);
    let tracker = run_protection(
        Rc::clone(&dom),
        handle.clone(),
        WatcherConfig::default(),
        events_rx,
    )
    .await?;

    drop(handle);
    let history = serve.await.context("joining relay")?;
    if let Some(path) = &cli.history {
        history
            .persist(path)
            .with_context(|| format!("persisting history to {}", path.display()))?;
    }
    if let Some(out) = &cli.out {
        fs::write(out, dom.borrow().html())
            .with_context(|| format!("writing {}", out.display()))?;
    }

    emit_report(&cli, status.authenticated, &tracker)
}

fn emit_report(cli: &Cli, authenticated: bool, tracker: &ScanTracker) -> Result<()> {
    let mut listings: Vec<ReportEntry> = tracker
        .iter()
        .map(|(url, state)| match state {
            ScanState::Queued => ReportEntry {
                url: url.to_string(),
                status: "queued",
                rating: None,
                confidence: None,
                risk_factors: Vec::new(),
                reason: None,
            },
            ScanState::Completed(result) => ReportEntry {
                url: url.to_string(),
                status: "completed",
                rating: Some(result.safety_rating.as_str()),
                confidence: Some(result.confidence_score),
                risk_factors: result.risk_factors.clone(),
                reason: None,
            },
            ScanState::Failed(reason) => ReportEntry {
                url: url.to_string(),
                status: "failed",
                rating: None,
                confidence: None,
                risk_factors: Vec::new(),
                reason: Some(reason.clone()),
            },
        })
        .collect();
    listings.sort_by(|a, b| a.url.cmp(&b.url));

    let report = Report {
        page: cli.url.clone(),
        authenticated,
        summary: tracker.summary(),
        listings,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("MarketShield scan of {}", report.page);
    println!(
        "  listings: {} completed, {} failed, {} queued",
        report.summary.completed, report.summary.failed, report.summary.queued
    );
    for entry in &report.listings {
        match entry.status {
            "completed" => {
                println!(
                    "  {} -> {} ({}% confidence)",
                    entry.url,
                    entry.rating.unwrap_or("unknown"),
                    entry.confidence.unwrap_or(0)
                );
                for factor in &entry.risk_factors {
                    println!("      risk: {factor}");
                }
            }
            "failed" => println!(
                "  {} -> failed: {}",
                entry.url,
                entry.reason.as_deref().unwrap_or("unknown")
            ),
            _ => println!("  {} -> still queued", entry.url),
        }
    }
    Ok(())
}
