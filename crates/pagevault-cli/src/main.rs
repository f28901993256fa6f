//! `pagevault` developer CLI: inspect configuration and exercise the cache
//! under a concurrent workload.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pagevault_core::{
    CacheConfig, CacheStatsSummary, Config, MemoryPageStore, Page, PageCache, PageId, SessionId,
    SessionRegistry, VersionedPage,
};
use serde::Serialize;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pagevault")]
#[command(version, about = "Inspect and exercise the pagevault page cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },

    /// Run a concurrent workload against an in-memory store and verify reads
    Simulate {
        /// Number of sessions to create
        #[arg(long, default_value = "64")]
        sessions: usize,
        /// Worker threads sharing the sessions
        #[arg(long, default_value = "4")]
        threads: usize,
        /// Pages written per session
        #[arg(long, default_value = "32")]
        pages: u32,
        /// Versions written per page
        #[arg(long, default_value = "4")]
        versions: u32,
        /// Override the configured session bound
        #[arg(long)]
        max_sessions: Option<usize>,
        /// Override the configured per-session page bound
        #[arg(long)]
        max_pages_per_session: Option<usize>,
        /// Output format
        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

/// Shape of a simulated workload.
#[derive(Debug, Clone, Copy, Serialize)]
struct Workload {
    sessions: usize,
    threads: usize,
    pages: u32,
    versions: u32,
}

/// Outcome of [`run_simulation`].
#[derive(Debug, Serialize)]
struct SimulationReport {
    workload: Workload,
    cache: CacheConfig,
    writes: u64,
    reads: u64,
    mismatches: u64,
    elapsed_ms: u128,
    stats: CacheStatsSummary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Config { format } => show_config(format)?,
        Commands::Simulate {
            sessions,
            threads,
            pages,
            versions,
            max_sessions,
            max_pages_per_session,
            format,
        } => {
            let mut cache = Config::load().context("Failed to load configuration")?.cache;
            if let Some(bound) = max_sessions {
                cache.max_sessions = bound;
            }
            if let Some(bound) = max_pages_per_session {
                cache.max_pages_per_session = bound;
            }
            let workload = Workload {
                sessions,
                threads,
                pages,
                versions,
            };
            let report = run_simulation(workload, cache)?;
            print_report(&report, format)?;
            if report.mismatches > 0 {
                bail!("{} reads returned the wrong page", report.mismatches);
            }
        },
    }

    Ok(())
}

fn show_config(format: OutputFormat) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Pretty => {
            match Config::config_path() {
                Ok(path) if path.exists() => println!("# {}", path.display()),
                Ok(path) => println!("# {} (not found, using defaults)", path.display()),
                Err(e) => warn!("Could not determine config path: {e}"),
            }
            print!("{}", toml::to_string_pretty(&config)?);
        },
    }
    Ok(())
}

/// Write `versions` versions of `pages` pages into each session, read every
/// version back, then end each session.
fn run_simulation(workload: Workload, cache_config: CacheConfig) -> Result<SimulationReport> {
    if workload.threads == 0 {
        bail!("--threads must be at least 1");
    }
    if workload.versions == 0 {
        bail!("--versions must be at least 1");
    }
    cache_config.validate()?;

    let store = Arc::new(MemoryPageStore::<VersionedPage>::new());
    let cache = Arc::new(PageCache::<VersionedPage>::new(store, cache_config)?);
    let registry = SessionRegistry::new(Arc::clone(&cache));

    let writes = AtomicU64::new(0);
    let reads = AtomicU64::new(0);
    let mismatches = AtomicU64::new(0);

    info!(
        "Simulating {} sessions on {} threads ({} pages x {} versions)",
        workload.sessions, workload.threads, workload.pages, workload.versions
    );
    let started = Instant::now();

    std::thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..workload.threads)
            .map(|worker| {
                let registry = &registry;
                let counters = (&writes, &reads, &mismatches);
                scope.spawn(move || -> Result<()> {
                    for s in (worker..workload.sessions).step_by(workload.threads) {
                        drive_session(registry, s, workload, counters)?;
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => bail!("simulation worker panicked"),
            }
        }
        Ok(())
    })?;

    let elapsed = started.elapsed();
    let stats = cache.stats();
    registry.shutdown()?;

    Ok(SimulationReport {
        workload,
        cache: cache_config,
        writes: writes.into_inner(),
        reads: reads.into_inner(),
        mismatches: mismatches.into_inner(),
        elapsed_ms: elapsed.as_millis(),
        stats,
    })
}

fn drive_session(
    registry: &SessionRegistry<VersionedPage>,
    index: usize,
    workload: Workload,
    (writes, reads, mismatches): (&AtomicU64, &AtomicU64, &AtomicU64),
) -> Result<()> {
    let session = SessionId::from(format!("session-{index}"));
    let directory = registry.directory(&session, "main");

    for p in 0..workload.pages {
        let mut page = VersionedPage::new(p, expected_content(index, p, 0));
        directory.put(&page)?;
        for v in 1..workload.versions {
            page = page.next_version(expected_content(index, p, v));
            directory.put(&page)?;
        }
        writes.fetch_add(u64::from(workload.versions), Ordering::Relaxed);
    }

    for p in 0..workload.pages {
        for v in 0..workload.versions {
            let found = directory.get(&PageId::from(p), v.into())?;
            reads.fetch_add(1, Ordering::Relaxed);
            let expected = expected_content(index, p, v);
            let matches = found
                .as_ref()
                .is_some_and(|page| page.current_version() == v && page.content() == expected);
            if !matches {
                mismatches.fetch_add(1, Ordering::Relaxed);
                warn!("{session}: page {p} v{v} read back wrong");
            }
        }
    }

    registry.session_ended(&session)?;
    debug!("{session}: verified and ended");
    Ok(())
}

fn expected_content(session: usize, page: u32, version: u32) -> String {
    format!("session {session} page {page} version {version}")
}

fn print_report(report: &SimulationReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Pretty => {
            let Workload {
                sessions,
                threads,
                pages,
                versions,
            } = report.workload;
            println!(
                "Workload:   {sessions} sessions, {threads} threads, {pages} pages x {versions} versions"
            );
            println!(
                "Bounds:     {} sessions, {} pages per session",
                report.cache.max_sessions, report.cache.max_pages_per_session
            );
            println!(
                "Traffic:    {} writes, {} reads in {}",
                report.writes,
                report.reads,
                format_elapsed(report.elapsed_ms)
            );
            println!(
                "Cache:      {} hits, {} misses (hit rate {:.1}%)",
                report.stats.hits,
                report.stats.misses,
                report.stats.hit_rate * 100.0
            );
            println!(
                "Evictions:  {} sessions, {} pages",
                report.stats.session_evictions, report.stats.page_evictions
            );
            println!("Mismatches: {}", report.mismatches);
        },
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn format_elapsed(ms: u128) -> String {
    format!("{:.2?}", Duration::from_millis(ms as u64))
}
