//! Arena Rating Simulator
//!
//! Command-line workload driver for the arena rating service: seeds a
//! subject population, pushes concurrent pool admissions and match
//! settlements through the service, then reports the resulting rating
//! landscape. The workload is deterministic for a given argument set.
//!
//! Usage:
//!   cargo run --bin arena-simulator -- --subjects 64 --matches 200
//!   cargo run --bin arena-simulator -- --category 2v2 --snapshot ratings.json
//!   cargo run --bin arena-simulator -- --dry-run

use anyhow::Result;
use arena_rating::config::AppConfig;
use arena_rating::persistence::InMemoryPersistence;
use arena_rating::service::RatingService;
use arena_rating::types::{Category, PoolAdmissionRequest, SubjectId};
use arena_rating::utils;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Arena Rating Simulator - concurrent workload driver for the rating service
#[derive(Parser)]
#[command(
    name = "arena-simulator",
    version,
    about = "Drives concurrent admissions and settlements through the arena rating service",
    long_about = "The simulator wires up the full rating service over an in-memory persistence \
                 port, seeds a deterministic subject population, and exercises pool admission \
                 and match settlement from concurrent tasks. Useful for eyeballing rating \
                 convergence, relaxation behavior, and the metrics surface."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without simulating")]
    dry_run: bool,

    /// Size of the simulated subject population
    #[arg(long, default_value = "64", help = "Distinct subjects (minimum 16)")]
    subjects: u64,

    /// Number of matches to settle
    #[arg(long, default_value = "200")]
    matches: usize,

    /// Concurrent settlement workers
    #[arg(long, default_value = "8")]
    workers: usize,

    /// Matchmaking queues to drive admissions through
    #[arg(long, default_value = "4")]
    queues: usize,

    /// Admission attempts per queue
    #[arg(long, default_value = "8")]
    groups: usize,

    /// Restrict the workload to one category (2v2, 3v3, 5v5, battleground)
    #[arg(long, value_name = "CATEGORY")]
    category: Option<String>,

    /// Write the persisted ratings as JSON after the final flush
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Print the Prometheus metrics dump at the end
    #[arg(long)]
    print_metrics: bool,
}

/// One persisted rating, flattened for the JSON snapshot
#[derive(Serialize)]
struct SnapshotEntry {
    subject: SubjectId,
    category: String,
    rating: f64,
    deviation: f64,
    volatility: f64,
    matches_played: u32,
    wins: u32,
    losses: u32,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn parse_category(category: &str) -> Result<Category> {
    match category.to_lowercase().as_str() {
        "2v2" => Ok(Category::TwoVTwo),
        "3v3" => Ok(Category::ThreeVThree),
        "5v5" => Ok(Category::FiveVFive),
        "battleground" | "bg" => Ok(Category::Battleground),
        _ => Err(anyhow::anyhow!(
            "Invalid category '{}'. Use '2v2', '3v3', '5v5' or 'battleground'",
            category
        )),
    }
}

/// Load and merge configuration from file/environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    Ok(config)
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig, args: &Args) {
    info!("🚀 Arena Rating Simulator");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Defaults: rating {} / RD {} / volatility {}",
        config.rating.initial_rating, config.rating.initial_deviation, config.rating.initial_volatility
    );
    info!("   System tau: {}", config.rating.system_tau);
    info!(
        "   Workload: {} subjects, {} matches on {} workers, {} queues x {} groups",
        args.subjects, args.matches, args.workers, args.queues, args.groups
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Categories the workload rotates through
fn workload_categories(args: &Args) -> Result<Vec<Category>> {
    match &args.category {
        Some(name) => Ok(vec![parse_category(name)?]),
        None => Ok(Category::ALL.to_vec()),
    }
}

/// Deterministic disjoint sides for the m-th match
///
/// Windows of 2k consecutive subject ids (mod population) are distinct as
/// long as the population is at least twice the largest team size.
fn match_sides(m: usize, subjects: u64, category: Category) -> (Vec<SubjectId>, Vec<SubjectId>) {
    let k = u64::from(category.team_size().unwrap_or(5));
    let base = (m as u64).wrapping_mul(2 * k + 1) % subjects;
    let pick = |offset: u64| (base + offset) % subjects + 1;

    let side_a: Vec<SubjectId> = (0..k).map(pick).collect();
    let side_b: Vec<SubjectId> = (k..2 * k).map(pick).collect();

    // Rotate who wins so ratings spread out instead of stratifying
    if m % 3 == 0 {
        (side_b, side_a)
    } else {
        (side_a, side_b)
    }
}

/// Candidate group for the q-th queue's n-th admission attempt
fn candidate_group(q: usize, attempt: usize, subjects: u64, category: Category) -> Vec<SubjectId> {
    let k = u64::from(category.team_size().unwrap_or(5));
    let base = ((q as u64).wrapping_mul(31) + (attempt as u64).wrapping_mul(k)) % subjects;
    (0..k).map(|offset| (base + offset) % subjects + 1).collect()
}

/// Drive admissions for one queue; returns (admitted, rejected, errors)
async fn run_queue(
    service: Arc<RatingService>,
    q: usize,
    category: Category,
    attempts: usize,
    subjects: u64,
) -> (usize, usize, usize) {
    let queue_id = utils::generate_queue_id();
    let mut pooled: u32 = 0;
    let mut admitted = 0;
    let mut rejected = 0;
    let mut errors = 0;

    for attempt in 0..attempts {
        let candidates = candidate_group(q, attempt, subjects, category);
        let group_size = candidates.len() as u32;
        let request = PoolAdmissionRequest {
            queue_id,
            category,
            candidates,
            current_pool_size: pooled,
            queue_time_seconds: (attempt as u64) * 7,
        };

        match service.can_admit(&request) {
            Ok(true) => {
                pooled += group_size;
                admitted += 1;
            }
            Ok(false) => rejected += 1,
            Err(e) => {
                error!("Admission request failed on queue {}: {}", q, e);
                errors += 1;
            }
        }

        // Let other queues interleave
        tokio::task::yield_now().await;
    }

    (admitted, rejected, errors)
}

/// Settle this worker's share of the matches; returns (settled, players, errors)
async fn run_settlement_worker(
    service: Arc<RatingService>,
    worker: usize,
    workers: usize,
    matches: usize,
    subjects: u64,
    categories: Arc<Vec<Category>>,
) -> (usize, usize, usize) {
    let mut settled = 0;
    let mut players = 0;
    let mut errors = 0;

    let mut m = worker;
    while m < matches {
        let category = categories[m % categories.len()];
        let (winners, losers) = match_sides(m, subjects, category);

        match service.settle(category, &winners, &losers) {
            Ok(outcome) => {
                settled += 1;
                players += outcome.players_updated;
            }
            Err(e) => {
                error!("Match {} failed to settle: {}", m, e);
                errors += 1;
            }
        }

        m += workers;
        tokio::task::yield_now().await;
    }

    (settled, players, errors)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config, &args);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without simulating");
        return Ok(());
    }

    if args.subjects < 16 {
        anyhow::bail!("--subjects must be at least 16 to keep match sides disjoint");
    }
    if args.matches == 0 || args.workers == 0 {
        anyhow::bail!("--matches and --workers must be at least 1");
    }

    let categories = Arc::new(workload_categories(&args)?);
    let persistence = Arc::new(InMemoryPersistence::new());

    let service = match RatingService::new(config.clone(), persistence.clone()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to initialize rating service: {}", e);
            std::process::exit(1);
        }
    };
    service.start().await;

    // A handful of veterans get explicit default records up front; everyone
    // else materializes lazily on first contact
    let veterans = args.subjects.min(8);
    info!("Seeding {} veteran subject(s)", veterans);
    for subject in 1..=veterans {
        for &category in categories.iter() {
            service.initialize(subject, category)?;
        }
    }

    // Phase 1: pool admissions, one task per queue
    info!("Running admission phase across {} queue(s)...", args.queues);
    let mut queue_tasks = Vec::new();
    for q in 0..args.queues {
        let category = categories[q % categories.len()];
        queue_tasks.push(tokio::spawn(run_queue(
            service.clone(),
            q,
            category,
            args.groups,
            args.subjects,
        )));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    let mut admission_errors = 0;
    for task in queue_tasks {
        let (a, r, e) = task.await?;
        admitted += a;
        rejected += r;
        admission_errors += e;
    }

    // Phase 2: match settlements on concurrent workers
    info!(
        "Running settlement phase: {} matches on {} worker(s)...",
        args.matches, args.workers
    );
    let mut worker_tasks = Vec::new();
    for worker in 0..args.workers {
        worker_tasks.push(tokio::spawn(run_settlement_worker(
            service.clone(),
            worker,
            args.workers,
            args.matches,
            args.subjects,
            categories.clone(),
        )));
    }

    let mut settled = 0;
    let mut players_updated = 0;
    let mut settlement_errors = 0;
    for task in worker_tasks {
        let (s, p, e) = task.await?;
        settled += s;
        players_updated += p;
        settlement_errors += e;
    }

    println!("\n📊 Simulation results:");
    println!(
        "  Matches settled: {} ({} players updated, {} errors)",
        settled, players_updated, settlement_errors
    );
    println!(
        "  Admissions: {} admitted, {} rejected, {} errors",
        admitted, rejected, admission_errors
    );
    println!(
        "  Cached ratings: {}",
        service.cache_size().unwrap_or(0)
    );
    println!(
        "  Tracked pools: {}",
        service.tracked_pools().unwrap_or(0)
    );
    for &category in categories.iter() {
        let all: Vec<SubjectId> = (1..=args.subjects).collect();
        if let Ok(average) = service.average_rating(&all, category) {
            println!("  Average rating in {}: {:.1}", category, average);
        }
    }

    // Shutdown flushes the cache through the persistence port
    info!("Shutting down...");
    match tokio::time::timeout(config.shutdown_timeout(), service.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown completed with error: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    let mut rows = persistence.rows();
    rows.sort_by(|a, b| {
        b.1.rating
            .partial_cmp(&a.1.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    println!("\n🏆 Top rated ({} persisted rows):", rows.len());
    for (key, row) in rows.iter().take(5) {
        println!(
            "  Subject {} in {}: {:.0} (RD {:.0}, {}W/{}L)",
            key.subject, key.category, row.rating, row.deviation, row.wins, row.losses
        );
    }

    if let Some(path) = &args.snapshot {
        let entries: Vec<SnapshotEntry> = rows
            .iter()
            .map(|(key, row)| SnapshotEntry {
                subject: key.subject,
                category: key.category.to_string(),
                rating: row.rating,
                deviation: row.deviation,
                volatility: row.volatility,
                matches_played: row.matches_played,
                wins: row.wins,
                losses: row.losses,
            })
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&entries)?)?;
        println!("💾 Snapshot written to {}", path.display());
    }

    if args.print_metrics {
        println!("\n{}", service.metrics().gather_text()?);
    }

    Ok(())
}
