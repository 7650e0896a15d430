//! clipfind - locate a short clip inside a long video or recording
//!
//! Usage:
//!   clipfind --config clipfinder.toml
//!   clipfind --source <url> --query <clip.m4a> [--start 00:05:00] [--stop 00:30:00]
//!   clipfind --source <url> --query-url <url> --query-start 1:40 --query-stop 2:00

use anyhow::{Context, Result};
use clap::Parser;
use clipfinder_cli::output::print_report;
use clipfinder_core::acquisition::{AcquisitionConfig, Backend};
use clipfinder_core::config::{FinderConfig, QueryConfig, SourceConfig};
use clipfinder_core::planner::BinOrderSpec;
use clipfinder_core::{
    AcquisitionGateway, FfmpegGateway, FileDecoder, LocalMetadata, MetadataSource, SearchOrchestrator,
    SearchReport, SegmentPlanner, SignalMatcher, YtDlpGateway, YtDlpMetadata,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "clipfind")]
#[command(about = "Find where a short audio clip occurs in long media", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source URL or local file (overrides [source].locator)
    #[arg(short, long)]
    source: Option<String>,

    /// Search start timestamp
    #[arg(long)]
    start: Option<String>,

    /// Search stop timestamp
    #[arg(long)]
    stop: Option<String>,

    /// Local query clip
    #[arg(short, long)]
    query: Option<PathBuf>,

    /// Remote query URL, fetched between --query-start and --query-stop
    #[arg(long)]
    query_url: Option<String>,

    #[arg(long)]
    query_start: Option<String>,

    #[arg(long)]
    query_stop: Option<String>,

    /// Bin order: linear, mirrored, random, or a comma separated index list
    #[arg(long)]
    order: Option<String>,

    /// Initial number of bins
    #[arg(long)]
    nbins: Option<usize>,

    /// Downloads per dispatch window
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// 1-based plan position to start from
    #[arg(long)]
    start_bin: Option<usize>,

    /// Last plan position to probe
    #[arg(long)]
    max_bin: Option<usize>,

    /// Per-segment wait budget in seconds
    #[arg(long)]
    max_wait: Option<u64>,

    /// Segment directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Cut segments from a local file with ffmpeg instead of yt-dlp
    #[arg(long)]
    local: bool,

    /// Delete segment files after comparison
    #[arg(long)]
    discard_files: bool,

    /// Write the report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the confidence trace as CSV
    #[arg(long)]
    trace_csv: Option<PathBuf>,

    /// Write the candidates as CSV
    #[arg(long)]
    candidates_csv: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the JSON report, logs go to stderr
    let level = if args.debug {
        log::LevelFilter::Debug
    } else if args.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = build_config(&args)?;
    let report = run_clipfind(&config)?;

    if report.candidates.is_empty() {
        log::warn!("No match found in {} probed bins", report.trace.len());
    }
    print_report(&report);

    if let Some(path) = &args.json {
        report.write_json(path)?;
    }
    if let Some(path) = &args.trace_csv {
        report.write_trace_csv(path)?;
    }
    if let Some(path) = &args.candidates_csv {
        report.write_candidates_csv(path)?;
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<FinderConfig> {
    let mut config = match &args.config {
        Some(path) => load_unvalidated(path)?,
        None => FinderConfig {
            source: SourceConfig::default(),
            query: QueryConfig::default(),
            planner: Default::default(),
            matcher: Default::default(),
            dispatch: Default::default(),
            acquisition: AcquisitionConfig::default(),
        },
    };

    if let Some(source) = &args.source {
        config.source.locator = source.clone();
    }
    if args.start.is_some() {
        config.source.start = args.start.clone();
    }
    if args.stop.is_some() {
        config.source.stop = args.stop.clone();
    }

    if let Some(query) = &args.query {
        config.query.path = Some(query.clone());
    }
    if let Some(url) = &args.query_url {
        config.query.path = None;
        config.query.url = Some(url.clone());
    }
    if args.query_start.is_some() {
        config.query.start = args.query_start.clone();
    }
    if args.query_stop.is_some() {
        config.query.stop = args.query_stop.clone();
    }

    if let Some(order) = &args.order {
        config.planner.order = parse_order(order)?;
    }
    if let Some(nbins) = args.nbins {
        config.planner.nbins = nbins;
    }

    if let Some(n) = args.max_concurrent {
        config.dispatch.max_concurrent = n;
    }
    if let Some(n) = args.start_bin {
        config.dispatch.start_bin = n;
    }
    if let Some(n) = args.max_bin {
        config.dispatch.max_bin = n;
    }
    if let Some(secs) = args.max_wait {
        config.dispatch.max_wait_secs = secs;
    }
    if args.discard_files {
        config.dispatch.keep_files = false;
    }

    if let Some(dir) = &args.data_dir {
        config.acquisition.data_dir = dir.clone();
    }
    if args.local {
        config.acquisition.backend = Backend::Ffmpeg;
    }

    config.validate()?;
    Ok(config)
}

fn load_unvalidated(path: &Path) -> Result<FinderConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    Ok(FinderConfig::from_toml_str(&content)?)
}

fn parse_order(text: &str) -> Result<BinOrderSpec> {
    if text.contains(',') || text.trim().chars().all(|c| c.is_ascii_digit()) {
        let indices = text
            .split(',')
            .map(|s| s.trim().parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid bin index list: {}", text))?;
        Ok(BinOrderSpec::Explicit(indices))
    } else {
        Ok(BinOrderSpec::Named(text.to_string()))
    }
}

fn run_clipfind(config: &FinderConfig) -> Result<SearchReport> {
    let acquisition = &config.acquisition;
    match acquisition.backend {
        Backend::Ytdlp => search(
            config,
            YtDlpGateway::new(acquisition),
            &YtDlpMetadata::new(acquisition),
        ),
        Backend::Ffmpeg => search(config, FfmpegGateway::new(acquisition), &LocalMetadata),
    }
}

fn search<G: AcquisitionGateway>(
    config: &FinderConfig,
    gateway: G,
    metadata: &dyn MetadataSource,
) -> Result<SearchReport> {
    let range = config.source.range()?;
    let query = config.query.source()?;
    let planner = SegmentPlanner::new(config.planner.clone())?;
    let decoder = FileDecoder::new(config.acquisition.downsample_factor);

    let orchestrator = SearchOrchestrator::new(
        config.source.locator.clone(),
        gateway,
        decoder,
        SignalMatcher::new(config.matcher.clone()),
        config.dispatch.clone(),
    )?;

    let start = std::time::Instant::now();
    let plan = orchestrator.plan(metadata, &planner, range)?;
    log::info!("{} bins of {}s planned", plan.len(), plan.bin_width());

    let query_waveform = orchestrator
        .resolve_query(&query)
        .with_context(|| format!("Query {}", query.describe()))?;
    log::info!(
        "Query: {:.1}s at {} Hz",
        query_waveform.duration_secs(),
        query_waveform.rate()
    );

    let outcome = orchestrator.search_plan(&plan, &query_waveform)?;
    log::info!("Search finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(SearchReport::new(
        config.source.locator.clone(),
        query.describe(),
        plan.bin_width(),
        &outcome,
    ))
}
