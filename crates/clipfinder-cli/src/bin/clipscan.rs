//! clipscan - match a query against segments already on disk
//!
//! Usage: clipscan <query_audio> <segments_dir> [--stem <prefix>] [--ext m4a]

use anyhow::{Context, Result};
use clap::Parser;
use clipfinder_cli::output::{bin_index_from_stem, print_scan_results, ScanRecord};
use clipfinder_core::audio::find_segment_files;
use clipfinder_core::matching::{ArgmaxPolicy, MatcherConfig, StartPolicy};
use clipfinder_core::{Decoder, FileDecoder, SignalMatcher, Waveform};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "clipscan")]
#[command(about = "Match a query clip against downloaded segment files", long_about = None)]
struct Args {
    /// Query audio file
    query: PathBuf,

    /// Directory holding the segment files
    segments_dir: PathBuf,

    /// Only files whose name starts with this prefix
    #[arg(long, default_value = "")]
    stem: String,

    /// Segment file extension
    #[arg(long, default_value = "m4a")]
    ext: String,

    /// Keep every n-th decoded sample
    #[arg(long, default_value_t = 100)]
    downsample: u32,

    /// Correlation acceptance threshold
    #[arg(long, default_value_t = clipfinder_core::DEFAULT_MATCH_THRESHOLD)]
    threshold: f64,

    /// Restrict the argmax to values above the threshold
    #[arg(long)]
    inds: bool,

    /// Derive the start from the correlation lag
    #[arg(long)]
    lags: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Warn)
            .init();
    }

    run_clipscan(&args)
}

fn run_clipscan(args: &Args) -> Result<()> {
    if !args.segments_dir.is_dir() {
        anyhow::bail!("Invalid directory: {}", args.segments_dir.display());
    }

    let decoder = FileDecoder::new(args.downsample);
    let query = decoder
        .decode(&args.query)
        .with_context(|| format!("Query unavailable: {}", args.query.display()))?;

    let matcher = SignalMatcher::new(MatcherConfig {
        threshold: args.threshold,
        argmax: if args.inds {
            ArgmaxPolicy::Inds
        } else {
            ArgmaxPolicy::Whole
        },
        start: if args.lags {
            StartPolicy::Lags
        } else {
            StartPolicy::Query
        },
        ..Default::default()
    });
    matcher.config().validate()?;

    let files = find_segment_files(&args.segments_dir, &args.stem, &args.ext)?;
    log::info!(
        "Found {} segment files, matching in parallel...",
        files.len()
    );

    let start = std::time::Instant::now();
    let mut results: Vec<ScanRecord> = files
        .par_iter()
        .map(|path| scan_file(&decoder, &matcher, &query, path))
        .collect();
    results.sort_by(|a, b| {
        a.bin_index
            .cmp(&b.bin_index)
            .then_with(|| a.path.cmp(&b.path))
    });
    log::info!("Matched {} files in {:.2}s", results.len(), start.elapsed().as_secs_f64());

    print_scan_results(&args.query.display().to_string(), &results);
    Ok(())
}

fn scan_file(
    decoder: &FileDecoder,
    matcher: &SignalMatcher,
    query: &Waveform,
    path: &Path,
) -> ScanRecord {
    let bin_index = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(bin_index_from_stem);

    let outcome = decoder.decode(path).and_then(|segment| {
        let query = query.resampled(segment.rate())?;
        Ok(matcher.find(&segment, &query)?)
    });

    match outcome {
        Ok(result) => {
            log::debug!("{}: peak {:.4}", path.display(), result.peak());
            ScanRecord {
                path: path.display().to_string(),
                bin_index,
                result: Some(result),
                error: None,
            }
        }
        Err(e) => {
            log::warn!("Failed to match {}: {:#}", path.display(), e);
            ScanRecord {
                path: path.display().to_string(),
                bin_index,
                result: None,
                error: Some(format!("{:#}", e)),
            }
        }
    }
}
