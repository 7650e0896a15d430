//! JSON output formatting

use clipfinder_core::report::SearchReport;
use clipfinder_core::MatchResult;
use serde::Serialize;

/// Result of matching the query against one cached segment file
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub path: String,
    /// Bin index parsed from a `<stem>_<index>_<start>-<stop>` file name
    pub bin_index: Option<usize>,
    pub result: Option<MatchResult>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    query_path: &'a str,
    files: usize,
    detections: usize,
    results: &'a [ScanRecord],
}

/// Print the search report as pretty JSON
pub fn print_report(report: &SearchReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}

/// Print scan results with a detection count
pub fn print_scan_results(query_path: &str, results: &[ScanRecord]) {
    let detections = results
        .iter()
        .filter(|r| r.result.map(|m| m.is_match()).unwrap_or(false))
        .count();

    let output = ScanOutput {
        query_path,
        files: results.len(),
        detections,
        results,
    };

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results: {}", e),
    }
}

/// Bin index of a `{stem}_{index}_{start}-{stop}` segment file stem
pub fn bin_index_from_stem(stem: &str) -> Option<usize> {
    let (rest, range) = stem.rsplit_once('_')?;
    let (start, stop) = range.split_once('-')?;
    start.parse::<u64>().ok()?;
    stop.parse::<u64>().ok()?;
    let (_, index) = rest.rsplit_once('_')?;
    index.parse().ok()
}
