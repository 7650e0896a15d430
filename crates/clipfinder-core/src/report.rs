//! Structured records of a finished search, for JSON and CSV consumers

use crate::search::{SearchOutcome, StopReason};
use crate::timecode::seconds_to_text;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub start: u64,
    pub stop: u64,
    pub start_text: String,
    pub stop_text: String,
    pub confidence: f64,
    pub bin_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub time: f64,
    pub time_text: String,
    pub confidence: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub source: String,
    pub query: String,
    pub created_at: String,
    pub bin_width: u64,
    pub plan_len: usize,
    pub stop_reason: StopReason,
    pub candidates: Vec<CandidateRecord>,
    pub trace: Vec<TraceRecord>,
}

impl SearchReport {
    pub fn new(
        source: impl Into<String>,
        query: impl Into<String>,
        bin_width: u64,
        outcome: &SearchOutcome,
    ) -> Self {
        let candidates = outcome
            .state
            .candidates
            .iter()
            .map(|c| CandidateRecord {
                start: c.start,
                stop: c.stop,
                start_text: seconds_to_text(c.start),
                stop_text: seconds_to_text(c.stop),
                confidence: c.confidence,
                bin_index: c.bin_index,
            })
            .collect();

        let trace = outcome
            .state
            .trace
            .iter()
            .map(|s| TraceRecord {
                time: s.time,
                time_text: seconds_to_text(s.time.max(0.0).floor() as u64),
                confidence: s.confidence,
                status: s.status.as_str().to_string(),
            })
            .collect();

        Self {
            source: source.into(),
            query: query.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            bin_width,
            plan_len: outcome.plan_len,
            stop_reason: outcome.stop_reason,
            candidates,
            trace,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Confidence trace sorted by time, one row per probed bin
    pub fn write_trace_csv(&self, path: &Path) -> Result<()> {
        let mut rows: Vec<&TraceRecord> = self.trace.iter().collect();
        rows.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut out = create(path)?;
        writeln!(out, "time,time_text,confidence,status")?;
        for row in rows {
            writeln!(
                out,
                "{},{},{},{}",
                row.time, row.time_text, row.confidence, row.status
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_candidates_csv(&self, path: &Path) -> Result<()> {
        let mut out = create(path)?;
        writeln!(out, "start,stop,start_text,stop_text,confidence,bin_index")?;
        for c in &self.candidates {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                c.start, c.stop, c.start_text, c.stop_text, c.confidence, c.bin_index
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::TimeBin;
    use crate::search::{BinStatus, SearchState};
    use crate::matching::MatchResult;

    fn outcome() -> SearchOutcome {
        let mut state = SearchState::new();
        state.record(&TimeBin::new(5, 481, 600), &MatchResult::NoMatch { peak: 0.12 });
        state.record_failure(&TimeBin::new(4, 361, 480), BinStatus::AcquisitionFailed);
        state.record(
            &TimeBin::new(3, 241, 360),
            &MatchResult::Match {
                start_offset: 59,
                stop_offset: 79,
                peak: 0.98,
            },
        );
        SearchOutcome {
            state,
            plan_len: 5,
            windows: 1,
            stop_reason: StopReason::MatchFound,
        }
    }

    #[test]
    fn test_report_records() {
        let report = SearchReport::new("https://youtu.be/x", "clip.m4a", 120, &outcome());

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].start_text, "00:05:00");
        assert_eq!(report.candidates[0].stop_text, "00:05:20");
        assert_eq!(report.trace.len(), 3);
        assert_eq!(report.trace[1].status, "acquisition_failed");
        assert_eq!(report.trace[2].time_text, "00:05:00");
        assert!(chrono::DateTime::parse_from_rfc3339(&report.created_at).is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let report = SearchReport::new("src", "query", 120, &outcome());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"stop_reason\": \"match_found\""));
        let back: SearchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = SearchReport::new("src", "query", 120, &outcome());

        let trace_path = dir.path().join("trace.csv");
        report.write_trace_csv(&trace_path).unwrap();
        let trace = std::fs::read_to_string(&trace_path).unwrap();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines[0], "time,time_text,confidence,status");
        assert_eq!(lines.len(), 4);
        // sorted by time
        assert!(lines[1].starts_with("300.5,"));
        assert!(lines[3].starts_with("540.5,"));

        let candidates_path = dir.path().join("candidates.csv");
        report.write_candidates_csv(&candidates_path).unwrap();
        let candidates = std::fs::read_to_string(&candidates_path).unwrap();
        assert_eq!(
            candidates.lines().nth(1),
            Some("300,320,00:05:00,00:05:20,0.98,3")
        );

        let json_path = dir.path().join("report.json");
        report.write_json(&json_path).unwrap();
        assert!(json_path.is_file());
    }
}
