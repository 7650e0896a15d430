//! Accumulated results of a search run

use crate::matching::MatchResult;
use crate::planner::TimeBin;
use serde::{Deserialize, Serialize};

/// What happened when a bin was probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinStatus {
    Match,
    Miss,
    AcquisitionFailed,
    DecodeFailed,
}

impl BinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinStatus::Match => "match",
            BinStatus::Miss => "miss",
            BinStatus::AcquisitionFailed => "acquisition_failed",
            BinStatus::DecodeFailed => "decode_failed",
        }
    }
}

/// One probed bin: its midpoint in absolute seconds and the peak correlation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    pub time: f64,
    pub confidence: f64,
    pub bin_index: usize,
    pub status: BinStatus,
}

/// A located occurrence of the query, in absolute source seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub start: u64,
    pub stop: u64,
    pub confidence: f64,
    pub bin_index: usize,
}

/// Confidence trace and candidates, threaded through every search phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub trace: Vec<TraceSample>,
    pub candidates: Vec<Candidate>,
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    /// Bins probed so far, including failed ones
    pub fn probed(&self) -> usize {
        self.trace.len()
    }

    /// Record a compared bin. Match offsets are relative to the bin start;
    /// the candidate is stored in absolute time. Returns true on a match.
    pub fn record(&mut self, bin: &TimeBin, result: &MatchResult) -> bool {
        let status = match *result {
            MatchResult::Match {
                start_offset,
                stop_offset,
                peak,
            } => {
                self.candidates.push(Candidate {
                    start: absolute(bin.start, start_offset),
                    stop: absolute(bin.start, stop_offset),
                    confidence: peak,
                    bin_index: bin.index,
                });
                BinStatus::Match
            }
            MatchResult::NoMatch { .. } => BinStatus::Miss,
        };

        self.trace.push(TraceSample {
            time: bin.midpoint(),
            confidence: result.peak(),
            bin_index: bin.index,
            status,
        });
        status == BinStatus::Match
    }

    /// Record a bin that could not be compared; it counts as a zero-confidence miss
    pub fn record_failure(&mut self, bin: &TimeBin, status: BinStatus) {
        self.trace.push(TraceSample {
            time: bin.midpoint(),
            confidence: 0.0,
            bin_index: bin.index,
            status,
        });
    }
}

fn absolute(bin_start: u64, offset: i64) -> u64 {
    if offset >= 0 {
        bin_start.saturating_add(offset as u64)
    } else {
        bin_start.saturating_sub(offset.unsigned_abs())
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MatchFound,
    MaxBinReached,
    PlanExhausted,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub state: SearchState,
    pub plan_len: usize,
    /// Dispatch windows processed
    pub windows: usize,
    pub stop_reason: StopReason,
}
