//! Clipfinder Core - locating a short audio clip inside long media
//!
//! The source is split into time bins, fetched a few bins at a time in the
//! background, and each segment is cross-correlated against the query until
//! the clip is found or the search budget runs out.

pub mod acquisition;
pub mod audio;
pub mod config;
pub mod error;
pub mod matching;
pub mod planner;
pub mod poll;
pub mod report;
pub mod search;
pub mod timecode;

pub use acquisition::{
    Acquisition, AcquisitionConfig, AcquisitionGateway, AcquisitionStatus, Backend,
    FfmpegGateway, LocalMetadata, MetadataSource, SegmentNaming, YtDlpGateway, YtDlpMetadata,
};
pub use audio::{Decoder, FileDecoder, Waveform};
pub use config::FinderConfig;
pub use error::{FinderError, Result};
pub use matching::{MatchResult, MatcherConfig, SignalMatcher, DEFAULT_MATCH_THRESHOLD};
pub use planner::{BinOrder, BinPlan, PlannerConfig, SegmentPlanner, TimeBin};
pub use poll::{PollOutcome, Poller};
pub use report::SearchReport;
pub use search::{
    DispatchConfig, QuerySource, SearchOrchestrator, SearchOutcome, SearchRange, SearchState,
    StopReason,
};
pub use timecode::{normalize_timestamp, parse_timestamp, seconds_to_text, text_to_seconds};
