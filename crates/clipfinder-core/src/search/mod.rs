//! End-to-end clip search over a bin plan
//!
//! A run moves through planning, dispatch, await-first, compare and decide.
//! Each dispatch window covers up to `max_concurrent` consecutive plan
//! positions; acquisitions run in the background while the control thread
//! compares bins in plan order, polling for segments as they arrive.

mod state;


pub use state::{BinStatus, Candidate, SearchOutcome, SearchState, StopReason, TraceSample};

use crate::acquisition::{
    Acquisition, AcquisitionGateway, AcquisitionStatus, MetadataSource, SegmentNaming,
};
use crate::audio::{Decoder, Waveform};
use crate::error::{FinderError, Result};
use crate::matching::SignalMatcher;
use crate::planner::{BinPlan, SegmentPlanner, TimeBin};
use crate::poll::Poller;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Dispatch-window and waiting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bins requested per dispatch window
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// 1-based plan position of the first window
    #[serde(default = "default_start_bin")]
    pub start_bin: usize,
    /// Last plan position that may be probed
    #[serde(default = "default_max_bin")]
    pub max_bin: usize,
    /// Per-bin wait budget
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Keep segment files after comparison
    #[serde(default = "default_true")]
    pub keep_files: bool,
    /// Reuse segment files left by an earlier run instead of fetching again
    #[serde(default = "default_true")]
    pub reuse_existing: bool,
    /// Stop at the first window that yields a candidate
    #[serde(default = "default_true")]
    pub stop_on_match: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            start_bin: default_start_bin(),
            max_bin: default_max_bin(),
            max_wait_secs: default_max_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            keep_files: true,
            reuse_existing: true,
            stop_on_match: true,
        }
    }
}

fn default_max_concurrent() -> usize {
    50
}
fn default_start_bin() -> usize {
    1
}
fn default_max_bin() -> usize {
    50
}
fn default_max_wait_secs() -> u64 {
    180
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(FinderError::config("dispatch.max_concurrent must be >= 1"));
        }
        if self.start_bin == 0 {
            return Err(FinderError::config("dispatch.start_bin is 1-based"));
        }
        if self.max_bin < self.start_bin {
            return Err(FinderError::config(format!(
                "dispatch.max_bin ({}) is below dispatch.start_bin ({})",
                self.max_bin, self.start_bin
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(FinderError::config("dispatch.poll_interval_ms must be > 0"));
        }
        Ok(())
    }

    pub fn poller(&self) -> Poller {
        Poller::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.max_wait_secs),
        )
    }
}

/// Where the query waveform comes from
#[derive(Debug, Clone)]
pub enum QuerySource {
    Inline(Waveform),
    LocalFile(PathBuf),
    /// A time range of a remote media item, fetched like a segment
    Remote { locator: String, start: u64, stop: u64 },
}

impl QuerySource {
    pub fn describe(&self) -> String {
        match self {
            QuerySource::Inline(w) => format!("inline waveform ({:.1}s)", w.duration_secs()),
            QuerySource::LocalFile(path) => path.display().to_string(),
            QuerySource::Remote {
                locator,
                start,
                stop,
            } => format!("{} [{}s-{}s]", locator, start, stop),
        }
    }
}

/// Portion of the source to search, in absolute seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchRange {
    pub start: u64,
    /// End of the range; the source duration when absent
    pub stop: Option<u64>,
}

enum Slot {
    /// Segment already on disk
    Present,
    Pending(Box<dyn Acquisition>),
    Failed(String),
}

struct Dispatched<'p> {
    bin: &'p TimeBin,
    /// 0-based plan position
    position: usize,
    discriminator: String,
    slot: Slot,
    waited: Duration,
}

/// Drives acquisition, decoding and matching for one source
pub struct SearchOrchestrator<G, D> {
    locator: String,
    naming: SegmentNaming,
    gateway: G,
    decoder: D,
    matcher: SignalMatcher,
    dispatch: DispatchConfig,
}

impl<G: AcquisitionGateway, D: Decoder> SearchOrchestrator<G, D> {
    pub fn new(
        locator: impl Into<String>,
        gateway: G,
        decoder: D,
        matcher: SignalMatcher,
        dispatch: DispatchConfig,
    ) -> Result<Self> {
        dispatch.validate()?;
        matcher.config().validate()?;
        let locator = locator.into();
        Ok(Self {
            naming: SegmentNaming::for_locator(&locator),
            locator,
            gateway,
            decoder,
            matcher,
            dispatch,
        })
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn dispatch(&self) -> &DispatchConfig {
        &self.dispatch
    }

    /// Plan, resolve the query, then search
    pub fn run(
        &self,
        metadata: &dyn MetadataSource,
        planner: &SegmentPlanner,
        range: SearchRange,
        query: &QuerySource,
    ) -> Result<SearchOutcome> {
        let plan = self.plan(metadata, planner, range)?;
        let query = self.resolve_query(query)?;
        self.search_plan(&plan, &query)
    }

    /// Planning phase
    pub fn plan(
        &self,
        metadata: &dyn MetadataSource,
        planner: &SegmentPlanner,
        range: SearchRange,
    ) -> Result<BinPlan> {
        let stop = match range.stop {
            Some(stop) => stop,
            None => {
                let duration =
                    metadata
                        .duration(&self.locator)
                        .map_err(|e| FinderError::MetadataFailure {
                            locator: self.locator.clone(),
                            message: format!("{:#}", e),
                        })?;
                log::info!("Source duration: {}s", duration);
                duration
            }
        };

        let duration = stop.checked_sub(range.start).filter(|&d| d > 0).ok_or_else(|| {
            FinderError::config(format!(
                "search range starts at {}s but ends at {}s",
                range.start, stop
            ))
        })?;

        log::info!("Planning {}s of {} from {}s", duration, self.locator, range.start);
        let plan = planner.plan(duration, range.start)?;
        for (position, line) in plan.describe().iter().enumerate() {
            log::debug!("{:>4}: {}", position + 1, line);
        }
        Ok(plan)
    }

    /// Turn the query source into a waveform before any searching
    pub fn resolve_query(&self, query: &QuerySource) -> Result<Waveform> {
        let unavailable = |message: String| FinderError::QueryUnavailable { message };

        match query {
            QuerySource::Inline(waveform) => Ok(waveform.clone()),
            QuerySource::LocalFile(path) => self
                .decoder
                .decode(path)
                .map_err(|e| unavailable(format!("{}: {:#}", path.display(), e))),
            QuerySource::Remote {
                locator,
                start,
                stop,
            } => {
                let discriminator = SegmentNaming::for_locator(locator).query(*start, *stop);
                let bin = TimeBin::new(0, *start, *stop);

                if !(self.dispatch.reuse_existing && self.gateway.exists(&discriminator)) {
                    log::info!("Fetching query {}", query.describe());
                    let mut handle = self
                        .gateway
                        .request(locator, &bin, &discriminator)
                        .map_err(|e| unavailable(format!("{:#}", e)))?;

                    let outcome = self
                        .dispatch
                        .poller()
                        .wait_until(|| handle.poll() != AcquisitionStatus::Pending);
                    if !outcome.is_ready() {
                        if let Err(e) = handle.cancel() {
                            log::warn!("Failed to cancel query download: {:#}", e);
                        }
                        self.purge(&discriminator);
                        return Err(unavailable(format!(
                            "download timed out after {}s: {}",
                            outcome.waited().as_secs(),
                            handle.drain_errors()
                        )));
                    }
                    if let AcquisitionStatus::Failed(reason) = handle.poll() {
                        self.purge(&discriminator);
                        return Err(unavailable(format!("{}: {}", reason, handle.drain_errors())));
                    }
                }

                let path = self.gateway.segment_path(&discriminator);
                self.decoder
                    .decode(&path)
                    .map_err(|e| unavailable(format!("{}: {:#}", path.display(), e)))
            }
        }
    }

    /// Search a plan from the configured start bin with an empty state
    pub fn search_plan(&self, plan: &BinPlan, query: &Waveform) -> Result<SearchOutcome> {
        self.resume(plan, query, SearchState::new(), self.dispatch.start_bin)
    }

    /// Continue a search at 1-based plan position `start_bin`
    pub fn resume(
        &self,
        plan: &BinPlan,
        query: &Waveform,
        mut state: SearchState,
        start_bin: usize,
    ) -> Result<SearchOutcome> {
        if start_bin == 0 {
            return Err(FinderError::config("start bin is 1-based"));
        }

        let limit = plan.len().min(self.dispatch.max_bin);
        let mut start_bin = start_bin;
        let mut windows = 0;

        let stop_reason = loop {
            if start_bin > limit {
                break if limit < plan.len() {
                    log::info!("Finished checking max bins: {}", self.dispatch.max_bin);
                    StopReason::MaxBinReached
                } else {
                    StopReason::PlanExhausted
                };
            }

            let len = self.dispatch.max_concurrent.min(limit - start_bin + 1);
            let window = plan.window(start_bin - 1, len);
            windows += 1;

            let found_before = state.candidates.len();
            self.search_window(window, start_bin - 1, query, &mut state)?;

            if self.dispatch.stop_on_match && state.candidates.len() > found_before {
                break StopReason::MatchFound;
            }
            start_bin += self.dispatch.max_concurrent;
        };

        log::info!(
            "Search stopped ({:?}) after {} window(s): {} candidate(s), {} bin(s) probed",
            stop_reason,
            windows,
            state.candidates.len(),
            state.probed()
        );

        Ok(SearchOutcome {
            state,
            plan_len: plan.len(),
            windows,
            stop_reason,
        })
    }

    /// Dispatch, await and compare one window of consecutive plan positions
    fn search_window(
        &self,
        window: &[TimeBin],
        first_position: usize,
        query: &Waveform,
        state: &mut SearchState,
    ) -> Result<()> {
        log::info!(
            "Dispatching plan positions {}..={}",
            first_position + 1,
            first_position + window.len()
        );
        let mut dispatched: Vec<Dispatched> = window
            .iter()
            .enumerate()
            .map(|(i, bin)| self.dispatch_bin(bin, first_position + i))
            .collect();

        let poller = self.dispatch.poller();

        // AwaitFirst
        if let Some(first) = dispatched
            .iter_mut()
            .find(|d| matches!(d.slot, Slot::Pending(_)))
        {
            log::info!("Waiting for first segment ({})", first.bin.describe());
            if let Slot::Pending(handle) = &mut first.slot {
                let outcome = poller.wait_until(|| handle.poll() != AcquisitionStatus::Pending);
                first.waited = outcome.waited();
            }
        } else {
            log::info!("All segments of this window already present");
        }

        let total = dispatched.len();
        for i in 0..total {
            let hit = self.compare(&mut dispatched[i], &poller, query, state)?;
            if hit && self.dispatch.stop_on_match {
                let rest = &mut dispatched[i + 1..];
                self.abandon(rest);
                break;
            }
        }
        Ok(())
    }

    fn dispatch_bin<'p>(&self, bin: &'p TimeBin, position: usize) -> Dispatched<'p> {
        let discriminator = self.naming.bin(bin);
        let mut slot = None;

        if self.gateway.exists(&discriminator) {
            if self.dispatch.reuse_existing {
                log::debug!("Reusing existing segment {}", discriminator);
                slot = Some(Slot::Present);
            } else if let Err(e) = self.gateway.remove(&discriminator) {
                log::warn!("Could not remove stale segment {}: {:#}", discriminator, e);
            }
        }

        let slot = slot.unwrap_or_else(|| {
            match self.gateway.request(&self.locator, bin, &discriminator) {
                Ok(handle) => Slot::Pending(handle),
                Err(e) => Slot::Failed(format!("{:#}", e)),
            }
        });

        Dispatched {
            bin,
            position,
            discriminator,
            slot,
            waited: Duration::ZERO,
        }
    }

    /// CompareLoop step for one bin. Returns true when the bin matched.
    fn compare(
        &self,
        entry: &mut Dispatched,
        poller: &Poller,
        query: &Waveform,
        state: &mut SearchState,
    ) -> Result<bool> {
        let bin = entry.bin;
        let waited = entry.waited;

        let acquired = match &mut entry.slot {
            Slot::Present => {
                if !self.gateway.exists(&entry.discriminator) {
                    return Err(FinderError::SegmentMissing {
                        bin: bin.index,
                        start: bin.start,
                        stop: bin.stop,
                        path: self.gateway.segment_path(&entry.discriminator),
                    });
                }
                Ok(())
            }
            Slot::Failed(reason) => Err(reason.clone()),
            Slot::Pending(handle) => {
                self.await_segment(handle.as_mut(), &entry.discriminator, waited, poller)
            }
        };

        if let Err(reason) = acquired {
            let error = FinderError::AcquisitionFailure {
                bin: bin.index,
                start: bin.start,
                stop: bin.stop,
                reason,
            };
            log::warn!("{}", error);
            state.record_failure(bin, BinStatus::AcquisitionFailed);
            self.purge(&entry.discriminator);
            return Ok(false);
        }

        let path = self.gateway.segment_path(&entry.discriminator);
        let matched = self
            .decoder
            .decode(&path)
            .map_err(|e| format!("{:#}", e))
            .and_then(|segment| self.match_segment(&segment, query).map_err(|e| e.to_string()));
        self.discard(&entry.discriminator);

        match matched {
            Ok(result) => {
                log::debug!(
                    "Bin {} ({}): peak {:.4}",
                    bin.index,
                    bin.describe(),
                    result.peak()
                );
                Ok(state.record(bin, &result))
            }
            Err(message) if entry.position == 0 => Err(FinderError::SourceUnavailable {
                locator: self.locator.clone(),
                start: bin.start,
                stop: bin.stop,
                message,
            }),
            Err(message) => {
                let error = FinderError::DecodeFailure { path, message };
                log::warn!("Bin {} skipped: {}", bin.index, error);
                state.record_failure(bin, BinStatus::DecodeFailed);
                Ok(false)
            }
        }
    }

    /// Wait for a pending acquisition; on timeout it is cancelled
    fn await_segment(
        &self,
        handle: &mut dyn Acquisition,
        discriminator: &str,
        waited: Duration,
        poller: &Poller,
    ) -> std::result::Result<(), String> {
        let budget = poller.budget().saturating_sub(waited);
        let outcome = poller
            .with_budget(budget)
            .wait_until(|| handle.poll() != AcquisitionStatus::Pending);

        if !outcome.is_ready() {
            if let Err(e) = handle.cancel() {
                log::warn!("Failed to cancel {}: {:#}", discriminator, e);
            }
            let errors = handle.drain_errors();
            return Err(format!(
                "timed out after {}s{}",
                (waited + outcome.waited()).as_secs(),
                with_errors(&errors)
            ));
        }

        match handle.poll() {
            AcquisitionStatus::Failed(reason) => {
                let errors = handle.drain_errors();
                Err(format!("{}{}", reason, with_errors(&errors)))
            }
            _ if !self.gateway.exists(discriminator) => {
                Err("acquisition finished without producing a segment".to_string())
            }
            _ => Ok(()),
        }
    }

    fn match_segment(
        &self,
        segment: &Waveform,
        query: &Waveform,
    ) -> Result<crate::matching::MatchResult> {
        if segment.rate() == query.rate() {
            return self.matcher.find(segment, query);
        }
        log::debug!(
            "Resampling query from {} Hz to {} Hz",
            query.rate(),
            segment.rate()
        );
        self.matcher.find(segment, &query.resampled(segment.rate())?)
    }

    /// Settle every entry left uncompared after an early stop. Running
    /// acquisitions are cancelled and their partial files removed; complete
    /// segments follow `keep_files`.
    fn abandon(&self, rest: &mut [Dispatched]) {
        for entry in rest {
            let complete = match &mut entry.slot {
                Slot::Present => true,
                Slot::Failed(_) => false,
                Slot::Pending(handle) => match handle.poll() {
                    AcquisitionStatus::Finished => true,
                    AcquisitionStatus::Failed(_) => {
                        handle.drain_errors();
                        false
                    }
                    AcquisitionStatus::Pending => {
                        log::debug!("Cancelling {}", entry.discriminator);
                        if let Err(e) = handle.cancel() {
                            log::warn!("Failed to cancel {}: {:#}", entry.discriminator, e);
                        }
                        handle.drain_errors();
                        false
                    }
                },
            };

            if complete {
                self.discard(&entry.discriminator);
            } else {
                self.purge(&entry.discriminator);
            }
        }
    }

    /// Remove a compared segment unless segments are kept
    fn discard(&self, discriminator: &str) {
        if !self.dispatch.keep_files {
            self.purge(discriminator);
        }
    }

    /// Remove a segment file unconditionally; a failed or cancelled
    /// acquisition may leave a truncated one behind
    fn purge(&self, discriminator: &str) {
        if let Err(e) = self.gateway.remove(discriminator) {
            log::warn!("Could not remove segment {}: {:#}", discriminator, e);
        }
    }
}

fn with_errors(errors: &str) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(": {}", errors)
    }
}
