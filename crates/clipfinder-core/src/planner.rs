//! Segment planning
//!
//! Splits a source duration into fixed-width time bins and orders them by
//! search priority. Bin `i` (1-based) spans `((i-1)*w + 1, i*w)` seconds of
//! the clipped range; bin 1 is the leading bin and is always part of the plan.

use crate::error::{FinderError, Result};
use crate::timecode::seconds_to_text;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// One candidate window of the source, in absolute seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBin {
    /// Chronological bin number (1-based)
    pub index: usize,
    pub start: u64,
    pub stop: u64,
}

impl TimeBin {
    pub fn new(index: usize, start: u64, stop: u64) -> Self {
        Self { index, start, stop }
    }

    pub fn midpoint(&self) -> f64 {
        (self.start + self.stop) as f64 / 2.0
    }

    /// Number of whole seconds covered, both ends included
    pub fn width(&self) -> u64 {
        self.stop - self.start + 1
    }

    pub fn describe(&self) -> String {
        format!("{} - {}", seconds_to_text(self.start), seconds_to_text(self.stop))
    }

    fn shifted(self, delta: u64) -> Self {
        Self {
            index: self.index,
            start: self.start + delta,
            stop: self.stop + delta,
        }
    }
}

/// Traversal strategy for the bins of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinOrder {
    Linear,
    /// Outward from the median bin; the leading bin goes last
    Mirrored,
    Random { seed: Option<u64> },
    /// Caller-supplied bin indices (1-based)
    Explicit(Vec<usize>),
}

impl FromStr for BinOrder {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(BinOrder::Linear),
            "mirrored" => Ok(BinOrder::Mirrored),
            "random" => Ok(BinOrder::Random { seed: None }),
            other => Err(FinderError::config(format!(
                "bin order must be one of [linear, mirrored, random] or a list of indices, not {:?}",
                other
            ))),
        }
    }
}

/// Bin order as written in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinOrderSpec {
    Named(String),
    Explicit(Vec<usize>),
}

impl Default for BinOrderSpec {
    fn default() -> Self {
        BinOrderSpec::Named("mirrored".to_string())
    }
}

/// Segment planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Initial number of bins; the final count follows from the clamped width
    #[serde(default = "default_nbins")]
    pub nbins: usize,
    #[serde(default)]
    pub order: BinOrderSpec,
    /// Round-robin stride applied after ordering (0 disables)
    #[serde(default)]
    pub skip_interleave: usize,
    #[serde(default = "default_min_binwidth")]
    pub min_binwidth: u64,
    #[serde(default = "default_max_binwidth")]
    pub max_binwidth: u64,
    /// Seconds trimmed from both ends of the source
    #[serde(default)]
    pub edge_clip: u64,
    /// Add a tail bin for the remainder that does not fill a whole bin
    #[serde(default = "default_cover_tail")]
    pub cover_tail: bool,
    /// Seed for `random` ordering
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            nbins: default_nbins(),
            order: BinOrderSpec::default(),
            skip_interleave: 0,
            min_binwidth: default_min_binwidth(),
            max_binwidth: default_max_binwidth(),
            edge_clip: 0,
            cover_tail: default_cover_tail(),
            seed: None,
        }
    }
}

fn default_nbins() -> usize {
    10
}
fn default_min_binwidth() -> u64 {
    30
}
fn default_max_binwidth() -> u64 {
    120
}
fn default_cover_tail() -> bool {
    true
}

impl PlannerConfig {
    /// Resolve the configured order
    pub fn bin_order(&self) -> Result<BinOrder> {
        match &self.order {
            BinOrderSpec::Named(name) => match name.parse()? {
                BinOrder::Random { .. } => Ok(BinOrder::Random { seed: self.seed }),
                order => Ok(order),
            },
            BinOrderSpec::Explicit(indices) => Ok(BinOrder::Explicit(indices.clone())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.nbins == 0 {
            return Err(FinderError::config("planner.nbins must be > 0"));
        }
        if self.min_binwidth < 2 {
            return Err(FinderError::config("planner.min_binwidth must be >= 2"));
        }
        if self.min_binwidth > self.max_binwidth {
            return Err(FinderError::config(format!(
                "planner.min_binwidth ({}) must be <= planner.max_binwidth ({})",
                self.min_binwidth, self.max_binwidth
            )));
        }
        self.bin_order()?;
        Ok(())
    }
}

/// Ordered sequence of bins; position encodes search priority
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinPlan {
    bins: Vec<TimeBin>,
    bin_width: u64,
    effective_duration: u64,
    offset: u64,
}

impl BinPlan {
    pub fn bins(&self) -> &[TimeBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&TimeBin> {
        self.bins.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeBin> {
        self.bins.iter()
    }

    pub fn bin_width(&self) -> u64 {
        self.bin_width
    }

    /// Duration left after edge clipping
    pub fn effective_duration(&self) -> u64 {
        self.effective_duration
    }

    /// Absolute seconds added to every planned bin (edge clip plus start delta)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Up to `len` bins starting at plan position `start` (0-based)
    pub fn window(&self, start: usize, len: usize) -> &[TimeBin] {
        let start = start.min(self.bins.len());
        let end = start.saturating_add(len).min(self.bins.len());
        &self.bins[start..end]
    }

    pub fn describe(&self) -> Vec<String> {
        self.bins.iter().map(TimeBin::describe).collect()
    }
}

/// Partitions a duration into an ordered [`BinPlan`]
pub struct SegmentPlanner {
    config: PlannerConfig,
    order: BinOrder,
}

impl SegmentPlanner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        let order = config.bin_order()?;
        Ok(Self { config, order })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan bins over `duration` seconds. `start_delta` is added to every
    /// bin on top of the edge clip.
    pub fn plan(&self, duration: u64, start_delta: u64) -> Result<BinPlan> {
        let clip = self.config.edge_clip;
        let effective = duration
            .checked_sub(clip.saturating_mul(2))
            .filter(|&d| d > 0)
            .ok_or_else(|| {
                FinderError::config(format!(
                    "edge clip of {}s leaves nothing of a {}s source",
                    clip, duration
                ))
            })?;

        let raw_width = effective / self.config.nbins as u64;
        let width = raw_width.clamp(self.config.min_binwidth, self.config.max_binwidth);
        let nbins = (effective / width) as usize;
        let offset = clip + start_delta;

        log::info!(
            "nbins: {:<8} binwidth: {:>8} start offset: {:>8}",
            nbins,
            width,
            offset
        );

        if nbins == 0 {
            if effective < 2 {
                return Err(FinderError::config(format!(
                    "effective duration of {}s is too short to plan",
                    effective
                )));
            }
            return Ok(BinPlan {
                bins: vec![TimeBin::new(1, 1, effective).shifted(offset)],
                bin_width: effective,
                effective_duration: effective,
                offset,
            });
        }

        let mut chronological: Vec<TimeBin> = (1..=nbins)
            .map(|i| TimeBin::new(i, (i as u64 - 1) * width + 1, i as u64 * width))
            .collect();

        let remainder = effective - nbins as u64 * width;
        let mut tail = None;
        if self.config.cover_tail && remainder > 0 {
            if remainder == 1 {
                // A one-second remainder cannot form a bin of its own
                if let Some(last) = chronological.last_mut() {
                    last.stop = effective;
                }
            } else {
                tail = Some(TimeBin::new(nbins + 1, nbins as u64 * width + 1, effective));
            }
        }

        let mut order = self.ordered_indices(nbins, tail.is_some())?;
        if self.config.skip_interleave > 0 {
            order = skip_interleave(&order, self.config.skip_interleave)?;
        }
        if let Some(tail) = tail {
            if !order.contains(&tail.index) {
                order.push(tail.index);
            }
            chronological.push(tail);
        }

        let bins = order
            .into_iter()
            .map(|i| chronological[i - 1].shifted(offset))
            .collect::<Vec<_>>();

        log::debug!("Bin order: {:?}", bins.iter().map(|b| b.index).collect::<Vec<_>>());

        Ok(BinPlan {
            bins,
            bin_width: width,
            effective_duration: effective,
            offset,
        })
    }

    /// Bin indices in search priority order. The tail bin, if any, is only
    /// placed here when an explicit order names it.
    fn ordered_indices(&self, nbins: usize, has_tail: bool) -> Result<Vec<usize>> {
        let order = match &self.order {
            BinOrder::Linear => (1..=nbins).collect(),
            BinOrder::Mirrored => {
                let mut order = mirrored_order(2, nbins);
                order.push(1);
                order
            }
            BinOrder::Random { seed } => {
                let mut order: Vec<usize> = (1..=nbins).collect();
                match seed {
                    Some(seed) => order.shuffle(&mut StdRng::seed_from_u64(*seed)),
                    None => order.shuffle(&mut rand::thread_rng()),
                }
                log::info!("Shuffled bin indices: {:?}", order);
                order
            }
            BinOrder::Explicit(requested) => {
                let upper = if has_tail { nbins + 1 } else { nbins };
                let mut seen = HashSet::new();
                let mut order = Vec::with_capacity(requested.len() + 1);
                for &index in requested {
                    if index < 1 || index > upper {
                        log::warn!("Dropping bin index {} outside [1, {}]", index, upper);
                        continue;
                    }
                    if !seen.insert(index) {
                        log::warn!("Dropping duplicate bin index {}", index);
                        continue;
                    }
                    order.push(index);
                }
                if !seen.contains(&1) {
                    order.insert(0, 1);
                }
                order
            }
        };
        Ok(order)
    }
}

/// Indices `first..=last` starting at their median and alternating outward:
/// `median, median-1, median+1, median-2, ...`
pub fn mirrored_order(first: usize, last: usize) -> Vec<usize> {
    if first > last {
        return Vec::new();
    }

    let median = (first + last) / 2;
    let mut order = vec![median];
    let mut step = 1;
    while median >= first + step || median + step <= last {
        if median >= first + step {
            order.push(median - step);
        }
        if median + step <= last {
            order.push(median + step);
        }
        step += 1;
    }
    order
}

/// Reorder into `skip` round-robin strides: `[0::skip] ++ [1::skip] ++ ...`
pub fn skip_interleave(indices: &[usize], skip: usize) -> Result<Vec<usize>> {
    if skip == 0 {
        return Ok(indices.to_vec());
    }

    let mut out = Vec::with_capacity(indices.len());
    for lane in 0..skip {
        out.extend(indices.iter().skip(lane).step_by(skip).copied());
    }

    if out.len() != indices.len() {
        return Err(FinderError::config(format!(
            "number of bins does not match before ({}) and after ({}) applying skip size {}",
            indices.len(),
            out.len(),
            skip
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(order: BinOrderSpec, min: u64, max: u64, nbins: usize) -> SegmentPlanner {
        SegmentPlanner::new(PlannerConfig {
            nbins,
            order,
            min_binwidth: min,
            max_binwidth: max,
            ..Default::default()
        })
        .unwrap()
    }

    fn named(name: &str) -> BinOrderSpec {
        BinOrderSpec::Named(name.to_string())
    }

    #[test]
    fn test_mirrored_order_seven() {
        assert_eq!(mirrored_order(1, 7), vec![4, 3, 5, 2, 6, 1, 7]);
    }

    #[test]
    fn test_mirrored_order_even_and_degenerate() {
        assert_eq!(mirrored_order(1, 4), vec![2, 1, 3, 4]);
        assert_eq!(mirrored_order(2, 2), vec![2]);
        assert!(mirrored_order(2, 1).is_empty());
    }

    #[test]
    fn test_skip_interleave_is_permutation() {
        let indices: Vec<usize> = vec![4, 3, 5, 2, 6, 1, 7, 9, 8];
        for skip in 1..12 {
            let mut out = skip_interleave(&indices, skip).unwrap();
            assert_eq!(out.len(), indices.len());
            out.sort_unstable();
            assert_eq!(out, (1..=9).collect::<Vec<_>>());
        }
        assert_eq!(
            skip_interleave(&[1, 2, 3, 4, 5, 6], 2).unwrap(),
            vec![1, 3, 5, 2, 4, 6]
        );
    }

    #[test]
    fn test_linear_plan_layout() {
        let plan = planner(named("linear"), 30, 120, 10).plan(600, 0).unwrap();
        assert_eq!(plan.bin_width(), 60);
        assert_eq!(plan.len(), 10);
        assert_eq!(plan.bins()[0], TimeBin::new(1, 1, 60));
        assert_eq!(plan.bins()[1], TimeBin::new(2, 61, 120));
        assert_eq!(plan.bins()[9], TimeBin::new(10, 541, 600));
    }

    #[test]
    fn test_mirrored_plan_puts_leading_bin_last() {
        let plan = planner(named("mirrored"), 30, 120, 5).plan(600, 0).unwrap();
        let order: Vec<usize> = plan.iter().map(|b| b.index).collect();
        assert_eq!(order, vec![3, 2, 4, 5, 1]);
    }

    #[test]
    fn test_width_clamped_and_count_recomputed() {
        // 1000 / 100 = 10 < 30 -> width 30, 33 bins, 10s tail
        let plan = planner(named("linear"), 30, 120, 100).plan(1000, 0).unwrap();
        assert_eq!(plan.bin_width(), 30);
        assert_eq!(plan.len(), 34);
        assert_eq!(plan.bins()[33], TimeBin::new(34, 991, 1000));

        // 10000 / 10 = 1000 > 120 -> width 120
        let plan = planner(named("linear"), 30, 120, 10).plan(10_000, 0).unwrap();
        assert_eq!(plan.bin_width(), 120);
    }

    #[test]
    fn test_coverage_and_width_bounds() {
        for &(duration, nbins, min_w, max_w) in &[
            (600u64, 5usize, 30u64, 120u64),
            (601, 5, 30, 120),
            (602, 7, 30, 150),
            (3725, 10, 30, 120),
            (95, 10, 30, 120),
            (7200, 3, 45, 90),
        ] {
            for order in ["linear", "mirrored", "random"] {
                let plan = planner(named(order), min_w, max_w, nbins)
                    .plan(duration, 0)
                    .unwrap();
                let nfull = (duration / plan.bin_width()) as usize;

                let mut bins = plan.bins().to_vec();
                bins.sort_by_key(|b| b.start);
                assert_eq!(bins[0].start, 1);
                assert_eq!(bins.last().unwrap().stop, duration);
                for pair in bins.windows(2) {
                    assert_eq!(pair[0].stop + 1, pair[1].start, "gap or overlap in {:?}", pair);
                }

                for bin in &bins {
                    assert!(bin.start < bin.stop);
                    // the leading bin and the remainder bin are exempt
                    if bin.index == 1 || bin.index > nfull {
                        continue;
                    }
                    let span = bin.stop - bin.start;
                    assert!(
                        span + 1 >= min_w && span <= max_w,
                        "bin {:?} outside [{}, {}] for {}s",
                        bin,
                        min_w,
                        max_w,
                        duration
                    );
                }
            }
        }
    }

    #[test]
    fn test_edge_clip_and_start_delta() {
        let config = PlannerConfig {
            nbins: 4,
            order: named("linear"),
            edge_clip: 20,
            ..Default::default()
        };
        let plan = SegmentPlanner::new(config).unwrap().plan(280, 100).unwrap();
        assert_eq!(plan.effective_duration(), 240);
        assert_eq!(plan.offset(), 120);
        assert_eq!(plan.bins()[0], TimeBin::new(1, 121, 180));
        assert_eq!(plan.bins()[3], TimeBin::new(4, 301, 360));
    }

    #[test]
    fn test_edge_clip_consuming_source_is_invalid() {
        let config = PlannerConfig {
            edge_clip: 300,
            ..Default::default()
        };
        let result = SegmentPlanner::new(config).unwrap().plan(600, 0);
        assert!(matches!(result, Err(FinderError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_unknown_order_is_invalid() {
        let config = PlannerConfig {
            order: named("spiral"),
            ..Default::default()
        };
        assert!(matches!(
            SegmentPlanner::new(config),
            Err(FinderError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_explicit_order_drops_out_of_range() {
        let plan = planner(BinOrderSpec::Explicit(vec![5, 0, 3, 42, 3, 1]), 30, 120, 5)
            .plan(600, 0)
            .unwrap();
        let order: Vec<usize> = plan.iter().map(|b| b.index).collect();
        assert_eq!(order, vec![5, 3, 1]);

        let plan = planner(BinOrderSpec::Explicit(vec![4, 2]), 30, 120, 5)
            .plan(600, 0)
            .unwrap();
        let order: Vec<usize> = plan.iter().map(|b| b.index).collect();
        assert_eq!(order, vec![1, 4, 2]);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let config = PlannerConfig {
            nbins: 10,
            order: named("random"),
            seed: Some(7),
            ..Default::default()
        };
        let a = SegmentPlanner::new(config.clone()).unwrap().plan(1200, 0).unwrap();
        let b = SegmentPlanner::new(config).unwrap().plan(1200, 0).unwrap();
        assert_eq!(a, b);

        let mut indices: Vec<usize> = a.iter().map(|b| b.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_skip_interleave_in_plan() {
        let config = PlannerConfig {
            nbins: 6,
            order: named("linear"),
            skip_interleave: 2,
            ..Default::default()
        };
        let plan = SegmentPlanner::new(config).unwrap().plan(360, 0).unwrap();
        let order: Vec<usize> = plan.iter().map(|b| b.index).collect();
        assert_eq!(order, vec![1, 3, 5, 2, 4, 6]);
    }

    #[test]
    fn test_short_source_gets_single_bin() {
        let plan = planner(named("mirrored"), 30, 120, 10).plan(20, 5).unwrap();
        assert_eq!(plan.bins(), &[TimeBin::new(1, 6, 25)]);
    }

    #[test]
    fn test_window_clamps_to_plan() {
        let plan = planner(named("linear"), 30, 120, 5).plan(600, 0).unwrap();
        assert_eq!(plan.window(3, 10).len(), 2);
        assert!(plan.window(10, 3).is_empty());
    }
}
