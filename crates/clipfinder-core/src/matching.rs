//! Locating a query clip inside a segment by cross-correlation
//!
//! The full cross-correlation of `data` and `query` is computed through the
//! FFT. Index `k` of the curve corresponds to the query ending at data sample
//! `k`, i.e. a lag of `k - (len(query) - 1)` samples.

use crate::audio::Waveform;
use crate::error::{FinderError, Result};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};


/// Correlation value a curve must exceed somewhere to count as a match.
///
/// Chosen empirically; not derived from the signal statistics.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// How the winning index is selected once the threshold is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgmaxPolicy {
    /// Global argmax over the whole curve; a NaN beats any number
    #[default]
    Whole,
    /// Argmax restricted to finite values above the threshold
    Inds,
}

/// How the start offset is derived from the winning index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPolicy {
    /// Stop offset minus the query duration
    #[default]
    Query,
    /// Correlation lag at the winning index, in whole seconds
    Lags,
}

/// Scaling applied to the raw correlation curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Plain correlation sums
    Raw,
    /// Divided by the norms of the whole query and the whole data
    Global,
    /// Divided by the query norm and the norm of the overlapping data window
    #[default]
    Windowed,
}

/// Signal matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub argmax: ArgmaxPolicy,
    #[serde(default)]
    pub start: StartPolicy,
    #[serde(default)]
    pub normalization: Normalization,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            argmax: ArgmaxPolicy::default(),
            start: StartPolicy::default(),
            normalization: Normalization::default(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(FinderError::config("matcher.threshold must be finite"));
        }
        Ok(())
    }
}

/// Outcome of matching one segment. Offsets are whole seconds relative to
/// the start of the segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchResult {
    NoMatch {
        peak: f64,
    },
    Match {
        start_offset: i64,
        stop_offset: i64,
        peak: f64,
    },
}

impl MatchResult {
    /// Maximum of the correlation curve, defined for hits and misses
    pub fn peak(&self) -> f64 {
        match self {
            MatchResult::NoMatch { peak } | MatchResult::Match { peak, .. } => *peak,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match { .. })
    }
}

/// Cross-correlation matcher
#[derive(Debug, Clone, Default)]
pub struct SignalMatcher {
    config: MatcherConfig,
}

impl SignalMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match two waveforms sharing one sample rate
    pub fn find(&self, data: &Waveform, query: &Waveform) -> Result<MatchResult> {
        if data.rate() != query.rate() {
            return Err(FinderError::waveform(format!(
                "data rate {} Hz differs from query rate {} Hz",
                data.rate(),
                query.rate()
            )));
        }
        self.find_samples(data.samples(), query.samples(), data.rate())
    }

    /// Match raw sample slices at `rate` samples per second
    pub fn find_samples(&self, data: &[f32], query: &[f32], rate: u32) -> Result<MatchResult> {
        if data.is_empty() || query.is_empty() {
            return Err(FinderError::waveform("cannot correlate an empty signal"));
        }
        if rate == 0 {
            return Err(FinderError::waveform("sample rate must be > 0"));
        }

        let curve = self.correlate(data, query);
        let threshold = self.config.threshold;

        let (peak_index, peak) = argmax_total(&curve);
        if !curve.iter().any(|&v| v > threshold) {
            log::debug!(
                "Peak: ({:.1}, {:.1e})",
                peak_index as f64 / rate as f64,
                peak
            );
            return Ok(MatchResult::NoMatch { peak });
        }

        let winner = select_peak(&curve, threshold, self.config.argmax).unwrap_or(peak_index);

        let stop_offset = (winner as u64).div_ceil(rate as u64) as i64;
        let start_offset = match self.config.start {
            StartPolicy::Query => stop_offset - (query.len() as u64 / rate as u64) as i64,
            StartPolicy::Lags => {
                let lag = winner as i64 - (query.len() as i64 - 1);
                lag.div_euclid(rate as i64)
            }
        };

        log::info!(
            "Corr: {:<10.4} Start: {:<10} Stop: {:<10}",
            peak,
            start_offset,
            stop_offset
        );

        Ok(MatchResult::Match {
            start_offset,
            stop_offset,
            peak,
        })
    }

    /// Full-mode correlation curve, scaled per the configured normalization
    pub fn correlate(&self, data: &[f32], query: &[f32]) -> Vec<f64> {
        let mut curve = cross_correlate(data, query);

        match self.config.normalization {
            Normalization::Raw => {}
            Normalization::Global => {
                let norm = (energy(data) * energy(query)).sqrt();
                for value in &mut curve {
                    *value = if norm > 1e-12 { *value / norm } else { 0.0 };
                }
            }
            Normalization::Windowed => {
                let query_norm = energy(query).sqrt();
                let energies = window_energies(data, query.len());
                let total_energy = energy(data);
                // windows this quiet relative to the whole segment count as silence
                let floor = (query_norm * total_energy.sqrt() * 1e-6).max(1e-12);
                for (value, window) in curve.iter_mut().zip(energies) {
                    let norm = query_norm * window.max(0.0).sqrt();
                    *value = if norm > floor { *value / norm } else { 0.0 };
                }
            }
        }

        curve
    }
}

/// Full discrete cross-correlation of `data` and `query` through the FFT.
///
/// Output length is `len(data) + len(query) - 1`; index `k` holds
/// `sum_n data[n + k - (len(query) - 1)] * query[n]`.
pub fn cross_correlate(data: &[f32], query: &[f32]) -> Vec<f64> {
    if data.is_empty() || query.is_empty() {
        return Vec::new();
    }

    let full_len = data.len() + query.len() - 1;
    let fft_len = full_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mut data_spec: Vec<Complex<f64>> = data
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .collect();
    data_spec.resize(fft_len, Complex::new(0.0, 0.0));

    let mut query_spec: Vec<Complex<f64>> = query
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .collect();
    query_spec.resize(fft_len, Complex::new(0.0, 0.0));

    fft.process(&mut data_spec);
    fft.process(&mut query_spec);

    // corr(d, q) = IFFT(FFT(d) * conj(FFT(q))), lag 0 at index 0
    let mut product: Vec<Complex<f64>> = data_spec
        .iter()
        .zip(query_spec.iter())
        .map(|(d, q)| d * q.conj())
        .collect();
    ifft.process(&mut product);

    let scale = 1.0 / fft_len as f64;
    let shift = query.len() - 1;
    (0..full_len)
        .map(|k| {
            // negative lags wrap to the end of the circular result
            let circular = (k + fft_len - shift) % fft_len;
            product[circular].re * scale
        })
        .collect()
}

/// Signed lag (in samples) of each full-mode correlation index
pub fn correlation_lags(data_len: usize, query_len: usize) -> Vec<i64> {
    if data_len == 0 || query_len == 0 {
        return Vec::new();
    }
    (-(query_len as i64 - 1)..data_len as i64).collect()
}

fn energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&x| (x as f64) * (x as f64)).sum()
}

/// Energy of the data samples overlapped by the query at each full-mode index
fn window_energies(data: &[f32], query_len: usize) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(data.len() + 1);
    prefix.push(0.0f64);
    for &x in data {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + (x as f64) * (x as f64));
    }

    let full_len = data.len() + query_len - 1;
    (0..full_len)
        .map(|k| {
            let lo = (k + 1).saturating_sub(query_len);
            let hi = (k + 1).min(data.len());
            prefix[hi] - prefix[lo]
        })
        .collect()
}

/// Winning index under `policy`, or `None` when no finite value exceeds
/// `threshold` (for `Inds`) or the curve is empty
fn select_peak(curve: &[f64], threshold: f64, policy: ArgmaxPolicy) -> Option<usize> {
    match policy {
        ArgmaxPolicy::Whole if curve.is_empty() => None,
        ArgmaxPolicy::Whole => Some(argmax_total(curve).0),
        ArgmaxPolicy::Inds => curve
            .iter()
            .enumerate()
            .filter(|(_, &v)| v.is_finite() && v > threshold)
            .fold(None::<(usize, f64)>, |best, (i, &v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i),
    }
}

/// Index and value of the maximum; NaN compares greater than any number
fn argmax_total(curve: &[f64]) -> (usize, f64) {
    curve
        .iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |best, (i, &v)| match best {
            Some((_, bv)) if !greater(v, bv) => best,
            _ => Some((i, v)),
        })
        .unwrap_or((0, f64::NAN))
}

fn greater(a: f64, b: f64) -> bool {
    match (a.is_nan(), b.is_nan()) {
        (true, false) => true,
        (_, true) => false,
        (false, false) => a > b,
    }
}
