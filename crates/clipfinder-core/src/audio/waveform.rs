//! Mono sample buffer with its sample rate

use super::resample::{downsample, resample_to_target};
use crate::error::{FinderError, Result};

/// Immutable mono waveform
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    rate: u32,
}

impl Waveform {
    /// Fails unless `rate > 0` and there is at least one sample
    pub fn new(samples: Vec<f32>, rate: u32) -> Result<Self> {
        if rate == 0 {
            return Err(FinderError::waveform("sample rate must be > 0"));
        }
        if samples.is_empty() {
            return Err(FinderError::waveform("waveform has no samples"));
        }
        Ok(Self { samples, rate })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.rate as f64
    }

    /// Keep every `factor`-th sample. The rate is divided by `factor` (integer
    /// division, never below 1). Factors 0 and 1 leave the waveform unchanged.
    pub fn downsample(self, factor: u32) -> Self {
        if factor <= 1 {
            return self;
        }
        Self {
            samples: downsample(&self.samples, factor as usize),
            rate: (self.rate / factor).max(1),
        }
    }

    /// Linear-interpolation resample to `rate`
    pub fn resampled(&self, rate: u32) -> Result<Self> {
        if rate == self.rate {
            return Ok(self.clone());
        }
        let samples = resample_to_target(&self.samples, self.rate, rate)?;
        Self::new(samples, rate)
    }
}
