//! Sample-rate conversion helpers

use crate::error::{FinderError, Result};

/// Resample audio to target sample rate using linear interpolation
pub fn resample_to_target(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(FinderError::waveform(format!(
            "cannot resample from {} Hz to {} Hz",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        if src_idx + 1 < samples.len() {
            output.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            output.push(samples[src_idx]);
        }
    }

    Ok(output)
}

/// Keep every `factor`-th sample starting with the first
pub fn downsample(samples: &[f32], factor: usize) -> Vec<f32> {
    samples.iter().step_by(factor.max(1)).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resample_interpolates() {
        let out = resample_to_target(&[0.0, 1.0, 2.0, 3.0], 2, 4).unwrap();
        assert_eq!(out.len(), 8);
        assert_relative_eq!(out[1], 0.5);
        assert_relative_eq!(out[6], 3.0);
    }

    #[test]
    fn test_resample_rejects_zero_rate() {
        assert!(resample_to_target(&[1.0], 0, 10).is_err());
    }
}
