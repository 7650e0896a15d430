//! Segment acquisition and source metadata
//!
//! The search loop only sees the traits defined here. Concrete gateways spawn
//! `yt-dlp` (remote sources) or `ffmpeg` (local recordings) as background
//! processes, one per requested bin.

mod ffmpeg;
mod process;
mod ytdlp;

pub use ffmpeg::{FfmpegGateway, LocalMetadata};
pub use process::ProcessAcquisition;
pub use ytdlp::{parse_duration, YtDlpGateway, YtDlpMetadata, SUPPORTED_FORMAT_CODES};

use crate::error::{FinderError, Result};
use crate::planner::TimeBin;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Observable state of one background acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionStatus {
    Pending,
    Finished,
    Failed(String),
}

/// Handle to an in-flight acquisition
pub trait Acquisition: Send {
    fn poll(&mut self) -> AcquisitionStatus;

    /// Stop the acquisition. Cancelling a finished acquisition is a no-op.
    fn cancel(&mut self) -> anyhow::Result<()>;

    /// Error output collected so far; draining clears it
    fn drain_errors(&mut self) -> String;
}

/// Starts segment acquisitions and knows where their files land
pub trait AcquisitionGateway: Send + Sync {
    fn request(
        &self,
        locator: &str,
        bin: &TimeBin,
        discriminator: &str,
    ) -> anyhow::Result<Box<dyn Acquisition>>;

    fn segment_path(&self, discriminator: &str) -> PathBuf;

    fn exists(&self, discriminator: &str) -> bool {
        self.segment_path(discriminator).is_file()
    }

    fn remove(&self, discriminator: &str) -> anyhow::Result<()> {
        let path = self.segment_path(discriminator);
        if path.is_file() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Source of total media duration
pub trait MetadataSource: Send + Sync {
    fn duration(&self, locator: &str) -> anyhow::Result<u64>;
}

/// File-name discriminators carrying the absolute time range, so a segment
/// file is only ever reused for the exact window it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNaming {
    stem: String,
}

impl SegmentNaming {
    /// Stem from the last path component of a URL or file path
    pub fn for_locator(locator: &str) -> Self {
        let last = locator
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(locator);
        let last = Path::new(last)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(last);

        let mut stem: String = last
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() {
            stem.push_str("source");
        }
        Self { stem }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// `{stem}_{index}_{start}-{stop}`
    pub fn bin(&self, bin: &TimeBin) -> String {
        format!("{}_{}_{}-{}", self.stem, bin.index, bin.start, bin.stop)
    }

    pub fn query(&self, start: u64, stop: u64) -> String {
        format!("{}_query_{}-{}", self.stem, start, stop)
    }
}

/// Which gateway fetches source segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Remote media through yt-dlp
    #[default]
    Ytdlp,
    /// Local recording cut with ffmpeg
    Ffmpeg,
}

/// Acquisition and decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Segment file extension for yt-dlp downloads
    #[serde(default = "default_extension")]
    pub extension: String,
    /// yt-dlp audio format code
    #[serde(default = "default_format_code")]
    pub format_code: u32,
    /// Keep every n-th decoded sample
    #[serde(default = "default_downsample_factor")]
    pub downsample_factor: u32,
    #[serde(default = "default_ytdlp_program")]
    pub ytdlp_program: String,
    #[serde(default = "default_ffmpeg_program")]
    pub ffmpeg_program: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: default_data_dir(),
            extension: default_extension(),
            format_code: default_format_code(),
            downsample_factor: default_downsample_factor(),
            ytdlp_program: default_ytdlp_program(),
            ffmpeg_program: default_ffmpeg_program(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_extension() -> String {
    "m4a".to_string()
}
fn default_format_code() -> u32 {
    139
}
fn default_downsample_factor() -> u32 {
    100
}
fn default_ytdlp_program() -> String {
    "yt-dlp".to_string()
}
fn default_ffmpeg_program() -> String {
    "ffmpeg".to_string()
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == Backend::Ytdlp && !SUPPORTED_FORMAT_CODES.contains(&self.format_code) {
            return Err(FinderError::config(format!(
                "only audio formats {:?} are supported, not {}",
                SUPPORTED_FORMAT_CODES, self.format_code
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(FinderError::config("acquisition.extension must not be empty"));
        }
        if self.data_dir.is_empty() {
            return Err(FinderError::config("acquisition.data_dir must not be empty"));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_from_url() {
        let naming = SegmentNaming::for_locator("https://youtu.be/oHP7u5zHYSY");
        assert_eq!(naming.stem(), "oHP7u5zHYSY");
        assert_eq!(naming.bin(&TimeBin::new(3, 121, 180)), "oHP7u5zHYSY_3_121-180");
        assert_eq!(naming.query(100, 120), "oHP7u5zHYSY_query_100-120");
    }

    #[test]
    fn test_naming_from_path_and_odd_characters() {
        assert_eq!(
            SegmentNaming::for_locator("/media/long stream.mkv").stem(),
            "long_stream"
        );
        assert_eq!(
            SegmentNaming::for_locator("https://www.youtube.com/watch?v=abc").stem(),
            "watch_v_abc"
        );
        assert_eq!(SegmentNaming::for_locator("").stem(), "source");
    }

    #[test]
    fn test_distinct_bins_get_distinct_names() {
        let naming = SegmentNaming::for_locator("https://youtu.be/x");
        let a = naming.bin(&TimeBin::new(1, 1, 60));
        let b = naming.bin(&TimeBin::new(11, 601, 660));
        assert_ne!(a, b);

        // same index over a shifted range
        let c = naming.bin(&TimeBin::new(1, 61, 120));
        assert_ne!(a, c);
    }

    #[test]
    fn test_config_rejects_video_format() {
        let config = AcquisitionConfig {
            format_code: 22,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FinderError::InvalidConfiguration { .. })
        ));

        let config = AcquisitionConfig {
            backend: Backend::Ffmpeg,
            format_code: 22,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
