//! Local recordings cut into segments with ffmpeg

use super::{Acquisition, AcquisitionConfig, AcquisitionGateway, MetadataSource, ProcessAcquisition};
use crate::audio::probe_duration;
use crate::planner::TimeBin;
use crate::timecode::seconds_to_text;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extracts mono WAV segments from a local audio or video file
#[derive(Debug, Clone)]
pub struct FfmpegGateway {
    program: String,
    data_dir: PathBuf,
}

impl FfmpegGateway {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            program: config.ffmpeg_program.clone(),
            data_dir: config.data_dir(),
        }
    }

    pub fn command(&self, source: &str, bin: &TimeBin, discriminator: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
            .arg("-ss")
            .arg(seconds_to_text(bin.start))
            .arg("-to")
            .arg(seconds_to_text(bin.stop))
            .arg("-i")
            .arg(source)
            .args(["-vn", "-ac", "1"])
            .arg(self.segment_path(discriminator));
        command
    }
}

impl AcquisitionGateway for FfmpegGateway {
    fn request(
        &self,
        locator: &str,
        bin: &TimeBin,
        discriminator: &str,
    ) -> Result<Box<dyn Acquisition>> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;

        let log_path = self.data_dir.join(format!("{}.log", discriminator));
        let handle = ProcessAcquisition::spawn(
            self.command(locator, bin, discriminator),
            format!("ffmpeg {}", discriminator),
            &log_path,
        )?;
        Ok(Box::new(handle))
    }

    fn segment_path(&self, discriminator: &str) -> PathBuf {
        self.data_dir.join(format!("{}.wav", discriminator))
    }
}

/// Duration of a local file from its container header
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMetadata;

impl MetadataSource for LocalMetadata {
    fn duration(&self, locator: &str) -> Result<u64> {
        probe_duration(Path::new(locator))
    }
}
