//! Remote sources through yt-dlp with ffmpeg as the external downloader

use super::{Acquisition, AcquisitionConfig, AcquisitionGateway, MetadataSource, ProcessAcquisition};
use crate::planner::TimeBin;
use crate::timecode::seconds_to_text;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;

/// Audio-only format codes (m4a 48k and 128k)
pub const SUPPORTED_FORMAT_CODES: [u32; 2] = [139, 140];

/// Downloads one time range of a remote video per request
#[derive(Debug, Clone)]
pub struct YtDlpGateway {
    program: String,
    format_code: u32,
    extension: String,
    data_dir: PathBuf,
}

impl YtDlpGateway {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            program: config.ytdlp_program.clone(),
            format_code: config.format_code,
            extension: config.extension.trim_start_matches('.').to_string(),
            data_dir: config.data_dir(),
        }
    }

    /// The download command for `bin`, not yet spawned
    pub fn command(&self, locator: &str, bin: &TimeBin, discriminator: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg(self.format_code.to_string())
            .arg("-o")
            .arg(self.segment_path(discriminator))
            .arg("--external-downloader")
            .arg("ffmpeg")
            .arg("--external-downloader-args")
            .arg(format!(
                "ffmpeg_i:-ss {} -to {}",
                seconds_to_text(bin.start),
                seconds_to_text(bin.stop)
            ))
            .arg(locator);
        command
    }
}

impl AcquisitionGateway for YtDlpGateway {
    fn request(
        &self,
        locator: &str,
        bin: &TimeBin,
        discriminator: &str,
    ) -> Result<Box<dyn Acquisition>> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;

        log::debug!("Downloading {} as {}", bin.describe(), discriminator);
        let log_path = self.data_dir.join(format!("{}.log", discriminator));
        let handle = ProcessAcquisition::spawn(
            self.command(locator, bin, discriminator),
            format!("yt-dlp {}", discriminator),
            &log_path,
        )?;
        Ok(Box::new(handle))
    }

    fn segment_path(&self, discriminator: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", discriminator, self.extension))
    }
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    duration: Option<f64>,
}

/// Total duration in whole seconds from yt-dlp's JSON description
pub fn parse_duration(json: &str) -> Result<u64> {
    let info: MediaInfo =
        serde_json::from_str(json).context("Failed to parse yt-dlp metadata")?;
    match info.duration {
        Some(d) if d.is_finite() && d >= 0.0 => Ok(d.floor() as u64),
        Some(d) => bail!("Invalid duration {} in metadata", d),
        None => bail!("Metadata has no duration (live stream?)"),
    }
}

/// Looks up media duration with `yt-dlp --dump-single-json`
#[derive(Debug, Clone)]
pub struct YtDlpMetadata {
    program: String,
}

impl YtDlpMetadata {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            program: config.ytdlp_program.clone(),
        }
    }
}

impl MetadataSource for YtDlpMetadata {
    fn duration(&self, locator: &str) -> Result<u64> {
        let output = Command::new(&self.program)
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg(locator)
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|a: &OsStr| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_download_command() {
        let config = AcquisitionConfig {
            data_dir: "/tmp/clips".to_string(),
            ..Default::default()
        };
        let gateway = YtDlpGateway::new(&config);
        let bin = TimeBin::new(3, 3601, 3725);
        let command = gateway.command("https://youtu.be/abc", &bin, "abc_3");

        assert_eq!(command.get_program(), "yt-dlp");
        assert_eq!(
            args(&command),
            vec![
                "-f",
                "139",
                "-o",
                "/tmp/clips/abc_3.m4a",
                "--external-downloader",
                "ffmpeg",
                "--external-downloader-args",
                "ffmpeg_i:-ss 01:00:01 -to 01:02:05",
                "https://youtu.be/abc",
            ]
        );
    }

    #[test]
    fn test_segment_path_uses_extension() {
        let config = AcquisitionConfig {
            data_dir: "out".to_string(),
            extension: ".webm".to_string(),
            format_code: 140,
            ..Default::default()
        };
        let gateway = YtDlpGateway::new(&config);
        assert_eq!(gateway.segment_path("x_1"), PathBuf::from("out/x_1.webm"));
        assert!(!gateway.exists("x_1"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(r#"{"id": "abc", "duration": 3725}"#).unwrap(), 3725);
        assert_eq!(parse_duration(r#"{"duration": 59.9}"#).unwrap(), 59);
        assert!(parse_duration(r#"{"id": "live"}"#).is_err());
        assert!(parse_duration(r#"{"duration": null}"#).is_err());
        assert!(parse_duration("not json").is_err());
    }
}
