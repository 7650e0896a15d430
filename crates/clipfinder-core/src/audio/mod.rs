//! Audio decoding into downsampled mono waveforms
//!
//! Supports WAV, MP3, FLAC and OGG through pure Rust decoders, and the
//! MP4/M4A/MKV/WebM containers delivered by media downloaders through Symphonia.

mod container;
mod decoder;
mod resample;
mod waveform;

pub use container::{decode_container, probe_duration};
pub use decoder::{decode_audio, AudioData};
pub use resample::{downsample, resample_to_target};
pub use waveform::Waveform;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Supported audio and container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    // Pure audio formats
    Wav,
    Mp3,
    Flac,
    Ogg,

    // Containers (audio track is extracted)
    Mp4,
    Aac,
    Mkv,
    Webm,

    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") => AudioFormat::Ogg,

            Some("mp4") | Some("m4a") | Some("m4v") => AudioFormat::Mp4,
            Some("aac") => AudioFormat::Aac,
            Some("mkv") | Some("mka") => AudioFormat::Mkv,
            Some("webm") => AudioFormat::Webm,

            _ => AudioFormat::Unknown,
        }
    }

    /// Whether the format is decoded through Symphonia
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            AudioFormat::Mp4 | AudioFormat::Aac | AudioFormat::Mkv | AudioFormat::Webm
        )
    }
}

/// Turns a segment file into a waveform
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Waveform>;
}

/// Decodes audio files to mono and keeps every `downsample_factor`-th sample
#[derive(Debug, Clone, Copy)]
pub struct FileDecoder {
    pub downsample_factor: u32,
}

impl FileDecoder {
    pub fn new(downsample_factor: u32) -> Self {
        Self { downsample_factor }
    }
}

impl Decoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<Waveform> {
        log::debug!("Reading... {}", path.display());
        let audio = decode_audio(path)?;
        let waveform = Waveform::new(audio.to_mono(), audio.sample_rate)
            .with_context(|| format!("Decoded audio is unusable: {}", path.display()))?;
        Ok(waveform.downsample(self.downsample_factor))
    }
}

/// Files in `dir` whose name starts with `stem` and has extension `ext`,
/// sorted by name
pub fn find_segment_files(dir: &Path, stem: &str, ext: &str) -> Result<Vec<PathBuf>> {
    let ext = ext.trim_start_matches('.');
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let name_ok = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(stem))
                .unwrap_or(false);
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false);
            name_ok && ext_ok
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Decode the first file matching `stem*.ext` in `dir`
pub fn decode_first(
    decoder: &dyn Decoder,
    dir: &Path,
    stem: &str,
    ext: &str,
) -> Result<(PathBuf, Waveform)> {
    let files = find_segment_files(dir, stem, ext)?;
    let first = files.into_iter().next().ok_or_else(|| {
        anyhow::anyhow!(
            "No files found in {} with pattern {}*.{}",
            dir.display(),
            stem,
            ext.trim_start_matches('.')
        )
    })?;
    let waveform = decoder.decode(&first)?;
    Ok((first, waveform))
}
