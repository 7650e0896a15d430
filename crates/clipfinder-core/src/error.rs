//! Error taxonomy for clip search
//!
//! Configuration, metadata, missing-segment and first-bin decode errors abort a
//! run. Acquisition and later decode errors are recorded per bin and the run
//! continues.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FinderError>;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("acquisition of bin {bin} ({start}s-{stop}s) failed: {reason}")]
    AcquisitionFailure {
        bin: usize,
        start: u64,
        stop: u64,
        reason: String,
    },

    #[error("failed to decode {}: {message}", path.display())]
    DecodeFailure { path: PathBuf, message: String },

    #[error("source {locator} unavailable: first segment ({start}s-{stop}s) could not be decoded: {message}")]
    SourceUnavailable {
        locator: String,
        start: u64,
        stop: u64,
        message: String,
    },

    #[error("could not determine duration of {locator}: {message}")]
    MetadataFailure { locator: String, message: String },

    #[error("segment for bin {bin} ({start}s-{stop}s) was not dispatched and is missing: {}", path.display())]
    SegmentMissing {
        bin: usize,
        start: u64,
        stop: u64,
        path: PathBuf,
    },

    #[error("query unavailable: {message}")]
    QueryUnavailable { message: String },

    #[error("invalid timestamp {text:?}: {message}")]
    InvalidTimestamp { text: String, message: String },

    #[error("invalid waveform: {message}")]
    InvalidWaveform { message: String },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl FinderError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub(crate) fn timestamp(text: &str, message: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            text: text.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn waveform(message: impl Into<String>) -> Self {
        Self::InvalidWaveform {
            message: message.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error aborts a whole search run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FinderError::AcquisitionFailure { .. } | FinderError::DecodeFailure { .. }
        )
    }
}
