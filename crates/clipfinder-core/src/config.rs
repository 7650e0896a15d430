//! TOML configuration for a search run
//!
//! ```toml
//! [source]
//! locator = "https://youtu.be/o3JPmWOvfkI"
//! start = "00:05:00"
//! stop = "00:30:00"
//!
//! [query]
//! path = "data/clip.m4a"
//!
//! [planner]
//! max_binwidth = 150
//! skip_interleave = 5
//! ```

use crate::acquisition::AcquisitionConfig;
use crate::error::{FinderError, Result};
use crate::matching::MatcherConfig;
use crate::planner::PlannerConfig;
use crate::search::{DispatchConfig, QuerySource, SearchRange};
use crate::timecode::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinderConfig {
    pub source: SourceConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// The long media item to search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL or local path
    pub locator: String,
    /// Timestamp where the search starts (lenient `HH:MM:SS`)
    #[serde(default)]
    pub start: Option<String>,
    /// Timestamp where the search ends; the media duration when absent
    #[serde(default)]
    pub stop: Option<String>,
}

impl SourceConfig {
    pub fn range(&self) -> Result<SearchRange> {
        let start = match &self.start {
            Some(text) => parse_timestamp(text)?,
            None => 0,
        };
        let stop = self.stop.as_deref().map(parse_timestamp).transpose()?;
        if let Some(stop) = stop {
            if stop <= start {
                return Err(FinderError::config(format!(
                    "source.stop ({}s) must be after source.start ({}s)",
                    stop, start
                )));
            }
        }
        Ok(SearchRange { start, stop })
    }
}

/// The clip to look for: a local file, or a time range of a remote item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
}

impl QueryConfig {
    /// A local path takes precedence over a URL
    pub fn source(&self) -> Result<QuerySource> {
        if let Some(path) = &self.path {
            if !path.is_file() {
                return Err(FinderError::QueryUnavailable {
                    message: format!("query does not exist: {}", path.display()),
                });
            }
            return Ok(QuerySource::LocalFile(path.clone()));
        }

        let url = self.url.as_ref().ok_or_else(|| {
            FinderError::config("at least one of query.path or query.url must be provided")
        })?;
        let start = match &self.start {
            Some(text) => parse_timestamp(text)?,
            None => 0,
        };
        let stop = match &self.stop {
            Some(text) => parse_timestamp(text)?,
            None => return Err(FinderError::config("query.stop is required with query.url")),
        };
        if stop <= start {
            return Err(FinderError::config(format!(
                "query.stop ({}s) must be after query.start ({}s)",
                stop, start
            )));
        }

        Ok(QuerySource::Remote {
            locator: url.clone(),
            start,
            stop,
        })
    }
}

impl FinderConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FinderError::io(format!("reading {}", path.display()), e))?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FinderError::config(format!("failed to parse TOML config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.locator.trim().is_empty() {
            return Err(FinderError::config("source.locator must not be empty"));
        }
        self.source.range()?;
        if self.query.path.is_none() && self.query.url.is_none() {
            return Err(FinderError::config(
                "at least one of query.path or query.url must be provided",
            ));
        }
        self.planner.validate()?;
        self.matcher.validate()?;
        self.dispatch.validate()?;
        self.acquisition.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Backend;
    use crate::matching::{ArgmaxPolicy, Normalization, StartPolicy};
    use crate::planner::BinOrderSpec;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [source]
        locator = "https://youtu.be/o3JPmWOvfkI"

        [query]
        url = "https://youtu.be/clip"
        stop = "0:20"
    "#;

    #[test]
    fn test_defaults_fill_missing_tables() {
        let config = FinderConfig::from_toml_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.planner.nbins, 10);
        assert_eq!(config.planner.order, BinOrderSpec::Named("mirrored".to_string()));
        assert_eq!(config.planner.min_binwidth, 30);
        assert_eq!(config.planner.max_binwidth, 120);
        assert!(config.planner.cover_tail);
        assert_eq!(config.matcher.threshold, 0.5);
        assert_eq!(config.matcher.argmax, ArgmaxPolicy::Whole);
        assert_eq!(config.matcher.start, StartPolicy::Query);
        assert_eq!(config.matcher.normalization, Normalization::Windowed);
        assert_eq!(config.dispatch.max_concurrent, 50);
        assert_eq!(config.dispatch.max_bin, 50);
        assert_eq!(config.dispatch.max_wait_secs, 180);
        assert!(config.dispatch.keep_files);
        assert_eq!(config.acquisition.backend, Backend::Ytdlp);
        assert_eq!(config.acquisition.format_code, 139);
        assert_eq!(config.acquisition.downsample_factor, 100);
    }

    #[test]
    fn test_full_config() {
        let toml_str = r#"
            [source]
            locator = "/recordings/stream.mkv"
            start = "00:05:00"
            stop = "00:30:00"

            [query]
            url = "https://youtu.be/clip"
            start = "1:40"
            stop = "2:00"

            [planner]
            nbins = 20
            order = [3, 1, 2]
            skip_interleave = 5
            max_binwidth = 150

            [matcher]
            threshold = 0.6
            argmax = "inds"
            start = "lags"
            normalization = "raw"

            [dispatch]
            max_concurrent = 10
            max_bin = 200
            keep_files = false

            [acquisition]
            backend = "ffmpeg"
            data_dir = "/tmp/segments"
        "#;

        let config = FinderConfig::from_toml_str(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.source.range().unwrap(),
            SearchRange {
                start: 300,
                stop: Some(1800)
            }
        );
        match config.query.source().unwrap() {
            QuerySource::Remote { start, stop, .. } => assert_eq!((start, stop), (100, 120)),
            other => panic!("expected a remote query, got {:?}", other),
        }
        assert_eq!(config.planner.order, BinOrderSpec::Explicit(vec![3, 1, 2]));
        assert_eq!(config.matcher.argmax, ArgmaxPolicy::Inds);
        assert_eq!(config.matcher.normalization, Normalization::Raw);
        assert_eq!(config.dispatch.max_bin, 200);
        assert!(!config.dispatch.keep_files);
        assert_eq!(config.acquisition.backend, Backend::Ffmpeg);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = FinderConfig::from_toml_str(MINIMAL).unwrap();
        config.planner.order = BinOrderSpec::Named("spiral".to_string());
        assert!(matches!(
            config.validate(),
            Err(FinderError::InvalidConfiguration { .. })
        ));

        let mut config = FinderConfig::from_toml_str(MINIMAL).unwrap();
        config.source.start = Some("00:10:00".to_string());
        config.source.stop = Some("00:05:00".to_string());
        assert!(config.validate().is_err());

        let mut config = FinderConfig::from_toml_str(MINIMAL).unwrap();
        config.query = QueryConfig::default();
        assert!(config.validate().is_err());

        let mut config = FinderConfig::from_toml_str(MINIMAL).unwrap();
        config.acquisition.format_code = 251;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_local_query_is_unavailable() {
        let query = QueryConfig {
            path: Some(PathBuf::from("/no/such/clip.wav")),
            ..Default::default()
        };
        assert!(matches!(
            query.source(),
            Err(FinderError::QueryUnavailable { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = FinderConfig::load(file.path()).unwrap();
        assert_eq!(config.source.locator, "https://youtu.be/o3JPmWOvfkI");

        assert!(matches!(
            FinderConfig::load(Path::new("/no/such/config.toml")),
            Err(FinderError::Io { .. })
        ));
    }

    #[test]
    fn test_example_config_is_valid() {
        let example = include_str!("../../../clipfinder.example.toml");
        let config = FinderConfig::from_toml_str(example).unwrap();
        config.validate().unwrap();
        assert_eq!(config.planner.skip_interleave, 5);
        assert_eq!(config.dispatch.max_bin, 200);
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            FinderConfig::from_toml_str("[source\nlocator = 1"),
            Err(FinderError::InvalidConfiguration { .. })
        ));
    }
}
