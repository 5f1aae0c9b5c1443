//! Archive configuration loaded from TOML.
//!
//! ```toml
//! address = "127.0.0.1:9090"
//! datadir = "/data/hrd"
//! type = "hrd"
//! include_invalid = false
//! max_gap = 0
//! workers = 4
//! by = "channel"
//! ```
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use typed_builder::TypedBuilder;

use crate::packet::{Family, View};
use crate::{Error, Result};

/// Default number of listing workers.
pub const DEFAULT_WORKERS: usize = 4;

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bind address of the network front-end; only carried.
    #[serde(default)]
    pub address: String,
    pub datadir: PathBuf,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub devel: bool,
    #[serde(default)]
    pub include_invalid: bool,
    /// Seconds; 0 means unbounded.
    #[serde(default)]
    pub max_gap: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub by: String,
}

impl Config {
    /// Read and validate a TOML config file.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be read, [Error::Config] if it cannot be parsed or
    /// holds invalid values, and [Error::UnknownFamily] for an unsupported packet type.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// See [Config::load].
    ///
    /// # Errors
    /// Same as [Config::load], minus I/O.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.family()?;
        config.view()?;
        if config.workers == 0 {
            return Err(Error::Config("workers must be greater than 0".to_string()));
        }
        Ok(config)
    }

    /// # Errors
    /// [Error::UnknownFamily] if `type` is not a supported family name.
    pub fn family(&self) -> Result<Family> {
        self.kind.parse()
    }

    /// # Errors
    /// [Error::Config] if `by` is not a grouping name.
    pub fn view(&self) -> Result<View> {
        self.by.parse()
    }

    /// # Errors
    /// Same as [Config::view].
    pub fn query_opts(&self) -> Result<QueryOpts> {
        let max_gap = i64::try_from(self.max_gap)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Ok(QueryOpts::builder()
            .view(self.view()?)
            .include_invalid(self.include_invalid)
            .max_gap(max_gap)
            .workers(self.workers)
            .build())
    }
}

/// Options shared by every archive query.
#[derive(Debug, Clone, TypedBuilder)]
pub struct QueryOpts {
    #[builder(default)]
    pub view: View,
    /// Keep packets failing their checksum in gap and listing queries. Statistics always
    /// count them.
    #[builder(default)]
    pub include_invalid: bool,
    /// Longest discontinuity still reported as a gap; zero is unbounded.
    #[builder(default = Duration::zero())]
    pub max_gap: Duration,
    #[builder(default = DEFAULT_WORKERS)]
    pub workers: usize,
}

impl QueryOpts {
    pub(crate) fn gap_limit(&self) -> Option<Duration> {
        Some(self.max_gap).filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn full_config() {
        let config = Config::parse(
            r#"
            address = "127.0.0.1:9090"
            datadir = "/data/hrd"
            type = "hrd"
            devel = true
            include_invalid = true
            max_gap = 30
            workers = 2
            by = "origin"
            "#,
        )
        .unwrap();
        assert_eq!(config.family().unwrap(), Family::Vmu);
        assert!(config.devel);
        let opts = config.query_opts().unwrap();
        assert_eq!(opts.view, View::Origin);
        assert!(opts.include_invalid);
        assert_eq!(opts.max_gap, Duration::seconds(30));
        assert_eq!(opts.workers, 2);
    }

    #[test]
    fn defaults() {
        let config = Config::parse("datadir = \"/data\"\ntype = \"tm\"").unwrap();
        assert_eq!(config.family().unwrap(), Family::Tm);
        let opts = config.query_opts().unwrap();
        assert_eq!(opts.view, View::Channel);
        assert!(!opts.include_invalid);
        assert_eq!(opts.gap_limit(), None);
        assert_eq!(opts.workers, DEFAULT_WORKERS);
    }

    #[test_case("datadir = \"/d\"\ntype = \"pd\"", 400; "unknown family")]
    #[test_case("datadir = \"/d\"\ntype = \"\"", 400; "empty family")]
    #[test_case("datadir = \"/d\"\ntype = \"tm\"\nby = \"apid\"", 400; "unknown view")]
    #[test_case("datadir = \"/d\"\ntype = \"tm\"\nworkers = 0", 400; "no workers")]
    #[test_case("type = \"tm\"", 400; "missing datadir")]
    fn rejected(text: &str, status: u16) {
        let err = Config::parse(text).unwrap_err();
        assert_eq!(err.status().code(), status);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtarchive.toml");
        std::fs::write(&path, "datadir = \"/data\"\ntype = \"vmu\"").unwrap();
        assert_eq!(Config::load(&path).unwrap().datadir, PathBuf::from("/data"));
        assert!(matches!(
            Config::load(dir.path().join("nope.toml")),
            Err(Error::Io(_))
        ));
    }
}
