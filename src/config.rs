use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::ocr::OcrConfig;
use crate::pipeline::PipelineConfig;
use crate::source::StreamConfig;
use crate::tracker::TrackerConfig;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("license_plates.db"),
        }
    }
}

/// Every tunable of the reader. Missing sections and keys take their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub pipeline: PipelineConfig,
    pub stream: StreamConfig,
    pub ocr: OcrConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;

        toml::from_str(&raw).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}
