//! Configuration loading.
//!
//! Each option resolves in priority order:
//! 1. Command-line flag
//! 2. Environment variable (clap reads these into the same fields as the flags)
//! 3. TOML config file (`--config`, else `reel-match.toml` in the working directory)
//! 4. Compiled default

use anyhow::{Context, Result};
use data_loader::DEFAULT_BATCH_SIZE;
use pipeline::enrichment::{DEFAULT_ATTEMPTS, DEFAULT_CONCURRENCY, DEFAULT_OMDB_BASE_URL};
use pipeline::EnrichmentSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "reel-match.toml";
pub const DEFAULT_STORE_PATH: &str = "data/reel-match.sqlite3";
pub const DEFAULT_BASICS_PATH: &str = "data/title.basics.tsv";
pub const DEFAULT_AKAS_PATH: &str = "data/title.akas.tsv";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The TOML file as written; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub store: StoreSection,
    pub datasets: DatasetSection,
    pub enrichment: EnrichmentSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetSection {
    pub basics: Option<PathBuf>,
    pub akas: Option<PathBuf>,
    pub ratings: Option<PathBuf>,
    pub row_limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichmentSection {
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub attempts: Option<u32>,
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: Option<String>,
}

/// Values given on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub store: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub basics: Option<PathBuf>,
    pub akas: Option<PathBuf>,
    pub ratings: Option<PathBuf>,
    pub row_limit: Option<u64>,
    pub concurrency: Option<usize>,
    pub omdb_api_key: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub store_path: PathBuf,
    pub batch_size: usize,
    pub basics: PathBuf,
    pub akas: PathBuf,
    pub ratings: Option<PathBuf>,
    pub row_limit: Option<u64>,
    pub enrichment: EnrichmentSettings,
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: String,
}

impl Settings {
    /// Layer `overrides` over `file` over the compiled defaults
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Self {
        let FileConfig {
            store,
            datasets,
            enrichment,
        } = file;

        Self {
            store_path: overrides
                .store
                .or(store.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            batch_size: overrides
                .batch_size
                .or(store.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            basics: overrides
                .basics
                .or(datasets.basics)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BASICS_PATH)),
            akas: overrides
                .akas
                .or(datasets.akas)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AKAS_PATH)),
            ratings: overrides.ratings.or(datasets.ratings),
            row_limit: overrides.row_limit.or(datasets.row_limit),
            enrichment: EnrichmentSettings {
                concurrency: overrides
                    .concurrency
                    .or(enrichment.concurrency)
                    .unwrap_or(DEFAULT_CONCURRENCY),
                timeout: Duration::from_secs(enrichment.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                attempts: enrichment.attempts.unwrap_or(DEFAULT_ATTEMPTS),
            },
            omdb_api_key: overrides.omdb_api_key.or(enrichment.omdb_api_key),
            omdb_base_url: enrichment
                .omdb_base_url
                .unwrap_or_else(|| DEFAULT_OMDB_BASE_URL.to_string()),
        }
    }
}

/// Read the config file.
///
/// An explicit path must exist; the working-directory default is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                debug!("No {} in working directory; using defaults", DEFAULT_CONFIG_FILE);
                return Ok(FileConfig::default());
            }
            default
        }
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = parse_file_config(&text)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn parse_file_config(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}
