use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::platform::{FrequencyTable, PlatformContext};

/// Top-level configuration for a replay run.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding captured chunk files.
    #[serde(default)]
    pub input_dir: PathBuf,

    /// JSON-lines output file. Empty means stdout.
    #[serde(default)]
    pub output: PathBuf,

    /// Bytes per chunk handed to the analyzer. Default: 64KiB.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How often analyzer counters are logged. Default: 10s.
    #[serde(default = "default_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,

    /// Descriptors buffered between the analyzer and the writer.
    #[serde(default = "default_upload_queue_size")]
    pub upload_queue_size: usize,

    #[serde(default)]
    pub frequency: FrequencyTable,

    #[serde(default)]
    pub platform: PlatformContext,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_upload_queue_size() -> usize {
    4096
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            input_dir: PathBuf::new(),
            output: PathBuf::new(),
            chunk_size: default_chunk_size(),
            stats_interval: default_stats_interval(),
            upload_queue_size: default_upload_queue_size(),
            frequency: FrequencyTable::default(),
            platform: PlatformContext::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            bail!("input_dir is required");
        }

        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }

        if self.stats_interval.is_zero() {
            bail!("stats_interval must be positive");
        }

        if self.upload_queue_size == 0 {
            bail!("upload_queue_size must be positive");
        }

        for (name, mhz) in [
            ("hwts_mhz", self.frequency.hwts_mhz),
            ("ts_mhz", self.frequency.ts_mhz),
            ("ffts_mhz", self.frequency.ffts_mhz),
        ] {
            if !(mhz.is_finite() && mhz > 0.0) {
                bail!("frequency.{name} must be positive, got {mhz}");
            }
        }

        Ok(())
    }
}
