//! Mount configuration.
//!
//! Loaded from TOML by the embedding program; every field has a default so a
//! missing file or a partial one still yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytesize::ByteSize;
use serde::Deserialize;
use thiserror::Error;

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("stagefs").join("staging")
}

fn default_attr_ttl_secs() -> u64 {
    5
}

fn default_flush_backoff_secs() -> u64 {
    30
}

fn default_flush_max_attempts() -> u32 {
    5
}

fn default_flush_deadline_secs() -> u64 {
    600
}

fn default_upload_chunk() -> ByteSize {
    ByteSize::kib(64)
}

/// Tunables for one mount.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MountConfig {
    /// Directory holding per-handle scratch files. Created on demand.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// How long a cached attribute snapshot stays trusted.
    #[serde(default = "default_attr_ttl_secs")]
    pub attr_ttl_secs: u64,

    /// Pause between flush attempts after a transient remote failure.
    #[serde(default = "default_flush_backoff_secs")]
    pub flush_backoff_secs: u64,

    /// Total flush attempts granted per operation, first try included.
    #[serde(default = "default_flush_max_attempts")]
    pub flush_max_attempts: u32,

    /// Hard wall-clock bound on one flush, backoff pauses included.
    #[serde(default = "default_flush_deadline_secs")]
    pub flush_deadline_secs: u64,

    /// Read size for streaming the scratch file to the remote.
    #[serde(default = "default_upload_chunk")]
    pub upload_chunk: ByteSize,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            attr_ttl_secs: default_attr_ttl_secs(),
            flush_backoff_secs: default_flush_backoff_secs(),
            flush_max_attempts: default_flush_max_attempts(),
            flush_deadline_secs: default_flush_deadline_secs(),
            upload_chunk: default_upload_chunk(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl MountConfig {
    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Checks for values no mount can run with. Returns every problem found,
    /// not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        if self.staging_dir.as_os_str().is_empty() {
            problems.push("staging-dir must not be empty".to_owned());
        }
        if self.flush_max_attempts == 0 {
            problems.push("flush-max-attempts must be at least 1".to_owned());
        }
        if self.upload_chunk.as_u64() == 0 {
            problems.push("upload-chunk must be at least 1 byte".to_owned());
        }
        if self.flush_deadline_secs == 0 {
            problems.push("flush-deadline-secs must be at least 1".to_owned());
        }
        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    pub fn flush_backoff(&self) -> Duration {
        Duration::from_secs(self.flush_backoff_secs)
    }

    pub fn flush_deadline(&self) -> Duration {
        Duration::from_secs(self.flush_deadline_secs)
    }

    pub fn upload_chunk_bytes(&self) -> usize {
        usize::try_from(self.upload_chunk.as_u64()).unwrap_or(usize::MAX)
    }
}
