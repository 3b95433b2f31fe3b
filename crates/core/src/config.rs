//! Configuration for the sync engine.
//!
//! Loaded from TOML (`dredge.toml`) with serde defaults, so a missing file
//! or a partial file both yield a working configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chunker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
  /// Maximum characters per chunk
  pub chunk_size: usize,
  /// Characters shared between consecutive sub-chunks of a long section
  pub overlap: usize,
  /// Lead-text length for result snippets
  pub blurb_size: usize,
  /// Emit mini-chunk sub-texts for fine-grained embedding
  pub enable_mini_chunks: bool,
  /// Target mini-chunk size in characters
  pub mini_chunk_size: usize,
}

impl Default for ChunkingConfig {
  fn default() -> Self {
    Self {
      chunk_size: 2000,
      overlap: 200,
      blurb_size: 100,
      enable_mini_chunks: false,
      mini_chunk_size: 150,
    }
  }
}

/// Coordinator scan tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
  /// Seconds between scan passes
  pub scan_interval_secs: u64,
  /// Execution lease timeout in seconds
  pub lease_timeout_secs: u64,
  /// Fraction of the lease timeout after which the lease is reacquired
  /// during long enumerations. Operational tuning, not correctness.
  pub lease_reacquire_fraction: f64,
  /// Documents fetched per enumeration page
  pub enumeration_page_size: usize,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      scan_interval_secs: 30,
      lease_timeout_secs: 120,
      lease_reacquire_fraction: 0.25,
      enumeration_page_size: 256,
    }
  }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub chunking: ChunkingConfig,
  pub coordinator: CoordinatorConfig,
}

impl Config {
  /// Load from a TOML file, falling back to defaults when absent
  pub fn load(path: &Path) -> crate::Result<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|e| crate::Error::Validation(format!("config parse: {}", e)))
  }

  /// Reject configurations the chunker cannot honor
  pub fn validate(&self) -> crate::Result<()> {
    if self.chunking.chunk_size == 0 {
      return Err(crate::Error::Validation("chunk_size must be positive".into()));
    }
    if self.chunking.overlap >= self.chunking.chunk_size {
      return Err(crate::Error::Validation(
        "overlap must be smaller than chunk_size".into(),
      ));
    }
    if !(0.0..=1.0).contains(&self.coordinator.lease_reacquire_fraction) {
      return Err(crate::Error::Validation(
        "lease_reacquire_fraction must be within [0, 1]".into(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_validate() {
    Config::default().validate().unwrap();
  }

  #[test]
  fn test_partial_toml_fills_defaults() {
    let parsed: Config = toml::from_str("[chunking]\nchunk_size = 512\n").unwrap();
    assert_eq!(parsed.chunking.chunk_size, 512);
    assert_eq!(parsed.chunking.overlap, ChunkingConfig::default().overlap);
    assert_eq!(
      parsed.coordinator.scan_interval_secs,
      CoordinatorConfig::default().scan_interval_secs
    );
  }

  #[test]
  fn test_overlap_must_be_under_chunk_size() {
    let mut config = Config::default();
    config.chunking.chunk_size = 100;
    config.chunking.overlap = 100;
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_load_missing_file_defaults() {
    let config = Config::load(Path::new("/nonexistent/dredge.toml")).unwrap();
    assert_eq!(config.chunking.chunk_size, ChunkingConfig::default().chunk_size);
  }
}
