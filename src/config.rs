//! Configuration for stratadb
//!
//! Centralized configuration with sensible defaults. The database-level
//! `Config` controls blob block geometry and the value codec; the per-structure
//! configs (`ArrayConfig`, `HashIndexConfig`) control growth behavior and are
//! persisted in the metadata blob alongside the structure definitions.

use serde::{Deserialize, Serialize};

use crate::codec::Compression;
use crate::error::{Result, StrataError};

/// Database-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Blob Storage Configuration
    // -------------------------------------------------------------------------
    /// Size in bytes of the first blob block; later blocks grow by one slot
    /// per allocated block
    pub block_size: u64,

    /// Fixed quantum of blob storage inside a block (bytes)
    pub slot_size: u64,

    // -------------------------------------------------------------------------
    // Value Codec Configuration
    // -------------------------------------------------------------------------
    /// Compression applied to encoded blob values
    pub compression: Compression,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 8192,
            slot_size: 32,
            compression: Compression::None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate block/slot geometry
    pub fn validate(&self) -> Result<()> {
        if self.slot_size == 0 {
            return Err(StrataError::Config("slot_size must be non-zero".into()));
        }
        if self.block_size < self.slot_size || self.block_size % self.slot_size != 0 {
            return Err(StrataError::Config(format!(
                "block_size {} must be a positive multiple of slot_size {}",
                self.block_size, self.slot_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the blob block size (bytes)
    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the blob slot size (bytes)
    pub fn slot_size(mut self, size: u64) -> Self {
        self.config.slot_size = size;
        self
    }

    /// Set the blob value compression
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Growth parameters for a growable array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Capacity of the first generation
    pub start_size: u64,

    /// Multiplicative ratio between successive generation capacities
    pub growth_factor: f64,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            start_size: 512,
            growth_factor: 1.33,
        }
    }
}

impl ArrayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.start_size < 2 {
            return Err(StrataError::Config(
                "array start_size must be at least 2".into(),
            ));
        }
        if self.growth_factor <= 1.0 {
            return Err(StrataError::Config(format!(
                "array growth_factor {} must exceed 1.0",
                self.growth_factor
            )));
        }
        Ok(())
    }
}

/// Growth, probing, bloom-filter and cache parameters for a hash index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashIndexConfig {
    /// Exponent of the first generation; capacity = growth_factor ^ p_init
    pub p_init: u32,

    /// Base of the capacity exponent (2 doubles each generation)
    pub growth_factor: u64,

    /// Probe limit scale: generation p allows
    /// round(p * probe_factor * growth_factor) probes
    pub probe_factor: f64,

    /// Bloom segment fan-out: each generation gets capacity * n_bloom_filters
    /// counters. Zero disables bloom filtering.
    pub n_bloom_filters: u64,

    /// Seed for bucket placement hashing
    pub key_seed: u32,

    /// Seed for bloom bucket hashing (must differ from key_seed)
    pub bloom_seed: u32,

    /// Max entries in the LRU position cache. Zero disables the cache.
    pub cache_capacity: usize,
}

impl Default for HashIndexConfig {
    fn default() -> Self {
        Self {
            p_init: 10,
            growth_factor: 2,
            probe_factor: 0.5,
            n_bloom_filters: 10,
            key_seed: 0,
            bloom_seed: 1,
            cache_capacity: 100_000,
        }
    }
}

impl HashIndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.growth_factor < 2 {
            return Err(StrataError::Config(format!(
                "hash index growth_factor {} must be at least 2",
                self.growth_factor
            )));
        }
        if self.p_init == 0 {
            return Err(StrataError::Config("p_init must be non-zero".into()));
        }
        let first_limit =
            (self.p_init as f64 * self.probe_factor * self.growth_factor as f64).round();
        if first_limit < 1.0 {
            return Err(StrataError::Config(format!(
                "probe_factor {} yields a zero probe limit at p_init {}",
                self.probe_factor, self.p_init
            )));
        }
        if self.n_bloom_filters > 0 && self.bloom_seed == self.key_seed {
            return Err(StrataError::Config(
                "bloom_seed must differ from key_seed".into(),
            ));
        }
        Ok(())
    }
}

/// Options for the persistent map wrapper
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Store keys as their 64-bit hash instead of literal strings
    pub hashed_keys: bool,

    /// Fixed width of literal string keys (ignored when hashed_keys is set)
    pub max_key_len: usize,

    /// Max entries in the decoded-value cache. Zero disables it.
    pub value_cache: usize,

    /// Hash index parameters
    pub index: HashIndexConfig,

    /// Database-level parameters
    pub database: Config,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            hashed_keys: true,
            max_key_len: 30,
            value_cache: 10_000,
            index: HashIndexConfig::default(),
            database: Config::default(),
        }
    }
}

impl MapConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.hashed_keys && self.max_key_len == 0 {
            return Err(StrataError::Config(
                "max_key_len must be non-zero for literal keys".into(),
            ));
        }
        self.index.validate()?;
        self.database.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
        ArrayConfig::default().validate().unwrap();
        HashIndexConfig::default().validate().unwrap();
        MapConfig::default().validate().unwrap();
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .block_size(4096)
            .slot_size(64)
            .compression(Compression::Zlib)
            .build();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.slot_size, 64);
        assert_eq!(config.compression, Compression::Zlib);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let config = Config::builder().block_size(100).slot_size(32).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_flat_growth() {
        let config = ArrayConfig {
            start_size: 512,
            growth_factor: 1.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_colliding_seeds() {
        let config = HashIndexConfig {
            key_seed: 7,
            bloom_seed: 7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
