//! Store configuration.
//!
//! [`StoreConfig`] carries the storage directory, engine tuning, and the
//! orphan/checkpoint policy. Values come from [`Default`], optionally layered
//! with a config file and `CHAINKEEP_*` environment variables via
//! [`StoreConfig::load`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use chainkeep_core::constants::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_ORPHAN_CAPACITY, LOCK_FILE_NAME,
};

/// Configuration for a store instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding the lock file and the tables.
    pub data_dir: PathBuf,
    /// LRU block cache shared by the five tables, in bytes.
    pub block_cache_size: usize,
    /// Memtable size per table before it is flushed, in bytes.
    pub write_buffer_size: usize,
    /// Upper bound on open file handles held by the engine.
    pub max_open_files: i32,
    /// Bloom filter bits per key.
    pub bloom_bits_per_key: f64,
    /// Maximum number of blocks held in the orphan pool.
    pub orphan_capacity: usize,
    /// Confirmed blocks between forced flushes.
    pub checkpoint_interval: u64,
    /// Log level filter string (e.g. "info", "chainkeep_store=debug").
    pub log_level: String,
}

/// Total cache budget the defaults are derived from (1 MiB).
const CACHE_BUDGET: usize = 1 << 20;

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chainkeep");

        Self {
            data_dir,
            block_cache_size: CACHE_BUDGET / 2,
            write_buffer_size: CACHE_BUDGET / 4,
            max_open_files: 64,
            bloom_bits_per_key: 10.0,
            orphan_capacity: DEFAULT_ORPHAN_CAPACITY,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Config rooted at `data_dir` with every other value defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from an optional file plus `CHAINKEEP_*` environment
    /// variables. Keys absent from both keep their defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix("CHAINKEEP").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Directory holding the RocksDB tables.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tables")
    }

    /// Path of the advisory lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.orphan_capacity, 20);
        assert_eq!(cfg.checkpoint_interval, 2000);
        assert_eq!(cfg.max_open_files, 64);
        assert_eq!(cfg.block_cache_size, 512 * 1024);
        assert_eq!(cfg.write_buffer_size, 256 * 1024);
    }

    #[test]
    fn default_data_dir_ends_with_chainkeep() {
        let cfg = StoreConfig::default();
        assert!(cfg.data_dir.ends_with("chainkeep"), "{:?}", cfg.data_dir);
    }

    #[test]
    fn paths_hang_off_data_dir() {
        let cfg = StoreConfig::with_data_dir("/tmp/ck");
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/ck/tables"));
        assert_eq!(cfg.lock_path(), PathBuf::from("/tmp/ck/db-lock"));
    }

    #[test]
    fn load_layers_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainkeep.json");
        std::fs::write(
            &path,
            r#"{ "data_dir": "/var/lib/ck", "orphan_capacity": 5 }"#,
        )
        .unwrap();

        let cfg = StoreConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/ck"));
        assert_eq!(cfg.orphan_capacity, 5);
        assert_eq!(cfg.checkpoint_interval, DEFAULT_CHECKPOINT_INTERVAL);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(StoreConfig::load(Some(&missing)).is_err());
    }
}
