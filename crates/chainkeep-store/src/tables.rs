//! The five persistent tables and the directory lock that guards them.
//!
//! All tables live as column families of one RocksDB instance so that a block
//! confirmation (or unconfirmation) touching every table commits as a single
//! [`WriteBatch`]. A `db-lock` file in the data directory is held exclusively
//! for the lifetime of [`Tables`]; a second opener fails fast.

use std::fs::{self, File, OpenOptions};

use fs2::FileExt;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, IteratorMode, Options,
    WriteBatch, DB,
};

use chainkeep_core::error::StoreError;

use crate::config::StoreConfig;

/// A logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// depth -> block header + transaction hashes
    Blocks,
    /// block hash -> depth
    BlocksHash,
    /// transaction hash -> transaction + parent (depth, index)
    Txs,
    /// outpoint -> spending input point
    Spends,
    /// payment address -> concatenated outpoints
    Address,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Blocks,
        Table::BlocksHash,
        Table::Txs,
        Table::Spends,
        Table::Address,
    ];

    /// Column family name.
    pub fn name(self) -> &'static str {
        match self {
            Table::Blocks => "blocks",
            Table::BlocksHash => "blocks_hash",
            Table::Txs => "txs",
            Table::Spends => "spends",
            Table::Address => "address",
        }
    }
}

enum BatchOp {
    Put(Table, Vec<u8>, Vec<u8>),
    Delete(Table, Vec<u8>),
}

/// Mutations staged against several tables, committed atomically by
/// [`Tables::write`].
#[derive(Default)]
pub struct TableBatch {
    ops: Vec<BatchOp>,
}

impl TableBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(table, key.into(), value.into()));
    }

    pub fn delete(&mut self, table: Table, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(table, key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Open handles to the five tables plus the held directory lock.
pub struct Tables {
    // Declared before `lock` so the engine closes before the lock is released.
    db: DB,
    lock: File,
}

impl Tables {
    /// Lock the data directory and open (creating if missing) every table.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir).map_err(|e| StoreError::Io(e.to_string()))?;

        let lock_path = config.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::Io(format!("{}: {e}", lock_path.display())))?;
        lock.try_lock_exclusive().map_err(|e| {
            StoreError::Io(format!(
                "data directory {} is locked by another process: {e}",
                config.data_dir.display()
            ))
        })?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);

        let cache = Cache::new_lru_cache(config.block_cache_size);
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Table::ALL
            .iter()
            .map(|table| {
                let mut block_opts = BlockBasedOptions::default();
                block_opts.set_block_cache(&cache);
                block_opts.set_bloom_filter(config.bloom_bits_per_key, false);

                let mut opts = Options::default();
                opts.set_write_buffer_size(config.write_buffer_size);
                opts.set_compression_type(DBCompressionType::None);
                opts.set_block_based_table_factory(&block_opts);
                ColumnFamilyDescriptor::new(table.name(), opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, config.db_path(), cf_descriptors)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        tracing::info!(path = %config.data_dir.display(), "opened block tables");
        Ok(Self { db, lock })
    }

    fn cf_handle(&self, table: Table) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(table.name())
            .ok_or_else(|| StoreError::OperationFailed(format!("missing table: {}", table.name())))
    }

    pub fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf_handle(table)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StoreError::OperationFailed(e.to_string()))
    }

    pub fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf_handle(table)?;
        self.db
            .put_cf(cf, key, value)
            .map_err(|e| StoreError::OperationFailed(e.to_string()))
    }

    /// Commit every staged mutation atomically.
    pub fn write(&self, batch: TableBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        tracing::trace!(ops = batch.len(), "writing batch");
        let mut wb = WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(table, key, value) => wb.put_cf(self.cf_handle(table)?, key, value),
                BatchOp::Delete(table, key) => wb.delete_cf(self.cf_handle(table)?, key),
            }
        }
        self.db
            .write(wb)
            .map_err(|e| StoreError::OperationFailed(e.to_string()))
    }

    /// Greatest key in `table`, if any.
    pub fn last_key(&self, table: Table) -> Result<Option<Box<[u8]>>, StoreError> {
        let cf = self.cf_handle(table)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item.map_err(|e| StoreError::OperationFailed(e.to_string()))?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    /// Flush every table's memtable to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        for table in Table::ALL {
            let cf = self.cf_handle(table)?;
            self.db
                .flush_cf(cf)
                .map_err(|e| StoreError::OperationFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for Tables {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock) {
            tracing::warn!("failed to release data directory lock: {e}");
        }
    }
}
