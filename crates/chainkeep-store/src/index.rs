//! Typed access to the confirmed chain.
//!
//! [`ChainIndex`] turns blocks into table rows and back. Confirming a block
//! writes its block record, hash→depth entry, transaction records, spend
//! entries and address entries as one batch; unconfirming the tip reverses
//! exactly those rows in one batch.

use std::collections::{HashMap, HashSet};

use chainkeep_core::address::{PaymentAddress, PaymentType};
use chainkeep_core::error::StoreError;
use chainkeep_core::types::{Block, Hash256, InputPoint, OutPoint, OutputScript, Transaction};

use crate::config::StoreConfig;
use crate::organizer::ChainKeeper;
use crate::records::{
    address_key, depth_from_bytes, depth_key, input_point_bytes, input_point_from_bytes,
    outpoint_key, pack_outpoints, unpack_outpoints, BlockRecord, TransactionRecord, TxPosition,
};
use crate::tables::{Table, TableBatch, Tables};

/// Addresses a confirmed block either by depth or by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLocator {
    Depth(u64),
    Hash(Hash256),
}

impl From<u64> for BlockLocator {
    fn from(depth: u64) -> Self {
        BlockLocator::Depth(depth)
    }
}

impl From<Hash256> for BlockLocator {
    fn from(hash: Hash256) -> Self {
        BlockLocator::Hash(hash)
    }
}

/// Only pay-to-pubkey-hash outputs are indexed by address.
fn indexed_address(script: &OutputScript) -> Option<PaymentAddress> {
    PaymentAddress::from_script(script).filter(|a| a.payment_type() == PaymentType::PubkeyHash)
}

/// The confirmed chain stored in [`Tables`].
pub struct ChainIndex {
    tables: Tables,
}

impl ChainIndex {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            tables: Tables::open(config)?,
        })
    }

    /// Depth of a confirmed block, `None` if the hash is not confirmed.
    pub fn block_depth(&self, hash: &Hash256) -> Result<Option<u64>, StoreError> {
        self.tables
            .get(Table::BlocksHash, hash.as_bytes())?
            .map(|bytes| depth_from_bytes(&bytes))
            .transpose()
    }

    /// Depth of the current tip, `None` on an empty chain.
    pub fn last_depth(&self) -> Result<Option<u64>, StoreError> {
        self.tables
            .last_key(Table::Blocks)?
            .map(|key| depth_from_bytes(&key))
            .transpose()
    }

    fn resolve_depth(&self, at: BlockLocator) -> Result<u64, StoreError> {
        match at {
            BlockLocator::Depth(depth) => Ok(depth),
            BlockLocator::Hash(hash) => self.block_depth(&hash)?.ok_or(StoreError::NotFound),
        }
    }

    pub fn block_record(&self, at: BlockLocator) -> Result<BlockRecord, StoreError> {
        let depth = self.resolve_depth(at)?;
        let bytes = self
            .tables
            .get(Table::Blocks, &depth_key(depth))?
            .ok_or(StoreError::NotFound)?;
        BlockRecord::from_bytes(&bytes)
    }

    /// Reassemble a full block from its record and transaction records.
    pub fn block(&self, at: BlockLocator) -> Result<Block, StoreError> {
        let record = self.block_record(at)?;
        let transactions = record
            .tx_hashes
            .iter()
            .map(|hash| self.transaction(hash).map(|r| r.tx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Block {
            header: record.header,
            transactions,
        })
    }

    pub fn transaction(&self, hash: &Hash256) -> Result<TransactionRecord, StoreError> {
        let bytes = self
            .tables
            .get(Table::Txs, hash.as_bytes())?
            .ok_or(StoreError::NotFound)?;
        TransactionRecord::from_bytes(&bytes)
    }

    /// The input spending `outpoint`, or `UnspentOutput`.
    pub fn spend(&self, outpoint: &OutPoint) -> Result<InputPoint, StoreError> {
        let bytes = self
            .tables
            .get(Table::Spends, &outpoint_key(outpoint))?
            .ok_or(StoreError::UnspentOutput)?;
        input_point_from_bytes(&bytes)
    }

    /// Every outpoint ever paid to `address` by a confirmed block.
    pub fn outputs(&self, address: &PaymentAddress) -> Result<Vec<OutPoint>, StoreError> {
        let bytes = self
            .tables
            .get(Table::Address, &address_key(address))?
            .ok_or(StoreError::NotFound)?;
        unpack_outpoints(&bytes)
    }

    /// Write `block` at `depth` without any chain checks.
    ///
    /// The caller vouches that `depth` is free and the parent sits at
    /// `depth - 1`; only an already-confirmed hash is refused.
    pub fn import(&self, depth: u64, block: &Block) -> Result<(), StoreError> {
        let hash = block.hash();
        if self.block_depth(&hash)?.is_some() {
            return Err(StoreError::Duplicate);
        }
        self.save_block(depth, block)?;
        tracing::debug!(depth, %hash, "imported block");
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.tables.flush()
    }

    /// Whether `outpoint` names an output that exists, looking first at
    /// transactions earlier in the block being confirmed.
    fn output_exists(
        &self,
        outpoint: &OutPoint,
        same_block: &HashMap<Hash256, &Transaction>,
    ) -> Result<bool, StoreError> {
        let outputs = match same_block.get(&outpoint.hash) {
            Some(tx) => tx.outputs.len(),
            None => match self.tables.get(Table::Txs, outpoint.hash.as_bytes())? {
                Some(bytes) => TransactionRecord::from_bytes(&bytes)?.tx.outputs.len(),
                None => return Ok(false),
            },
        };
        Ok((outpoint.index as usize) < outputs)
    }

    fn save_block(&self, depth: u64, block: &Block) -> Result<(), StoreError> {
        let hash = block.hash();
        let tx_hashes = block.transaction_hashes()?;

        let mut batch = TableBatch::new();
        let record = BlockRecord {
            header: block.header.clone(),
            tx_hashes: tx_hashes.clone(),
        };
        batch.put(Table::Blocks, depth_key(depth), record.to_bytes()?);
        batch.put(Table::BlocksHash, hash.as_bytes(), depth_key(depth));

        let mut same_block: HashMap<Hash256, &Transaction> = HashMap::new();
        let mut paid: HashMap<PaymentAddress, Vec<OutPoint>> = HashMap::new();

        for (index, (tx, tx_hash)) in block.transactions.iter().zip(&tx_hashes).enumerate() {
            let record = TransactionRecord {
                tx: tx.clone(),
                position: TxPosition {
                    depth,
                    index: index as u32,
                },
            };
            batch.put(Table::Txs, tx_hash.as_bytes(), record.to_bytes()?);

            if !tx.is_coinbase() {
                for (input_index, input) in tx.inputs.iter().enumerate() {
                    let prev = &input.previous_output;
                    if !self.output_exists(prev, &same_block)? {
                        tracing::warn!(outpoint = %prev, block = %hash, "spent output not found, spend not indexed");
                        continue;
                    }
                    let spender = InputPoint {
                        hash: *tx_hash,
                        index: input_index as u32,
                    };
                    batch.put(Table::Spends, outpoint_key(prev), input_point_bytes(&spender));
                }
            }

            for (output_index, output) in tx.outputs.iter().enumerate() {
                if let Some(address) = indexed_address(&output.script) {
                    paid.entry(address).or_default().push(OutPoint {
                        hash: *tx_hash,
                        index: output_index as u32,
                    });
                }
            }
            same_block.insert(*tx_hash, tx);
        }

        for (address, fresh) in paid {
            let key = address_key(&address);
            let mut value = self.tables.get(Table::Address, &key)?.unwrap_or_default();
            value.extend_from_slice(&pack_outpoints(&fresh));
            batch.put(Table::Address, key, value);
        }

        self.tables.write(batch)
    }

    /// Remove the tip block and every index row it produced.
    fn remove_tip(&self) -> Result<Block, StoreError> {
        let depth = self.last_depth()?.ok_or(StoreError::NotFound)?;
        let record = self.block_record(BlockLocator::Depth(depth))?;
        let hash = record.header.hash();

        let mut batch = TableBatch::new();
        batch.delete(Table::Blocks, depth_key(depth));
        batch.delete(Table::BlocksHash, hash.as_bytes());

        let mut transactions = Vec::with_capacity(record.tx_hashes.len());
        let mut unpaid: HashMap<PaymentAddress, HashSet<OutPoint>> = HashMap::new();

        for tx_hash in &record.tx_hashes {
            let tx = self.transaction(tx_hash)?.tx;
            batch.delete(Table::Txs, tx_hash.as_bytes());

            if !tx.is_coinbase() {
                for (input_index, input) in tx.inputs.iter().enumerate() {
                    let key = outpoint_key(&input.previous_output);
                    let Some(bytes) = self.tables.get(Table::Spends, &key)? else {
                        continue;
                    };
                    let spender = InputPoint {
                        hash: *tx_hash,
                        index: input_index as u32,
                    };
                    if input_point_from_bytes(&bytes)? == spender {
                        batch.delete(Table::Spends, key);
                    }
                }
            }

            for (output_index, output) in tx.outputs.iter().enumerate() {
                if let Some(address) = indexed_address(&output.script) {
                    unpaid.entry(address).or_default().insert(OutPoint {
                        hash: *tx_hash,
                        index: output_index as u32,
                    });
                }
            }
            transactions.push(tx);
        }

        for (address, gone) in unpaid {
            let key = address_key(&address);
            let Some(bytes) = self.tables.get(Table::Address, &key)? else {
                continue;
            };
            let kept: Vec<OutPoint> = unpack_outpoints(&bytes)?
                .into_iter()
                .filter(|outpoint| !gone.contains(outpoint))
                .collect();
            if kept.is_empty() {
                batch.delete(Table::Address, key);
            } else {
                batch.put(Table::Address, key, pack_outpoints(&kept));
            }
        }

        self.tables.write(batch)?;
        tracing::debug!(depth, %hash, "unconfirmed block");
        Ok(Block {
            header: record.header,
            transactions,
        })
    }
}

impl ChainKeeper for ChainIndex {
    fn find_depth(&self, hash: &Hash256) -> Result<Option<u64>, StoreError> {
        self.block_depth(hash)
    }

    fn last_depth(&self) -> Result<Option<u64>, StoreError> {
        ChainIndex::last_depth(self)
    }

    fn confirm(&mut self, depth: u64, block: &Block) -> Result<(), StoreError> {
        self.save_block(depth, block)
    }

    fn unconfirm_tip(&mut self) -> Result<Block, StoreError> {
        self.remove_tip()
    }
}
