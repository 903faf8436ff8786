//! Key layouts and value records for the five tables.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use chainkeep_core::address::PaymentAddress;
use chainkeep_core::codec;
use chainkeep_core::constants::OUTPOINT_RECORD_SIZE;
use chainkeep_core::error::StoreError;
use chainkeep_core::types::{BlockHeader, Hash256, InputPoint, OutPoint, Transaction};

/// Value of the `blocks` table: header plus ordered transaction hashes.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockRecord {
    pub header: BlockHeader,
    pub tx_hashes: Vec<Hash256>,
}

/// Where a confirmed transaction sits in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct TxPosition {
    /// Depth of the containing block.
    pub depth: u64,
    /// Index of the transaction within that block.
    pub index: u32,
}

/// Value of the `txs` table.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TransactionRecord {
    pub tx: Transaction,
    pub position: TxPosition,
}

impl BlockRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(codec::encode(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(codec::decode(bytes)?)
    }
}

impl TransactionRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(codec::encode(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(codec::decode(bytes)?)
    }
}

/// 8-byte big-endian depth key; keeps iteration in depth order.
pub fn depth_key(depth: u64) -> [u8; 8] {
    depth.to_be_bytes()
}

pub fn depth_from_bytes(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Decode(format!("depth must be 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// 32-byte hash followed by the 4-byte little-endian index.
pub fn point_bytes(hash: &Hash256, index: u32) -> [u8; OUTPOINT_RECORD_SIZE] {
    let mut out = [0u8; OUTPOINT_RECORD_SIZE];
    out[..32].copy_from_slice(hash.as_bytes());
    out[32..].copy_from_slice(&index.to_le_bytes());
    out
}

fn split_point(bytes: &[u8]) -> Result<(Hash256, u32), StoreError> {
    if bytes.len() != OUTPOINT_RECORD_SIZE {
        return Err(StoreError::Decode(format!(
            "point must be {OUTPOINT_RECORD_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    let hash = Hash256::from_slice(&bytes[..32])
        .ok_or_else(|| StoreError::Decode("bad point hash".into()))?;
    let mut index = [0u8; 4];
    index.copy_from_slice(&bytes[32..]);
    Ok((hash, u32::from_le_bytes(index)))
}

pub fn outpoint_key(outpoint: &OutPoint) -> [u8; OUTPOINT_RECORD_SIZE] {
    point_bytes(&outpoint.hash, outpoint.index)
}

pub fn input_point_bytes(point: &InputPoint) -> [u8; OUTPOINT_RECORD_SIZE] {
    point_bytes(&point.hash, point.index)
}

pub fn input_point_from_bytes(bytes: &[u8]) -> Result<InputPoint, StoreError> {
    let (hash, index) = split_point(bytes)?;
    Ok(InputPoint { hash, index })
}

pub fn address_key(address: &PaymentAddress) -> [u8; PaymentAddress::PAYLOAD_LEN] {
    address.to_payload()
}

/// Split an address-index value into its outpoints.
///
/// A length that is not a multiple of the record size means the table is
/// corrupt; that is reported as `OperationFailed`, not as bad user input.
pub fn unpack_outpoints(value: &[u8]) -> Result<Vec<OutPoint>, StoreError> {
    if value.len() % OUTPOINT_RECORD_SIZE != 0 {
        tracing::error!(len = value.len(), "address index value is not a whole number of outpoints");
        return Err(StoreError::OperationFailed(format!(
            "address index value length {} not a multiple of {OUTPOINT_RECORD_SIZE}",
            value.len()
        )));
    }
    value
        .chunks_exact(OUTPOINT_RECORD_SIZE)
        .map(|chunk| {
            let (hash, index) = split_point(chunk)?;
            Ok(OutPoint { hash, index })
        })
        .collect()
}

pub fn pack_outpoints(outpoints: &[OutPoint]) -> Vec<u8> {
    let mut value = Vec::with_capacity(outpoints.len() * OUTPOINT_RECORD_SIZE);
    for outpoint in outpoints {
        value.extend_from_slice(&outpoint_key(outpoint));
    }
    value
}
