//! Core ledger types: hashes, points, transactions, blocks.
//!
//! Block identity is the double SHA-256 of a fixed header layout. Transaction
//! identity is the BLAKE3 hash of the canonical bincode encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::codec;
use crate::error::CodecError;

/// A 32-byte hash value.
///
/// Used for block header hashes (double SHA-256), transaction hashes
/// (BLAKE3) and merkle roots.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. A block whose `prev_hash` is zero claims to be genesis.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Size of the hash in bytes.
    pub const LEN: usize = 32;

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a Hash256 from a slice. Returns `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte hash identifying a key or script inside an address.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ShortHash(pub [u8; 20]);

impl ShortHash {
    /// Size of the hash in bytes.
    pub const LEN: usize = 20;

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Reference to a specific output of a transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Hash of the transaction containing the output.
    pub hash: Hash256,
    /// Index of the output within the transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint, used for coinbase inputs.
    pub fn null() -> Self {
        Self {
            hash: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// Parses `"<hex hash>:<index>"`.
impl FromStr for OutPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <hash>:<index>, got {s:?}"))?;
        let hash = hash.parse::<Hash256>().map_err(|e| e.to_string())?;
        let index = index.parse::<u32>().map_err(|e| e.to_string())?;
        Ok(Self { hash, index })
    }
}

/// Reference to a specific input of a transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct InputPoint {
    /// Hash of the spending transaction.
    pub hash: Hash256,
    /// Index of the input within the spending transaction.
    pub index: u32,
}

impl fmt::Display for InputPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Opaque unlocking script. Never interpreted by the store.
    pub script: Vec<u8>,
    /// Input sequence number.
    pub sequence: u32,
}

/// Locking condition of an output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum OutputScript {
    /// Pay to the hash of a public key.
    PubkeyHash(ShortHash),
    /// Pay to the hash of a redeem script.
    ScriptHash(ShortHash),
    /// Any other script, kept verbatim.
    Raw(Vec<u8>),
}

/// A transaction output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Output value in base units.
    pub value: u64,
    /// Locking script.
    pub script: OutputScript,
}

/// A transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u32,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block depth or timestamp before which this transaction is not final.
    pub lock_time: u32,
}

impl Transaction {
    /// Compute the transaction hash (BLAKE3 of the canonical encoding).
    pub fn hash(&self) -> Result<Hash256, CodecError> {
        let encoded = codec::encode(self)?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }
}

/// Block header.
///
/// Hash is computed as double SHA-256 over a fixed little-endian byte layout.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u32,
    /// Hash of the previous block header. Zero for genesis.
    pub prev_hash: Hash256,
    /// Merkle root of the block's transaction hashes.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u32,
    /// Compact difficulty bits. Carried, never checked.
    pub bits: u32,
    /// Proof-of-work nonce. Carried, never checked.
    pub nonce: u32,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (4 u32 fields + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 4 * 4 + 2 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Layout: version || prev_hash || merkle_root || timestamp || bits ||
    /// nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.bits.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }

    /// Whether this header claims to start a chain.
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered list of transactions.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Hash of the block header.
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Hashes of all transactions, in block order.
    pub fn transaction_hashes(&self) -> Result<Vec<Hash256>, CodecError> {
        self.transactions.iter().map(Transaction::hash).collect()
    }
}
