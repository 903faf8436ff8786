//! Payment addresses: a version byte plus a 20-byte hash, shown as Base58Check.
//!
//! The version byte decides the [`PaymentType`]. Only pay-to-pubkey-hash
//! addresses are indexed by the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{PUBKEY_HASH_VERSION, SCRIPT_HASH_VERSION};
use crate::error::AddressError;
use crate::types::{OutputScript, ShortHash};

/// Kind of payment an address encodes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentType {
    /// Pay to the hash of a public key.
    PubkeyHash,
    /// Pay to the hash of a redeem script.
    ScriptHash,
    /// Version byte not recognised.
    Unknown,
}

/// A payment address.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentAddress {
    version: u8,
    hash: ShortHash,
}

impl PaymentAddress {
    /// Raw payload length: version byte + short hash.
    pub const PAYLOAD_LEN: usize = 1 + ShortHash::LEN;

    pub fn new(version: u8, hash: ShortHash) -> Self {
        Self { version, hash }
    }

    /// Pay-to-pubkey-hash address for the given key hash.
    pub fn pubkey_hash(hash: ShortHash) -> Self {
        Self::new(PUBKEY_HASH_VERSION, hash)
    }

    /// Pay-to-script-hash address for the given script hash.
    pub fn script_hash(hash: ShortHash) -> Self {
        Self::new(SCRIPT_HASH_VERSION, hash)
    }

    /// Address paid by an output script, if the script has a standard form.
    pub fn from_script(script: &OutputScript) -> Option<Self> {
        match script {
            OutputScript::PubkeyHash(hash) => Some(Self::pubkey_hash(*hash)),
            OutputScript::ScriptHash(hash) => Some(Self::script_hash(*hash)),
            OutputScript::Raw(_) => None,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash(&self) -> &ShortHash {
        &self.hash
    }

    pub fn payment_type(&self) -> PaymentType {
        match self.version {
            PUBKEY_HASH_VERSION => PaymentType::PubkeyHash,
            SCRIPT_HASH_VERSION => PaymentType::ScriptHash,
            _ => PaymentType::Unknown,
        }
    }

    /// `version || hash`, the form used for index keys and Base58Check.
    pub fn to_payload(&self) -> [u8; Self::PAYLOAD_LEN] {
        let mut out = [0u8; Self::PAYLOAD_LEN];
        out[0] = self.version;
        out[1..].copy_from_slice(self.hash.as_bytes());
        out
    }
}

impl fmt::Display for PaymentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.to_payload()).with_check().into_string())
    }
}

impl FromStr for PaymentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(AddressError::InvalidLength(payload.len()));
        }
        let mut hash = [0u8; ShortHash::LEN];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self::new(payload[0], ShortHash(hash)))
    }
}
