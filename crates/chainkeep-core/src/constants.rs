//! Store-wide constants.

/// Address version byte for pay-to-pubkey-hash.
pub const PUBKEY_HASH_VERSION: u8 = 0x00;

/// Address version byte for pay-to-script-hash.
pub const SCRIPT_HASH_VERSION: u8 = 0x05;

/// Default number of blocks the orphan pool holds before evicting.
pub const DEFAULT_ORPHAN_CAPACITY: usize = 20;

/// Default number of confirmed blocks between forced flushes.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 2000;

/// Size of one outpoint record in the address index: hash + 4-byte index.
pub const OUTPOINT_RECORD_SIZE: usize = 32 + 4;

/// Name of the advisory lock file inside the storage directory.
pub const LOCK_FILE_NAME: &str = "db-lock";
