//! # chainkeep-core
//! Ledger types, payment addresses, the record codec and the error taxonomy
//! shared by the chainkeep crates.

pub mod address;
pub mod codec;
pub mod constants;
pub mod error;
pub mod merkle;
pub mod types;
