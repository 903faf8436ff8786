//! Record codec: bincode with the standard configuration.
//!
//! Decoding yields either a fully populated value or a [`CodecError`]; a
//! record with bytes left over after the value is rejected.

use bincode::{Decode, Encode};

use crate::error::CodecError;

/// Encode a value into its canonical byte form.
pub fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value that must occupy the whole slice.
pub fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, read) = decode_prefix(bytes)?;
    if read != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - read));
    }
    Ok(value)
}

/// Decode one value from the front of `bytes`, returning it with the number
/// of bytes consumed. Used for streams of concatenated records.
pub fn decode_prefix<T: Decode<()>>(bytes: &[u8]) -> Result<(T, usize), CodecError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CodecError::Decode(e.to_string()))
}
