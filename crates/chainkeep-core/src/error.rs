//! Error types for chainkeep.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")] Encode(String),
    #[error("decode failed: {0}")] Decode(String),
    #[error("trailing bytes after record: {0}")] TrailingBytes(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding: {0}")] InvalidEncoding(String),
    #[error("invalid length: {0}")] InvalidLength(usize),
}

/// Outcomes of store operations other than success.
///
/// `Duplicate`, `NotFound` and `UnspentOutput` are expected results of normal
/// operation rather than faults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")] Io(String),
    #[error("operation failed: {0}")] OperationFailed(String),
    #[error("duplicate block")] Duplicate,
    #[error("not found")] NotFound,
    #[error("unsupported payment type")] UnsupportedPaymentType,
    #[error("output is unspent")] UnspentOutput,
    #[error("service stopped")] ServiceStopped,
    #[error("stored record failed to parse: {0}")] Decode(String),
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Encode(msg) => StoreError::OperationFailed(msg),
            other => StoreError::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_stay_distinct_from_not_found() {
        let err: StoreError = CodecError::Decode("bad varint".into()).into();
        assert!(matches!(err, StoreError::Decode(_)));
        assert_ne!(err, StoreError::NotFound);
    }

    #[test]
    fn encode_failures_become_operation_failed() {
        let err: StoreError = CodecError::Encode("too large".into()).into();
        assert_eq!(err, StoreError::OperationFailed("too large".into()));
    }
}
