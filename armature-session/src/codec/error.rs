use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Authenticated cookie codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Hash key is not set")]
    HashKeyNotSet,

    #[error("Invalid block key length: {0} (expected 16 or 32 bytes)")]
    InvalidBlockKey(usize),

    #[error("Value is too long: {0} bytes")]
    ValueTooLong(usize),

    #[error("Malformed value: {0}")]
    Malformed(String),

    #[error("The value is not valid")]
    InvalidMac,

    #[error("Timestamp is expired")]
    Expired,

    #[error("Timestamp is too new")]
    TooNew,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No codecs configured")]
    NoCodecs,

    #[error("{}", join_errors(.0))]
    Multi(Vec<CodecError>),
}

fn join_errors(errors: &[CodecError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_error_display() {
        let err = CodecError::Multi(vec![CodecError::InvalidMac, CodecError::Expired]);
        assert_eq!(err.to_string(), "The value is not valid; Timestamp is expired");
    }
}
