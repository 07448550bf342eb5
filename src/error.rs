//! Defines the custom error type for the `keyscaler-agent` crate.

use thiserror::Error;

/// The main error type for the `keyscaler-agent` crate.
///
/// Asset processors never let these escape to the [`AssetManager`](crate::asset::AssetManager);
/// they are folded into the processor's failure state and its acknowledgement instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("deserialization failed: {0}")]
    Deserialize(String),

    #[error("decoding from Base64 failed: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("missing mandatory field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("encryption or decryption failed: {0}")]
    Crypto(String),

    #[error("signature verification failed: {0}")]
    Signature(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("TPM error: {0}")]
    Tpm(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("invalid data format: {0}")]
    Format(String),
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Format(format!("UTF-8 conversion error: {}", err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
