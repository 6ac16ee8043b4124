use lopdf::encryption::DecryptionError;
use thiserror::Error;

/// Failure kinds surfaced by the codec, the candidate generator and the crack engine.
///
/// A wrong password is only an error when a caller asked for a specific
/// password to work (`decrypt`). During a search it is the ordinary
/// "try the next candidate" result and never leaves the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    #[error("incorrect password")]
    WrongPassword,

    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("processing error: {0}")]
    Processing(String),
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::Decryption(DecryptionError::IncorrectPassword) => EngineError::WrongPassword,
            other => EngineError::InvalidDocument(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
