//! Forward encryption and password suggestions.

use rand::Rng;
use tracing::info;

use crate::codec::PdfCipherCodec;
use crate::error::{EngineError, Result};

pub const DEFAULT_SUGGESTION_LENGTH: usize = 10;
pub const MIN_SUGGESTION_LENGTH: usize = 4;
pub const MAX_SUGGESTION_LENGTH: usize = 128;

const SUGGESTION_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces password-protected copies of plain PDFs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptService {
    codec: PdfCipherCodec,
}

impl EncryptService {
    /// Encrypts with the cipher selected on `codec`.
    pub fn new(codec: PdfCipherCodec) -> Self {
        Self { codec }
    }

    /// Encrypts `source` with `password` as user and owner password.
    ///
    /// Unreadable or already protected sources are processing errors.
    pub fn encrypt(&self, source: &[u8], password: &str) -> Result<Vec<u8>> {
        if password.is_empty() {
            return Err(EngineError::InvalidInput("password must not be empty".to_string()));
        }

        let document = self.codec.load(source).map_err(into_processing)?;
        let output = self
            .codec
            .encrypt(&document, password)
            .map_err(into_processing)?;

        info!(
            cipher = ?self.codec.cipher(),
            input_bytes = source.len(),
            output_bytes = output.len(),
            "encrypted document"
        );
        Ok(output)
    }

    /// Random alphanumeric password from the thread-local CSPRNG.
    pub fn suggest_password(&self, length: usize) -> Result<String> {
        if !(MIN_SUGGESTION_LENGTH..=MAX_SUGGESTION_LENGTH).contains(&length) {
            return Err(EngineError::InvalidInput(format!(
                "password length must be between {MIN_SUGGESTION_LENGTH} and {MAX_SUGGESTION_LENGTH}"
            )));
        }

        let mut rng = rand::rng();
        Ok((0..length)
            .map(|_| char::from(SUGGESTION_ALPHABET[rng.random_range(0..SUGGESTION_ALPHABET.len())]))
            .collect())
    }
}

fn into_processing(err: EngineError) -> EngineError {
    match err {
        EngineError::InvalidDocument(message) => EngineError::Processing(message),
        other => other,
    }
}
