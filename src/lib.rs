//! # pdf-pwlab
//!
//! Password recovery and protection for PDF documents: a parallel
//! dictionary/brute-force search over the standard security handler, forward
//! encryption, and the HTTP service that exposes both.

pub mod api;
pub mod candidate;
pub mod codec;
pub mod config;
pub mod encrypt;
pub mod engine;
pub mod error;
pub mod registry;

#[cfg(test)]
mod fixtures;

pub use api::{AppError, AppState, CrackResponse, ErrorResponse, app, router};
pub use candidate::{CandidateSpace, Charset};
pub use codec::{CipherKind, Document, PdfCipherCodec, Unlock};
pub use config::{Role, Settings};
pub use encrypt::EncryptService;
pub use engine::{CancelToken, CrackEngine, CrackJob, CrackReport, JobState, PasswordVerifier};
pub use error::{EngineError, Result};
pub use registry::{FileRecord, FileRegistry, FileStatus, RegistryStats};
