//! Service settings, read from command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::codec::{CipherKind, PdfCipherCodec};
use crate::encrypt::EncryptService;
use crate::engine::CrackEngine;
use crate::error::{EngineError, Result};
use crate::registry::FileRegistry;

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
/// Attempt ceiling of a single crack job.
pub const DEFAULT_MAX_CANDIDATES: u64 = 10_000_000;
pub const DEFAULT_REGISTRY_CAPACITY: usize = 50;
pub const DEFAULT_SHARD_RETRIES: usize = 1;
pub const DEFAULT_CRACK_TIMEOUT_SECS: u64 = 300;

/// Caller role, checked once at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access.
    Admin,
    /// Read-only dashboard access.
    Viewer,
}

impl Role {
    /// Parses an `X-Role` header value, ignoring case.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            other => Err(EngineError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }

    /// Whether the role may change state or start jobs.
    pub fn can_modify(self) -> bool {
        self == Role::Admin
    }
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Address the HTTP service listens on
    #[arg(long, env = "PDF_PWLAB_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Worker threads per crack job (0 = one per core)
    #[arg(long, env = "PDF_PWLAB_WORKERS", default_value_t = 0)]
    pub workers: usize,

    /// Largest accepted upload in bytes
    #[arg(long = "max-upload", env = "PDF_PWLAB_MAX_UPLOAD", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Largest candidate space a crack job may search
    #[arg(long, env = "PDF_PWLAB_MAX_CANDIDATES", default_value_t = DEFAULT_MAX_CANDIDATES)]
    pub max_candidates: u64,

    /// Number of file records kept for the dashboard
    #[arg(long, env = "PDF_PWLAB_REGISTRY_CAPACITY", default_value_t = DEFAULT_REGISTRY_CAPACITY)]
    pub registry_capacity: usize,

    /// Restarts allowed for a shard whose worker crashed
    #[arg(long, env = "PDF_PWLAB_SHARD_RETRIES", default_value_t = DEFAULT_SHARD_RETRIES)]
    pub shard_retries: usize,

    /// Seconds before a crack request is cancelled (0 = never)
    #[arg(long = "crack-timeout", env = "PDF_PWLAB_CRACK_TIMEOUT", default_value_t = DEFAULT_CRACK_TIMEOUT_SECS)]
    pub crack_timeout_secs: u64,

    /// Cipher used when encrypting documents
    #[arg(long, env = "PDF_PWLAB_CIPHER", value_enum, default_value_t = CipherKind::Aes128)]
    pub cipher: CipherKind,

    /// Role assumed for requests without an X-Role header
    #[arg(long, env = "PDF_PWLAB_DEFAULT_ROLE", value_enum, default_value_t = Role::Admin)]
    pub default_role: Role,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            workers: 0,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            shard_retries: DEFAULT_SHARD_RETRIES,
            crack_timeout_secs: DEFAULT_CRACK_TIMEOUT_SECS,
            cipher: CipherKind::Aes128,
            default_role: Role::Admin,
        }
    }
}

impl Settings {
    /// Codec encrypting with the configured cipher.
    pub fn codec(&self) -> PdfCipherCodec {
        PdfCipherCodec::new(self.cipher)
    }

    /// Engine with the configured worker and candidate limits.
    pub fn crack_engine(&self) -> CrackEngine {
        CrackEngine::new(self.workers, self.max_candidates, self.shard_retries)
    }

    /// Encryption service over [`Settings::codec`].
    pub fn encrypt_service(&self) -> EncryptService {
        EncryptService::new(self.codec())
    }

    /// Empty registry of the configured capacity.
    pub fn file_registry(&self) -> FileRegistry {
        FileRegistry::new(self.registry_capacity)
    }

    /// Per-request crack deadline, `None` when disabled.
    pub fn crack_timeout(&self) -> Option<Duration> {
        (self.crack_timeout_secs > 0).then(|| Duration::from_secs(self.crack_timeout_secs))
    }
}
