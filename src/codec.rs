//! Standard security handler support on top of lopdf.
//!
//! Verification only derives the file key and checks it against the `/U` and
//! `/O` hashes, so the same loaded [`Document`] can be checked from many worker
//! threads at once. Full decryption and encryption work on a private clone.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use clap::ValueEnum;
use lopdf::encryption::crypt_filters::{Aes128CryptFilter, Aes256CryptFilter, CryptFilter};
use lopdf::xref::XrefEntry;
use lopdf::{
    Dictionary, EncryptionState, EncryptionVersion, Object, ObjectId, Permissions, Reader,
    StringFormat,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::PasswordVerifier;
use crate::error::{EngineError, Result};

/// Cipher family of a standard security handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    /// RC4, revisions 2 and 3 (and V4 documents using the `V2` crypt filter).
    Rc4,
    /// AES-128-CBC, revision 4.
    Aes128,
    /// AES-256-CBC, revisions 5 and 6.
    Aes256,
}

/// Parsed `/Encrypt` dictionary of a loaded document.
#[derive(Debug, Clone)]
pub struct SecurityInfo {
    pub filter: Vec<u8>,
    pub version: i64,
    pub revision: i64,
    pub key_length: i64,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: i64,
    pub file_id: Vec<u8>,
    /// `None` when the handler or revision is not one we implement.
    pub cipher: Option<CipherKind>,
}

/// A parsed PDF plus its security settings. Never mutated after loading.
///
/// For an encrypted source lopdf keeps only the `/Encrypt` dictionary, so the
/// source bytes are retained for [`PdfCipherCodec::decrypt`].
#[derive(Debug, Clone)]
pub struct Document {
    pdf: lopdf::Document,
    source: Arc<[u8]>,
    security: Option<SecurityInfo>,
}

impl Document {
    /// Size of the source buffer in bytes.
    pub fn size(&self) -> usize {
        self.source.len()
    }

    /// Parsed `/Encrypt` dictionary, if any.
    pub fn security(&self) -> Option<&SecurityInfo> {
        self.security.as_ref()
    }

    /// True when the document still needs a password to be read.
    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    /// True when the source carried any encryption, including documents
    /// lopdf could open with the empty user password.
    pub fn is_protected(&self) -> bool {
        self.is_encrypted() || self.pdf.is_encrypted() || self.pdf.encryption_state.is_some()
    }

    /// The lopdf view of the document. Object-less while still encrypted.
    pub fn pdf(&self) -> &lopdf::Document {
        &self.pdf
    }
}

/// Verifies, decrypts and encrypts PDFs.
#[derive(Debug, Clone, Copy)]
pub struct PdfCipherCodec {
    cipher: CipherKind,
}

impl Default for PdfCipherCodec {
    fn default() -> Self {
        Self::new(CipherKind::Aes128)
    }
}

impl PdfCipherCodec {
    /// `cipher` selects the handler used by [`PdfCipherCodec::encrypt`].
    pub fn new(cipher: CipherKind) -> Self {
        Self { cipher }
    }

    /// Cipher used when encrypting.
    pub fn cipher(&self) -> CipherKind {
        self.cipher
    }

    /// Parses `bytes` as a PDF and reads its encryption dictionary.
    pub fn load(&self, bytes: &[u8]) -> Result<Document> {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        if !bytes[start..].starts_with(b"%PDF-") {
            return Err(EngineError::InvalidDocument(
                "missing %PDF- header".to_string(),
            ));
        }

        let pdf = lopdf::Document::load_mem(bytes)
            .map_err(|e| EngineError::InvalidDocument(format!("failed to parse PDF: {e}")))?;
        let security = read_security(&pdf)?;

        if let Some(info) = &security {
            debug!(
                version = info.version,
                revision = info.revision,
                key_length = info.key_length,
                cipher = ?info.cipher,
                "loaded encrypted document"
            );
        }

        Ok(Document {
            pdf,
            source: Arc::from(&bytes[start..]),
            security,
        })
    }

    /// Cipher of an encrypted document, or why it cannot be attacked.
    pub fn handler_cipher(&self, doc: &Document) -> Result<CipherKind> {
        supported_cipher(doc)
    }

    /// Checks `password` against the document's user and owner hashes.
    ///
    /// `Ok(false)` means the password is wrong; errors mean no password can work.
    pub fn try_decrypt(&self, doc: &Document, password: &str) -> Result<bool> {
        supported_cipher(doc)?;

        match doc.pdf.authenticate_password(password) {
            Ok(()) => Ok(true),
            Err(e) => match EngineError::from(e) {
                EngineError::WrongPassword => Ok(false),
                other => Err(other),
            },
        }
    }

    /// Returns the fully decrypted document, without an `/Encrypt` entry.
    pub fn decrypt(&self, doc: &Document, password: &str) -> Result<Vec<u8>> {
        if !self.try_decrypt(doc, password)? {
            return Err(EngineError::WrongPassword);
        }

        let mut pdf = read_all_objects(doc);
        pdf.decrypt(password)?;
        pdf.trailer.remove(b"Encrypt");
        pdf.encryption_state = None;

        if pdf.get_pages().is_empty() {
            return Err(EngineError::Processing(
                "decrypted document has no pages".to_string(),
            ));
        }
        save(&mut pdf)
    }

    /// Encrypts an unprotected document with `password` as both user and owner password.
    pub fn encrypt(&self, doc: &Document, password: &str) -> Result<Vec<u8>> {
        if doc.is_protected() {
            return Err(EngineError::InvalidDocument(
                "document is already encrypted".to_string(),
            ));
        }

        let mut pdf = doc.pdf.clone();
        let mut rng = rand::rng();

        if pdf.trailer.get(b"ID").is_err() {
            let mut id = [0u8; 16];
            rng.fill(&mut id);
            pdf.trailer.set(
                "ID",
                Object::Array(vec![
                    Object::String(id.to_vec(), StringFormat::Hexadecimal),
                    Object::String(id.to_vec(), StringFormat::Hexadecimal),
                ]),
            );
        }

        let mut file_encryption_key = [0u8; 32];
        rng.fill(&mut file_encryption_key);

        let state = self.encryption_state(&pdf, password, &file_encryption_key)?;
        pdf.encrypt(&state)
            .map_err(|e| EngineError::Processing(format!("failed to encrypt document: {e}")))?;

        save(&mut pdf)
    }

    fn encryption_state(
        &self,
        pdf: &lopdf::Document,
        password: &str,
        file_encryption_key: &[u8; 32],
    ) -> Result<EncryptionState> {
        let permissions = Permissions::all();

        let version = match self.cipher {
            CipherKind::Rc4 => EncryptionVersion::V2 {
                document: pdf,
                owner_password: password,
                user_password: password,
                key_length: 128,
                permissions,
            },
            CipherKind::Aes128 => {
                let crypt_filter: Arc<dyn CryptFilter> = Arc::new(Aes128CryptFilter);
                EncryptionVersion::V4 {
                    document: pdf,
                    encrypt_metadata: true,
                    crypt_filters: BTreeMap::from([(b"StdCF".to_vec(), crypt_filter)]),
                    stream_filter: b"StdCF".to_vec(),
                    string_filter: b"StdCF".to_vec(),
                    owner_password: password,
                    user_password: password,
                    permissions,
                }
            }
            CipherKind::Aes256 => {
                let crypt_filter: Arc<dyn CryptFilter> = Arc::new(Aes256CryptFilter);
                EncryptionVersion::V5 {
                    encrypt_metadata: true,
                    crypt_filters: BTreeMap::from([(b"StdCF".to_vec(), crypt_filter)]),
                    file_encryption_key,
                    stream_filter: b"StdCF".to_vec(),
                    string_filter: b"StdCF".to_vec(),
                    owner_password: password,
                    user_password: password,
                    permissions,
                }
            }
        };

        EncryptionState::try_from(version)
            .map_err(|e| EngineError::Processing(format!("failed to derive encryption keys: {e}")))
    }
}

/// Binds a codec to one loaded document for the crack engine.
pub struct Unlock<'a> {
    pub codec: &'a PdfCipherCodec,
    pub document: &'a Document,
}

impl PasswordVerifier for Unlock<'_> {
    fn verify(&self, candidate: &str) -> Result<bool> {
        self.codec.try_decrypt(self.document, candidate)
    }
}

fn supported_cipher(doc: &Document) -> Result<CipherKind> {
    let info = doc.security.as_ref().ok_or_else(|| {
        EngineError::InvalidDocument("document is not encrypted".to_string())
    })?;

    info.cipher.ok_or_else(|| {
        EngineError::UnsupportedCipher(format!(
            "filter {} V{} R{}",
            String::from_utf8_lossy(&info.filter),
            info.version,
            info.revision
        ))
    })
}

/// Re-reads every indirect object of the source, still encrypted, so lopdf can decrypt them.
fn read_all_objects(doc: &Document) -> lopdf::Document {
    let reader = Reader {
        buffer: &doc.source,
        document: doc.pdf.clone(),
        encryption_state: None,
        raw_objects: BTreeMap::new(),
    };

    let ids: Vec<ObjectId> = reader
        .document
        .reference_table
        .entries
        .iter()
        .filter_map(|(&number, entry)| match *entry {
            XrefEntry::Normal { generation, .. } => Some((number, generation)),
            _ => None,
        })
        .collect();

    let mut objects = BTreeMap::new();
    for id in ids {
        match reader.get_object(id, &mut HashSet::new()) {
            Ok(object) => {
                objects.insert(id, object);
            }
            Err(e) => debug!(?id, error = %e, "skipping unreadable object"),
        }
    }

    let mut pdf = reader.document;
    for (id, object) in objects {
        pdf.objects.entry(id).or_insert(object);
    }
    pdf
}

fn save(pdf: &mut lopdf::Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    pdf.save_to(&mut out)
        .map_err(|e| EngineError::Processing(format!("failed to write PDF: {e}")))?;
    Ok(out)
}

fn invalid(message: &str) -> EngineError {
    EngineError::InvalidDocument(message.to_string())
}

fn read_security(pdf: &lopdf::Document) -> Result<Option<SecurityInfo>> {
    let Ok(entry) = pdf.trailer.get(b"Encrypt") else {
        return Ok(None);
    };

    let dict = match entry {
        Object::Reference(id) => pdf
            .get_dictionary(*id)
            .map_err(|_| invalid("/Encrypt reference does not resolve to a dictionary"))?,
        Object::Dictionary(dict) => dict,
        _ => return Err(invalid("/Encrypt is not a dictionary")),
    };

    let filter = dict
        .get(b"Filter")
        .and_then(|o| o.as_name())
        .map_err(|_| invalid("/Encrypt has no /Filter"))?
        .to_vec();
    let version = dict.get(b"V").and_then(|o| o.as_i64()).unwrap_or(0);
    let revision = dict
        .get(b"R")
        .and_then(|o| o.as_i64())
        .map_err(|_| invalid("/Encrypt has no /R"))?;
    let key_length = dict.get(b"Length").and_then(|o| o.as_i64()).unwrap_or(40);
    let owner_hash = dict
        .get(b"O")
        .and_then(|o| o.as_str())
        .map_err(|_| invalid("/Encrypt has no /O"))?
        .to_vec();
    let user_hash = dict
        .get(b"U")
        .and_then(|o| o.as_str())
        .map_err(|_| invalid("/Encrypt has no /U"))?
        .to_vec();
    let permissions = dict
        .get(b"P")
        .and_then(|o| o.as_i64())
        .map_err(|_| invalid("/Encrypt has no /P"))?;
    let file_id = pdf
        .trailer
        .get(b"ID")
        .and_then(|o| o.as_array())
        .ok()
        .and_then(|ids| ids.first())
        .and_then(|first| first.as_str().ok())
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    let cipher = if filter == b"Standard" {
        resolve_cipher(dict, version, revision)
    } else {
        None
    };

    Ok(Some(SecurityInfo {
        filter,
        version,
        revision,
        key_length,
        owner_hash,
        user_hash,
        permissions,
        file_id,
        cipher,
    }))
}

fn resolve_cipher(dict: &Dictionary, version: i64, revision: i64) -> Option<CipherKind> {
    match (version, revision) {
        (1 | 2, 2 | 3) => Some(CipherKind::Rc4),
        (4, 4) => {
            let name = crypt_filter_name(dict)?;
            let method = dict
                .get(b"CF")
                .and_then(|o| o.as_dict())
                .and_then(|cf| cf.get(&name))
                .and_then(|o| o.as_dict())
                .and_then(|f| f.get(b"CFM"))
                .and_then(|o| o.as_name())
                .ok()?;
            match method {
                b"V2" => Some(CipherKind::Rc4),
                b"AESV2" => Some(CipherKind::Aes128),
                _ => None,
            }
        }
        (5, 5 | 6) => Some(CipherKind::Aes256),
        _ => None,
    }
}

/// Crypt filter applied to streams, or to strings when streams are left in the clear.
fn crypt_filter_name(dict: &Dictionary) -> Option<Vec<u8>> {
    [b"StmF".as_slice(), b"StrF".as_slice()]
        .into_iter()
        .filter_map(|key| dict.get(key).and_then(|o| o.as_name()).ok())
        .find(|name| *name != b"Identity")
        .map(<[u8]>::to_vec)
}
