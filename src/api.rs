//! HTTP gateway: multipart uploads in, JSON or PDF out, one blocking job per request.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Multipart, Query, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::candidate::{CandidateSpace, Charset};
use crate::codec::{PdfCipherCodec, Unlock};
use crate::config::{Role, Settings};
use crate::encrypt::{DEFAULT_SUGGESTION_LENGTH, EncryptService};
use crate::engine::{CancelToken, CrackEngine, CrackJob, CrackReport, JobState};
use crate::error::EngineError;
use crate::registry::{FileRecord, FileRegistry, FileStatus, RegistryStats};

/// Room for the non-file form fields on top of the upload ceiling.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;
const DEFAULT_BRUTE_LENGTH: usize = 4;
const ROLE_HEADER: &str = "x-role";

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    /// Human-readable error message describing what went wrong
    pub message: String,
}

/// Response of `/crack-pdf`. A search that ran out of candidates is `success: false` with a message.
#[derive(Debug, Serialize, Deserialize)]
pub struct CrackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds spent searching, two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    pub length: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub password: String,
}

/// Application-specific error types for the API
#[derive(Debug)]
pub enum AppError {
    /// Engine, codec and input errors
    Engine(EngineError),
    /// The caller's role does not allow the operation
    Forbidden(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Engine(e) => match e {
                EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                EngineError::InvalidDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::UnsupportedCipher(_) => StatusCode::NOT_IMPLEMENTED,
                EngineError::WrongPassword => StatusCode::UNAUTHORIZED,
                EngineError::ResourceExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
                EngineError::Cancelled => StatusCode::REQUEST_TIMEOUT,
                EngineError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Engine(e) => e.to_string(),
            AppError::Forbidden(message) => message,
        };

        if status.is_server_error() {
            warn!(%status, %message, "request failed");
        }

        let error_response = ErrorResponse {
            success: false,
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

/// Long-lived service components shared by all handlers.
#[derive(Debug)]
pub struct AppState {
    pub settings: Settings,
    pub codec: PdfCipherCodec,
    pub engine: CrackEngine,
    pub encryptor: EncryptService,
    pub registry: FileRegistry,
}

impl AppState {
    /// Builds every component from `settings`.
    pub fn new(settings: Settings) -> Self {
        Self {
            codec: settings.codec(),
            engine: settings.crack_engine(),
            encryptor: settings.encrypt_service(),
            registry: settings.file_registry(),
            settings,
        }
    }

    /// Resolves the caller's role and requires it to allow changes.
    fn authorize(&self, headers: &HeaderMap, action: &str) -> Result<Role, AppError> {
        let role = match headers.get(ROLE_HEADER) {
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    EngineError::InvalidInput("X-Role header is not valid text".to_string())
                })?;
                Role::parse(value)?
            }
            None => self.settings.default_role,
        };

        if !role.can_modify() {
            warn!(?role, action, "role denied");
            return Err(AppError::Forbidden(format!(
                "the {role:?} role is not allowed to {action}"
            )));
        }
        Ok(role)
    }
}

/// Build the application router with all routes configured
pub fn app(settings: Settings) -> Router {
    router(Arc::new(AppState::new(settings)))
}

/// Build the router around an existing state, e.g. to inspect the registry in tests.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .settings
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/encrypt-pdf", post(encrypt_pdf))
        .route("/decrypt-pdf", post(decrypt_pdf))
        .route("/crack-pdf", post(crack_pdf))
        .route("/files", get(list_files))
        .route("/clear-files", delete(clear_files))
        .route("/stats", get(stats))
        .route("/generate-password", get(generate_password))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Encrypt an uploaded PDF and return the protected copy
pub async fn encrypt_pdf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    state.authorize(&headers, "encrypt documents")?;
    let mut form = UploadForm::read(multipart, state.settings.max_upload_bytes).await?;
    let upload = form.take_file()?;
    let password = form.first("password").unwrap_or_default().to_string();

    let task_state = Arc::clone(&state);
    let source = upload.bytes.clone();
    let output = tokio::task::spawn_blocking(move || {
        task_state.encryptor.encrypt(&source, &password)
    })
    .await
    .map_err(|e| EngineError::Processing(format!("encryption task aborted: {e}")))??;

    let name = format!("encrypted_{}", upload.name);
    state
        .registry
        .record(&name, FileStatus::Encrypted, upload.bytes.len() as u64);
    info!(file = %name, "encrypted upload");

    Ok(pdf_response(&name, output))
}

/// Decrypt an uploaded PDF with a known password
pub async fn decrypt_pdf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, AppError> {
    state.authorize(&headers, "decrypt documents")?;
    let mut form = UploadForm::read(multipart, state.settings.max_upload_bytes).await?;
    let upload = form.take_file()?;
    let password = form.first("password").unwrap_or_default().to_string();

    let task_state = Arc::clone(&state);
    let source = upload.bytes.clone();
    let output = tokio::task::spawn_blocking(move || {
        let document = task_state.codec.load(&source)?;
        task_state.codec.decrypt(&document, &password)
    })
    .await
    .map_err(|e| EngineError::Processing(format!("decryption task aborted: {e}")))??;

    Ok(pdf_response(&format!("decrypted_{}", upload.name), output))
}

/// Search for the password of an uploaded PDF
pub async fn crack_pdf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<CrackResponse>, AppError> {
    state.authorize(&headers, "crack documents")?;
    let mut form = UploadForm::read(multipart, state.settings.max_upload_bytes).await?;
    let upload = form.take_file()?;
    let space = form.candidate_space()?;
    state.engine.admit(&space)?;

    let dictionary = matches!(space, CandidateSpace::Dictionary(_));
    info!(
        file = %upload.name,
        mode = space.mode(),
        candidates = space.len(),
        "crack requested"
    );

    // The job stops if this handler is dropped, e.g. when the client goes away.
    let cancel = CancelToken::new();
    let _guard = cancel.drop_guard();

    let task_state = Arc::clone(&state);
    let token = cancel.clone();
    let source = upload.bytes.clone();
    let mut task = tokio::task::spawn_blocking(move || -> Result<CrackReport, EngineError> {
        let document = task_state.codec.load(&source)?;
        task_state.codec.handler_cipher(&document)?;
        let unlock = Unlock {
            codec: &task_state.codec,
            document: &document,
        };
        let mut job = CrackJob::new(space);
        task_state.engine.run(&mut job, &unlock, &token, None)
    });

    let joined = match state.settings.crack_timeout() {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(file = %upload.name, ?limit, "crack timed out, cancelling");
                cancel.cancel();
                task.await
            }
        },
        None => task.await,
    };
    let report = joined.map_err(|e| EngineError::Processing(format!("crack task aborted: {e}")))??;

    let size = upload.bytes.len() as u64;
    match report.state {
        JobState::Found => {
            state.registry.record(&upload.name, FileStatus::Cracked, size);
            Ok(Json(CrackResponse {
                success: true,
                password: report.password,
                message: None,
                time: Some((report.elapsed.as_secs_f64() * 100.0).round() / 100.0),
                attempts: Some(report.attempts),
            }))
        }
        JobState::Exhausted => {
            state.registry.record(&upload.name, FileStatus::Encrypted, size);
            let message = if dictionary {
                "Password not found in wordlist."
            } else {
                "Brute-force failed. Password not found."
            };
            Ok(Json(CrackResponse {
                success: false,
                password: None,
                message: Some(message.to_string()),
                time: None,
                attempts: Some(report.attempts),
            }))
        }
        _ => Err(EngineError::Cancelled.into()),
    }
}

/// List processed files, newest first
pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<FileRecord>> {
    Json(state.registry.list())
}

/// Forget every processed file
pub async fn clear_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    state.authorize(&headers, "clear files")?;
    state.registry.clear_all();
    info!("file registry cleared");

    Ok(Json(StatusResponse {
        success: true,
        message: "All files cleared successfully.".to_string(),
    }))
}

/// Dashboard counters derived from the registry
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<RegistryStats> {
    Json(state.registry.stats())
}

/// Suggest a random password for encryption
pub async fn generate_password(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<SuggestResponse>, AppError> {
    let length = params.length.unwrap_or(DEFAULT_SUGGESTION_LENGTH);
    let password = state.encryptor.suggest_password(length)?;
    Ok(Json(SuggestResponse { password }))
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pdf-pwlab",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn pdf_response(file_name: &str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

struct Upload {
    name: String,
    bytes: Bytes,
}

/// A parsed multipart form: one PDF part plus repeated text fields.
#[derive(Default)]
struct UploadForm {
    file: Option<Upload>,
    fields: HashMap<String, Vec<String>>,
}

impl UploadForm {
    /// Reads the whole form, rejecting non-PDF and oversized files as they arrive.
    async fn read(mut multipart: Multipart, max_upload: usize) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let field_name = field.name().unwrap_or("").to_string();

            if field_name == "file" {
                let name = sanitize_file_name(field.file_name().unwrap_or(""));
                if !is_pdf(field.content_type(), &name) {
                    warn!(file = %name, content_type = ?field.content_type(), "rejected non-PDF upload");
                    return Err(EngineError::InvalidInput(
                        "Please upload a valid PDF file.".to_string(),
                    )
                    .into());
                }

                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > max_upload {
                    return Err(EngineError::ResourceExceeded(format!(
                        "file of {} bytes exceeds the {} byte limit",
                        bytes.len(),
                        max_upload
                    ))
                    .into());
                }
                form.file = Some(Upload { name, bytes });
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.entry(field_name).or_default().push(value);
            }
        }

        Ok(form)
    }

    fn take_file(&mut self) -> Result<Upload, EngineError> {
        self.file
            .take()
            .ok_or_else(|| EngineError::InvalidInput("No file provided in upload".to_string()))
    }

    fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.fields.get(name).into_iter().flatten().map(String::as_str)
    }

    fn candidate_space(&self) -> Result<CandidateSpace, EngineError> {
        match self.first("mode").map(str::trim) {
            Some("dictionary") => {
                let lines = self
                    .all("wordlist[]")
                    .chain(self.all("wordlist"))
                    .flat_map(str::lines);
                Ok(CandidateSpace::dictionary(lines))
            }
            Some("brute") | Some("bruteforce") => {
                let charset = Charset::new(self.first("charset").unwrap_or_default());
                let length = match self.first("length").map(str::trim) {
                    Some(raw) if !raw.is_empty() => raw.parse::<usize>().map_err(|_| {
                        EngineError::InvalidInput(format!("invalid password length '{raw}'"))
                    })?,
                    _ => DEFAULT_BRUTE_LENGTH,
                };
                CandidateSpace::brute_force(charset, length)
            }
            _ => Err(EngineError::InvalidInput("Invalid cracking mode.".to_string())),
        }
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        EngineError::ResourceExceeded(err.body_text()).into()
    } else {
        EngineError::InvalidInput(format!("Failed to read multipart field: {}", err.body_text()))
            .into()
    }
}

/// Trusts the declared media type; without one, the file extension.
fn is_pdf(content_type: Option<&str>, file_name: &str) -> bool {
    match content_type {
        Some(content_type) => content_type
            .split(';')
            .next()
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/pdf")),
        None => file_name.to_ascii_lowercase().ends_with(".pdf"),
    }
}

/// Keeps the last path component and replaces anything outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}
