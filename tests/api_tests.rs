//! HTTP-level tests for the pdf-pwlab service

mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use pdf_pwlab::{
    AppState, CipherKind, CrackResponse, EncryptService, ErrorResponse, FileRecord, FileStatus,
    PdfCipherCodec, Settings, router,
};
use pretty_assertions::assert_eq;
use tower::util::ServiceExt;

use common::{BOUNDARY, Part, multipart, page_content, sample_pdf};

fn test_state(settings: Settings) -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::new(settings));
    let app = router(Arc::clone(&state));
    (state, app)
}

fn default_app() -> (Arc<AppState>, Router) {
    test_state(Settings {
        workers: 2,
        ..Settings::default()
    })
}

fn locked_pdf(password: &str) -> Vec<u8> {
    EncryptService::new(PdfCipherCodec::new(CipherKind::Aes128))
        .encrypt(&sample_pdf("locked"), password)
        .unwrap()
}

fn form_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart(parts)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn pdf_part(bytes: &[u8]) -> Part<'_> {
    Part::File {
        filename: "report.pdf",
        content_type: "application/pdf",
        bytes,
    }
}

#[tokio::test]
async fn test_health_check_endpoint() {
    let (_, app) = default_app();
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_encrypt_returns_protected_pdf_and_records_it() {
    let (state, app) = default_app();
    let source = sample_pdf("quarterly numbers");

    let response = app
        .oneshot(form_request(
            "/encrypt-pdf",
            &[pdf_part(&source), Part::Field("password", "hunter2")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/pdf"
    );
    assert_eq!(
        response.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"encrypted_report.pdf\""
    );

    let body = body_bytes(response).await;
    assert!(body.starts_with(b"%PDF"));
    let codec = PdfCipherCodec::default();
    let doc = codec.load(&body).unwrap();
    assert!(doc.is_encrypted());
    assert!(codec.try_decrypt(&doc, "hunter2").unwrap());

    let records = state.registry.list();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "encrypted_report.pdf");
    assert_eq!(records[0].status, FileStatus::Encrypted);
    assert_eq!(records[0].size_bytes, source.len() as u64);
}

#[tokio::test]
async fn test_encrypt_requires_password() {
    let (state, app) = default_app();
    let source = sample_pdf("x");

    let response = app
        .oneshot(form_request("/encrypt-pdf", &[pdf_part(&source)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert!(!error.success);
    assert!(error.message.contains("password"));
    assert!(state.registry.list().is_empty());
}

#[tokio::test]
async fn test_encrypt_rejects_already_protected_pdf() {
    let (_, app) = default_app();
    let locked = locked_pdf("first");

    let response = app
        .oneshot(form_request(
            "/encrypt-pdf",
            &[pdf_part(&locked), Part::Field("password", "second")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_non_pdf_upload_is_rejected_before_work() {
    let (state, app) = default_app();

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                Part::File {
                    filename: "notes.txt",
                    content_type: "text/plain",
                    bytes: b"just text",
                },
                Part::Field("mode", "dictionary"),
                Part::Field("wordlist[]", "abc"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert!(!error.success);
    assert!(state.registry.list().is_empty());
}

#[tokio::test]
async fn test_dictionary_crack_finds_password() {
    let (state, app) = default_app();
    let locked = locked_pdf("Tr0ub4dor&3");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&locked),
                Part::Field("mode", "dictionary"),
                Part::Field("wordlist[]", "abc"),
                Part::Field("wordlist[]", "Tr0ub4dor&3"),
                Part::Field("wordlist[]", "zzz"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: CrackResponse = json(response).await;
    assert!(result.success);
    assert_eq!(result.password.as_deref(), Some("Tr0ub4dor&3"));
    assert!(result.time.is_some());

    let records = state.registry.list();
    assert_eq!(records[0].name, "report.pdf");
    assert_eq!(records[0].status, FileStatus::Cracked);
}

#[tokio::test]
async fn test_brute_force_crack_finds_password() {
    let (_, app) = default_app();
    let locked = locked_pdf("cab");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&locked),
                Part::Field("mode", "brute"),
                Part::Field("charset", "abc"),
                Part::Field("length", "3"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: CrackResponse = json(response).await;
    assert!(result.success);
    assert_eq!(result.password.as_deref(), Some("cab"));
    assert!(result.attempts.unwrap() <= 27);
}

#[tokio::test]
async fn test_exhausted_search_reports_not_found() {
    let (state, app) = default_app();
    let locked = locked_pdf("not-in-list");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&locked),
                Part::Field("mode", "dictionary"),
                Part::Field("wordlist[]", "alpha\nbeta\n\ngamma"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: CrackResponse = json(response).await;
    assert!(!result.success);
    assert_eq!(result.password, None);
    assert_eq!(result.message.as_deref(), Some("Password not found in wordlist."));
    assert_eq!(result.attempts, Some(3));
    assert_eq!(state.registry.list()[0].status, FileStatus::Encrypted);
}

#[tokio::test]
async fn test_oversized_search_space_is_rejected() {
    let (state, app) = default_app();
    let locked = locked_pdf("whatever");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&locked),
                Part::Field("mode", "brute"),
                Part::Field("charset", ""),
                Part::Field("length", "8"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(state.registry.list().is_empty());
}

#[tokio::test]
async fn test_invalid_mode_is_bad_request() {
    let (_, app) = default_app();
    let locked = locked_pdf("x1");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[pdf_part(&locked), Part::Field("mode", "rainbow")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.message, "invalid input: Invalid cracking mode.");
}

#[tokio::test]
async fn test_crack_unprotected_pdf_is_invalid_document() {
    let (_, app) = default_app();
    let plain = sample_pdf("open");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&plain),
                Part::Field("mode", "dictionary"),
                Part::Field("wordlist[]", "abc"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let (_, app) = test_state(Settings {
        max_upload_bytes: 64,
        ..Settings::default()
    });
    let locked = locked_pdf("abc");

    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&locked),
                Part::Field("mode", "dictionary"),
                Part::Field("wordlist[]", "abc"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_decrypt_round_trip() {
    let (_, app) = default_app();
    let locked = locked_pdf("open sesame");

    let response = app
        .oneshot(form_request(
            "/decrypt-pdf",
            &[pdf_part(&locked), Part::Field("password", "open sesame")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    let doc = PdfCipherCodec::default().load(&body).unwrap();
    assert!(!doc.is_encrypted());
    assert_eq!(page_content(&body), page_content(&sample_pdf("locked")));
}

#[tokio::test]
async fn test_decrypt_wrong_password_is_unauthorized() {
    let (_, app) = default_app();
    let locked = locked_pdf("open sesame");

    let response = app
        .oneshot(form_request(
            "/decrypt-pdf",
            &[pdf_part(&locked), Part::Field("password", "close sesame")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_cannot_crack_but_can_list() {
    let (_, app) = default_app();
    let locked = locked_pdf("abc");

    let mut request = form_request(
        "/crack-pdf",
        &[
            pdf_part(&locked),
            Part::Field("mode", "dictionary"),
            Part::Field("wordlist[]", "abc"),
        ],
    );
    request
        .headers_mut()
        .insert("x-role", "Viewer".parse().unwrap());

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut listing = get("/files");
    listing
        .headers_mut()
        .insert("x-role", "viewer".parse().unwrap());
    let response = app.oneshot(listing).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_role_is_bad_request() {
    let (_, app) = default_app();
    let request = Request::builder()
        .uri("/clear-files")
        .method("DELETE")
        .header("x-role", "root")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_files_are_listed_newest_first_and_cleared() {
    let (state, app) = default_app();
    state.registry.record("old.pdf", FileStatus::Encrypted, 1024);
    state.registry.record("new.pdf", FileStatus::Cracked, 2048);

    let response = app.clone().oneshot(get("/files")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let records: Vec<FileRecord> = json(response).await;
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["new.pdf", "old.pdf"]);

    let stats: serde_json::Value = json(app.clone().oneshot(get("/stats")).await.unwrap()).await;
    assert_eq!(stats["totalFiles"], 2);
    assert_eq!(stats["successRate"], 50);

    let clear = Request::builder()
        .uri("/clear-files")
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(clear).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared: serde_json::Value = json(response).await;
    assert_eq!(cleared["success"], true);

    let records: Vec<FileRecord> = json(app.oneshot(get("/files")).await.unwrap()).await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_generate_password() {
    let (_, app) = default_app();

    let body: serde_json::Value =
        json(app.clone().oneshot(get("/generate-password")).await.unwrap()).await;
    assert_eq!(body["password"].as_str().unwrap().len(), 10);

    let body: serde_json::Value = json(
        app.clone()
            .oneshot(get("/generate-password?length=24"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["password"].as_str().unwrap().len(), 24);

    let response = app
        .oneshot(get("/generate-password?length=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_crack_timeout_cancels_job() {
    let (state, app) = test_state(Settings {
        workers: 1,
        crack_timeout_secs: 1,
        ..Settings::default()
    });
    let locked = locked_pdf("out-of-reach");

    // 40^4 candidates keep a single worker busy well past the timeout.
    let started = std::time::Instant::now();
    let response = app
        .oneshot(form_request(
            "/crack-pdf",
            &[
                pdf_part(&locked),
                Part::Field("mode", "brute"),
                Part::Field("charset", "abcdefghijklmnopqrstuvwxyz0123456789ABCD"),
                Part::Field("length", "4"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(started.elapsed() < std::time::Duration::from_secs(30));
    let error: ErrorResponse = json(response).await;
    assert!(!error.success);
    assert!(state.registry.list().is_empty());
}
