use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;

async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[derive(Clone)]
struct MaskServerState {
    hits: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<MaskFacesRequest>>>,
    response_body: serde_json::Value,
    status: StatusCode,
}

impl MaskServerState {
    fn replying(status: StatusCode, response_body: serde_json::Value) -> Self {
        Self {
            hits: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
            response_body,
            status,
        }
    }
}

async fn mask_faces_handler(
    State(state): State<MaskServerState>,
    Json(request): Json<MaskFacesRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_request.lock().expect("state lock") = Some(request);
    (state.status, Json(state.response_body.clone()))
}

async fn spawn_mask_server(state: MaskServerState) -> String {
    let app = Router::new()
        .route("/mask-faces", post(mask_faces_handler))
        .with_state(state);
    spawn_server(app).await
}

fn controller_for(api_base: &str) -> UploadController {
    let client = MaskingClient::new(api_base).expect("client builds");
    UploadController::new(Arc::new(client))
}

fn png_candidate(filename: &str, bytes: &[u8]) -> ImageCandidate {
    ImageCandidate::from_parts(filename, "image/png", bytes.to_vec())
}

#[test]
fn rejects_unsupported_mime_and_keeps_no_selection() {
    let mut controller = controller_for("http://127.0.0.1:1/api");
    let err = controller
        .select_image(ImageCandidate::from_parts(
            "doc.pdf",
            "application/pdf",
            b"%PDF-1.4".to_vec(),
        ))
        .expect_err("pdf must be rejected");
    assert!(matches!(err, UploadError::UnsupportedFormat { ref mime } if mime == "application/pdf"));
    assert!(controller.selected().is_none());
}

#[test]
fn rejection_preserves_previous_selection() {
    let mut controller = controller_for("http://127.0.0.1:1/api");
    controller
        .select_image(png_candidate("photo.png", b"png-bytes"))
        .expect("png accepted");
    controller
        .select_image(ImageCandidate::from_parts("notes.txt", "text/plain", vec![1]))
        .expect_err("text must be rejected");
    let selected = controller.selected().expect("selection retained");
    assert_eq!(selected.filename, "photo.png");
}

#[test]
fn accepts_jpeg_and_replaces_selection() {
    let mut controller = controller_for("http://127.0.0.1:1/api");
    controller
        .select_image(png_candidate("first.png", b"one"))
        .expect("png accepted");
    let selected = controller
        .select_image(ImageCandidate::from_parts(
            "second.jpg",
            "image/jpeg",
            b"two".to_vec(),
        ))
        .expect("jpeg accepted");
    assert_eq!(selected.filename, "second.jpg");
    assert_eq!(selected.format, ImageFormat::Jpeg);
}

#[test]
fn oversize_image_rejected_before_any_network() {
    let mut controller = controller_for("http://127.0.0.1:1/api");
    let err = controller
        .select_image(png_candidate("huge.png", &vec![0u8; MAX_IMAGE_BYTES + 1]))
        .expect_err("oversize must be rejected");
    assert!(matches!(err, UploadError::TooLarge { .. }));
    assert!(controller.selected().is_none());
}

#[test]
fn clear_selection_drops_current_image() {
    let mut controller = controller_for("http://127.0.0.1:1/api");
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    controller.clear_selection();
    assert!(controller.selected().is_none());
}

#[tokio::test]
async fn submit_without_selection_is_a_noop() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({"status": "success"}),
    );
    let hits = state.hits.clone();
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    let outcome = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect("noop submit is not an error");
    assert!(outcome.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn masks_png_end_to_end_with_data_url_output() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({
            "status": "success",
            "message": "1 face masked",
            "data_url": "data:image/png;base64,AAAA",
            "faces_detected": 1,
            "fallback_used": false
        }),
    );
    let hits = state.hits.clone();
    let last_request = state.last_request.clone();
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"fake png bytes"))
        .expect("png accepted");
    let outcome = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect("submission succeeds")
        .expect("submission ran");

    assert_eq!(
        outcome.output,
        Some(MaskedOutput::DataUrl("data:image/png;base64,AAAA".to_string()))
    );
    assert_eq!(outcome.faces_detected, Some(1));
    assert!(!outcome.fallback_used);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!controller.is_busy());
    assert_eq!(controller.phase(), SubmissionPhase::Idle);

    let sent = last_request
        .lock()
        .expect("state lock")
        .clone()
        .expect("request captured");
    assert_eq!(sent.filename, "photo.png");
    assert_eq!(sent.edit_type, 1);
    assert_eq!(sent.image, STANDARD.encode(b"fake png bytes"));
}

#[tokio::test]
async fn prefers_data_url_when_both_outputs_present() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({
            "status": "success",
            "data_url": "data:image/png;base64,QUJD",
            "signed_url": "https://storage.example/masked.png"
        }),
    );
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let outcome = controller
        .submit_mask_request(EditType::Postcard)
        .await
        .expect("submission succeeds")
        .expect("submission ran");
    assert_eq!(
        outcome.output,
        Some(MaskedOutput::DataUrl("data:image/png;base64,QUJD".to_string()))
    );
}

#[tokio::test]
async fn falls_back_to_signed_url_output() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({
            "status": "success",
            "signed_url": "https://storage.example/masked.png"
        }),
    );
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let outcome = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect("submission succeeds")
        .expect("submission ran");
    assert_eq!(
        outcome.output,
        Some(MaskedOutput::SignedUrl(
            "https://storage.example/masked.png".to_string()
        ))
    );
}

#[tokio::test]
async fn success_without_output_urls_leaves_preview_unchanged() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({"status": "success", "message": "stored only"}),
    );
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let outcome = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect("submission succeeds")
        .expect("submission ran");
    assert!(outcome.output.is_none());
}

#[tokio::test]
async fn non_2xx_surfaces_api_error_and_releases_busy() {
    let state = MaskServerState::replying(
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({"status": "error", "message": "detector unavailable"}),
    );
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let err = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect_err("500 must fail");
    match err {
        UploadError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "detector unavailable");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(!controller.is_busy());
    assert_eq!(controller.phase(), SubmissionPhase::Idle);
}

#[tokio::test]
async fn http_200_error_envelope_is_a_service_failure() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({
            "status": "error",
            "message": "no faces detected",
            "faces_detected": 0,
            "fallback_used": true,
            "debug_error": "NO_FACES"
        }),
    );
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(ImageCandidate::from_parts(
            "group.jpg",
            "image/jpeg",
            b"bytes".to_vec(),
        ))
        .expect("jpeg accepted");
    let err = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect_err("error envelope must fail");
    match err {
        UploadError::Service(exception) => {
            assert_eq!(exception.message, "no faces detected");
            assert_eq!(exception.debug_error.as_deref(), Some("NO_FACES"));
        }
        other => panic!("expected Service error, got {other:?}"),
    }
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn busy_controller_skips_second_submission() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({"status": "success", "data_url": "data:image/png;base64,QUJD"}),
    );
    let hits = state.hits.clone();
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let pending = controller
        .begin_submission(EditType::Bouquet)
        .expect("begin succeeds")
        .expect("submission begins");
    assert!(controller.is_busy());
    assert_eq!(controller.phase(), SubmissionPhase::AwaitingResponse);

    // A second submit while the first is outstanding is a quiet no-op.
    let second = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect("busy submit is not an error");
    assert!(second.is_none());

    let outcome = pending.run().await.expect("first submission completes");
    controller.finish_submission();
    assert_eq!(
        outcome.output,
        Some(MaskedOutput::DataUrl("data:image/png;base64,QUJD".to_string()))
    );
    assert!(!controller.is_busy());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn selection_stays_editable_while_submission_in_flight() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({"status": "success", "data_url": "data:image/png;base64,QUJD"}),
    );
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let pending = controller
        .begin_submission(EditType::Bouquet)
        .expect("begin succeeds")
        .expect("submission begins");

    // The pending submission owns its request, so the controller stays
    // usable while the call is on the wire.
    controller.clear_selection();
    controller
        .select_image(png_candidate("next.png", b"more bytes"))
        .expect("png accepted");

    pending.run().await.expect("submission completes");
    controller.finish_submission();
    assert!(!controller.is_busy());
    assert_eq!(
        controller.selected().expect("replacement kept").filename,
        "next.png"
    );
}

#[tokio::test]
async fn begin_without_selection_leaves_controller_idle() {
    let state = MaskServerState::replying(
        StatusCode::OK,
        serde_json::json!({"status": "success"}),
    );
    let hits = state.hits.clone();
    let base = spawn_mask_server(state).await;

    let mut controller = controller_for(&base);
    let pending = controller
        .begin_submission(EditType::Bouquet)
        .expect("noop begin is not an error");
    assert!(pending.is_none());
    assert!(!controller.is_busy());
    assert_eq!(controller.phase(), SubmissionPhase::Idle);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stalled_request_fails_at_the_client_timeout() {
    let app = Router::new().route(
        "/mask-faces",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(serde_json::json!({"status": "success"}))
        }),
    );
    let base = spawn_server(app).await;

    let client =
        MaskingClient::with_timeout(&base, Duration::from_millis(150)).expect("client builds");
    let mut controller = UploadController::new(Arc::new(client));
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    let err = controller
        .submit_mask_request(EditType::Bouquet)
        .await
        .expect_err("stalled request must time out");
    assert!(matches!(err, UploadError::Transport(_)));
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn health_probe_reports_service_status() {
    let app = Router::new().route(
        "/",
        get(|| async {
            Json(serde_json::json!({"status": "healthy", "service": "image-processor"}))
        }),
    );
    let base = spawn_server(app).await;

    let client = MaskingClient::new(&base).expect("client builds");
    let health = client.health().await.expect("health reachable");
    assert!(health.is_healthy());
    assert_eq!(health.service.as_deref(), Some("image-processor"));
}

#[tokio::test]
async fn fetch_image_returns_raw_bytes() {
    let app = Router::new().route("/masked.png", get(|| async { b"raw image bytes".to_vec() }));
    let base = spawn_server(app).await;

    let client = MaskingClient::new(&base).expect("client builds");
    let bytes = client
        .fetch_image(&format!("{base}/masked.png"))
        .await
        .expect("fetch succeeds");
    assert_eq!(bytes, b"raw image bytes");
}

#[tokio::test]
async fn candidate_from_path_guesses_mime_from_extension() {
    let dir = std::env::temp_dir().join(format!("masking_client_test_{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.expect("temp dir");
    let path = dir.join("sample.png");
    tokio::fs::write(&path, b"png-ish bytes").await.expect("write temp file");

    let candidate = ImageCandidate::from_path(&path).await.expect("read candidate");
    assert_eq!(candidate.filename, "sample.png");
    assert_eq!(candidate.mime, "image/png");
    assert_eq!(candidate.bytes, b"png-ish bytes");

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[test]
fn release_after_abort_returns_controller_to_idle() {
    let mut controller = controller_for("http://127.0.0.1:1/api");
    controller
        .select_image(png_candidate("photo.png", b"bytes"))
        .expect("png accepted");
    controller.release_after_abort();
    assert!(!controller.is_busy());
    assert_eq!(controller.phase(), SubmissionPhase::Idle);
    // The selection survives an abort; only the in-flight request is dropped.
    assert!(controller.selected().is_some());
}

#[test]
fn transfer_encoding_revalidates_mime() {
    let encoded = encode_to_transfer_format("image/png", b"ABC").expect("png encodes");
    assert_eq!(encoded, "QUJD");
    let err = encode_to_transfer_format("image/gif", b"GIF89a").expect_err("gif rejected");
    assert!(matches!(err, UploadError::UnsupportedFormat { .. }));
}

#[test]
fn data_url_decoding_round_trips() {
    let (mime, bytes) = decode_data_url("data:image/png;base64,QUJD").expect("decodes");
    assert_eq!(mime, "image/png");
    assert_eq!(bytes, b"ABC");

    assert!(matches!(
        decode_data_url("https://example.com/not-a-data-url"),
        Err(UploadError::InvalidDataUrl)
    ));
    assert!(matches!(
        decode_data_url("data:image/png;base64,!!!"),
        Err(UploadError::InvalidDataUrl)
    ));
}

#[test]
fn rejects_invalid_api_base() {
    assert!(matches!(
        MaskingClient::new("not a url"),
        Err(UploadError::InvalidApiBase(_))
    ));
}
