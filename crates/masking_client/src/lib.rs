//! Client core for the face-masking service: image selection and validation,
//! base64 transfer encoding, and the single-submission HTTP round-trip.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use shared::{
    domain::{EditType, ImageFormat},
    error::{ServiceError, ServiceException},
    protocol::{HealthResponse, MaskFacesRequest, MaskFacesResponse, ResponseStatus},
};

/// Hard cap enforced by the service; rejecting locally avoids uploading a
/// payload that is guaranteed to bounce.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const FALLBACK_FILENAME: &str = "uploaded_image";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported image format '{mime}'; only image/png and image/jpeg are accepted")]
    UnsupportedFormat { mime: String },
    #[error("image is {size_bytes} bytes, above the {limit}-byte service limit")]
    TooLarge { size_bytes: usize, limit: usize },
    #[error("masking service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("masking service failure: {0}")]
    Service(ServiceException),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid API base URL: {0}")]
    InvalidApiBase(#[from] url::ParseError),
    #[error("malformed data URL in service response")]
    InvalidDataUrl,
}

/// A user-chosen file before validation: declared MIME type plus raw bytes.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageCandidate {
    pub fn from_parts(
        filename: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing the MIME type from the extension.
    /// An unguessable extension yields an empty MIME string, which fails
    /// validation downstream rather than here.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(FALLBACK_FILENAME)
            .to_string();
        let mime = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or_default()
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            filename,
            mime,
            bytes,
        })
    }
}

/// The controller's current selection. Replaced wholesale on each accepted
/// candidate, never mutated in place.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub filename: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    Encoding,
    AwaitingResponse,
}

/// Which representation of the masked image the service handed back.
/// Inline data URLs are preferred over remote signed URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskedOutput {
    DataUrl(String),
    SignedUrl(String),
}

impl MaskedOutput {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DataUrl(url) | Self::SignedUrl(url) => url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaskOutcome {
    pub output: Option<MaskedOutput>,
    pub faces_detected: Option<u32>,
    pub fallback_used: bool,
    pub message: Option<String>,
}

/// A validated, already-encoded submission detached from the controller. It
/// owns everything the network round-trip needs, so callers can run it
/// without keeping the controller borrowed (or locked) while the request is
/// on the wire.
pub struct PendingSubmission {
    api: Arc<dyn MaskingApi>,
    request: MaskFacesRequest,
}

impl PendingSubmission {
    pub async fn run(self) -> Result<MaskOutcome, UploadError> {
        let response = self.api.mask_faces(&self.request).await.inspect_err(|err| {
            tracing::warn!("mask request failed: {err}");
        })?;

        if response.status == ResponseStatus::Error {
            let message = response
                .message
                .unwrap_or_else(|| "unspecified service failure".to_string());
            tracing::warn!(message = %message, "service reported failure in 2xx envelope");
            return Err(UploadError::Service(ServiceException {
                message,
                debug_error: response.debug_error,
            }));
        }

        let output = match (response.data_url, response.signed_url) {
            (Some(data_url), _) => Some(MaskedOutput::DataUrl(data_url)),
            (None, Some(signed_url)) => Some(MaskedOutput::SignedUrl(signed_url)),
            (None, None) => None,
        };
        tracing::info!(
            faces_detected = response.faces_detected,
            has_output = output.is_some(),
            "mask request completed"
        );
        Ok(MaskOutcome {
            output,
            faces_detected: response.faces_detected,
            fallback_used: response.fallback_used.unwrap_or(false),
            message: response.message,
        })
    }
}

/// Base64-encodes image bytes for the `image` request field, re-validating
/// the MIME type on the way. The result is a data-URL payload with the
/// `data:<mime>;base64,` prefix already stripped.
pub fn encode_to_transfer_format(mime: &str, bytes: &[u8]) -> Result<String, UploadError> {
    if ImageFormat::from_mime_type(mime).is_none() {
        return Err(UploadError::UnsupportedFormat {
            mime: mime.to_string(),
        });
    }
    Ok(STANDARD.encode(bytes))
}

/// Splits a `data:<mime>;base64,<payload>` URL into its MIME type and
/// decoded bytes.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), UploadError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or(UploadError::InvalidDataUrl)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or(UploadError::InvalidDataUrl)?;
    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|_| UploadError::InvalidDataUrl)?;
    Ok((mime.to_string(), bytes))
}

/// Transport seam over the remote masking service, so the controller and the
/// GUI backend can run against test doubles.
#[async_trait]
pub trait MaskingApi: Send + Sync {
    async fn mask_faces(&self, request: &MaskFacesRequest) -> Result<MaskFacesResponse, UploadError>;
    async fn health(&self) -> Result<HealthResponse, UploadError>;
    /// Fetches the raw bytes behind a signed URL for preview rendering.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, UploadError>;
}

pub struct MaskingClient {
    http: Client,
    api_base: String,
}

impl MaskingClient {
    pub fn new(api_base: impl Into<String>) -> Result<Self, UploadError> {
        Self::with_timeout(api_base, DEFAULT_REQUEST_TIMEOUT)
    }

    /// A request that outlives `timeout` fails as a transport error, which
    /// releases the controller's busy state like any other failure.
    pub fn with_timeout(
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let api_base = api_base.into();
        Url::parse(&api_base)?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn failure_from_response(response: reqwest::Response) -> UploadError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        // Prefer the service's own message when the body is its JSON envelope.
        let body = serde_json::from_str::<ServiceError>(&body)
            .map(|envelope| envelope.message)
            .unwrap_or(body);
        UploadError::Api { status, body }
    }
}

#[async_trait]
impl MaskingApi for MaskingClient {
    async fn mask_faces(&self, request: &MaskFacesRequest) -> Result<MaskFacesResponse, UploadError> {
        let response = self
            .http
            .post(format!("{}/mask-faces", self.api_base))
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn health(&self) -> Result<HealthResponse, UploadError> {
        let response = self
            .http
            .get(format!("{}/", self.api_base))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, UploadError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure_from_response(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Mediates between UI events and the remote service: owns the selection and
/// the busy flag, and runs at most one submission at a time.
pub struct UploadController {
    api: Arc<dyn MaskingApi>,
    selected: Option<SelectedImage>,
    busy: bool,
    phase: SubmissionPhase,
}

impl UploadController {
    pub fn new(api: Arc<dyn MaskingApi>) -> Self {
        Self {
            api,
            selected: None,
            busy: false,
            phase: SubmissionPhase::Idle,
        }
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    /// Single validation entry point for both the picker and the drop path.
    /// Rejection leaves the previous selection untouched.
    pub fn select_image(&mut self, candidate: ImageCandidate) -> Result<&SelectedImage, UploadError> {
        let format = ImageFormat::from_mime_type(&candidate.mime).ok_or_else(|| {
            UploadError::UnsupportedFormat {
                mime: candidate.mime.clone(),
            }
        })?;
        if candidate.bytes.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::TooLarge {
                size_bytes: candidate.bytes.len(),
                limit: MAX_IMAGE_BYTES,
            });
        }
        tracing::info!(
            filename = %candidate.filename,
            format = format.mime_type(),
            size_bytes = candidate.bytes.len(),
            "image selected"
        );
        Ok(self.selected.insert(SelectedImage {
            filename: candidate.filename,
            format,
            bytes: candidate.bytes,
        }))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Validates and encodes the current selection and marks the controller
    /// busy. `Ok(None)` means nothing to do: no image is selected, or a
    /// submission is already in flight. The returned submission runs without
    /// borrowing the controller; call `finish_submission` once it resolves.
    pub fn begin_submission(
        &mut self,
        edit_type: EditType,
    ) -> Result<Option<PendingSubmission>, UploadError> {
        if self.busy {
            tracing::debug!("submission already in flight; ignoring");
            return Ok(None);
        }
        let Some(image) = self.selected.clone() else {
            tracing::debug!("no image selected; nothing to submit");
            return Ok(None);
        };

        self.busy = true;
        self.phase = SubmissionPhase::Encoding;
        let payload = match encode_to_transfer_format(image.format.mime_type(), &image.bytes) {
            Ok(payload) => payload,
            Err(err) => {
                self.finish_submission();
                return Err(err);
            }
        };
        self.phase = SubmissionPhase::AwaitingResponse;

        let request = MaskFacesRequest {
            image: payload,
            filename: image.filename.clone(),
            edit_type: edit_type.wire_code(),
        };
        tracing::info!(
            filename = %image.filename,
            size_bytes = image.bytes.len(),
            edit_type = request.edit_type,
            "submitting mask request"
        );
        Ok(Some(PendingSubmission {
            api: self.api.clone(),
            request,
        }))
    }

    /// Returns the controller to idle once a pending submission resolved.
    pub fn finish_submission(&mut self) {
        self.busy = false;
        self.phase = SubmissionPhase::Idle;
    }

    /// One-call convenience over begin/run/finish. The busy flag is released
    /// on every return path.
    pub async fn submit_mask_request(
        &mut self,
        edit_type: EditType,
    ) -> Result<Option<MaskOutcome>, UploadError> {
        let Some(pending) = self.begin_submission(edit_type)? else {
            return Ok(None);
        };
        let result = pending.run().await;
        self.finish_submission();
        result.map(Some)
    }

    /// Resets the busy state after the task driving a submission was
    /// aborted. The in-flight request is dropped with the task; without this
    /// the controller would refuse further submissions forever.
    pub fn release_after_abort(&mut self) {
        if self.busy {
            tracing::info!("submission aborted; releasing busy state");
        }
        self.finish_submission();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
