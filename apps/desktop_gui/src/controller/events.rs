//! UI/backend events and error modeling for the desktop GUI controller.

use masking_client::UploadError;
use shared::domain::ImageFormat;

use crate::media::PreviewImage;

pub enum UiEvent {
    WorkerReady,
    ImageSelected {
        filename: String,
        format: ImageFormat,
        size_bytes: usize,
        preview: PreviewImage,
    },
    SelectionRejected(UiError),
    SelectionCleared,
    SubmissionStarted,
    /// `preview: None` means the service sent no output image; the output
    /// pane keeps whatever it was showing.
    MaskCompleted {
        preview: Option<PreviewImage>,
        faces_detected: Option<u32>,
        fallback_used: bool,
        message: Option<String>,
    },
    SubmissionFailed(UiError),
    SubmissionCancelled,
    HealthChecked {
        healthy: bool,
        detail: String,
    },
    Info(String),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Validation,
    Transport,
    Api,
    Service,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SelectImage,
    Submit,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_upload_error(context: UiErrorContext, err: &UploadError) -> Self {
        let category = match err {
            UploadError::UnsupportedFormat { .. }
            | UploadError::TooLarge { .. }
            | UploadError::InvalidApiBase(_) => UiErrorCategory::Validation,
            UploadError::Transport(_) | UploadError::Io(_) => UiErrorCategory::Transport,
            UploadError::Api { .. } | UploadError::InvalidDataUrl => UiErrorCategory::Api,
            UploadError::Service(_) => UiErrorCategory::Service,
        };
        Self {
            category,
            context,
            message: err.to_string(),
        }
    }

    /// Fallback classification for string-shaped failures (worker startup,
    /// runtime construction) where no typed error is available.
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("unsupported")
            || lower.contains("invalid")
            || lower.contains("too large")
        {
            UiErrorCategory::Validation
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("unreachable")
            || lower.contains("transport")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };
        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
