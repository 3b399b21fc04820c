use serde::{Deserialize, Serialize};

/// Body of `POST {api_base}/mask-faces`. `image` is the base64 payload with
/// the data-URL prefix already stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskFacesRequest {
    pub image: String,
    pub filename: String,
    pub edit_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Metadata the service echoes about the processed image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Response of `/mask-faces`. The service reports some failures as HTTP 200
/// with `status: "error"`, so `status` must be checked even on 2xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskFacesResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces_detected: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageInfo>,
}

/// Response of the health probe at `GET {api_base}/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_response_with_extra_fields() {
        let raw = r#"{
            "status": "success",
            "message": "2 faces masked",
            "data_url": "data:image/png;base64,AAAA",
            "signed_url": null,
            "blob_name": "processed_images/photo.png",
            "faces_detected": 2,
            "fallback_used": false,
            "image_info": {"format": "PNG", "mode": "RGB", "width": 640, "height": 480},
            "size": 12345
        }"#;
        let parsed: MaskFacesResponse = serde_json::from_str(raw).expect("response parses");
        assert_eq!(parsed.status, ResponseStatus::Success);
        assert_eq!(parsed.data_url.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(parsed.signed_url, None);
        assert_eq!(parsed.faces_detected, Some(2));
        let info = parsed.image_info.expect("image info present");
        assert_eq!(info.width, Some(640));
    }

    #[test]
    fn parses_minimal_error_envelope() {
        let raw = r#"{"status": "error", "message": "processing_failed"}"#;
        let parsed: MaskFacesResponse = serde_json::from_str(raw).expect("envelope parses");
        assert_eq!(parsed.status, ResponseStatus::Error);
        assert_eq!(parsed.message.as_deref(), Some("processing_failed"));
        assert!(parsed.data_url.is_none());
        assert!(parsed.fallback_used.is_none());
    }

    #[test]
    fn request_serializes_snake_case_fields() {
        let request = MaskFacesRequest {
            image: "QUJD".to_string(),
            filename: "photo.png".to_string(),
            edit_type: 1,
        };
        let value = serde_json::to_value(&request).expect("request serializes");
        assert_eq!(value["image"], "QUJD");
        assert_eq!(value["filename"], "photo.png");
        assert_eq!(value["edit_type"], 1);
    }

    #[test]
    fn health_status_gate() {
        let healthy: HealthResponse =
            serde_json::from_str(r#"{"status": "healthy", "service": "image-processor"}"#)
                .expect("health parses");
        assert!(healthy.is_healthy());
        let degraded: HealthResponse =
            serde_json::from_str(r#"{"status": "starting"}"#).expect("health parses");
        assert!(!degraded.is_healthy());
    }
}
