//! Audio upload client
//!
//! Packages a finished audio artifact (plus optional handover metadata)
//! into a multipart request, submits it to the care-record backend, and
//! maps the structured response. One request per artifact; transport
//! failures are terminal and never retried automatically.

use crate::capture::AudioArtifact;
use crate::error::UploadError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Sentinel recorded when the outgoing caregiver left the field empty
pub const HANDOVER_FROM_SENTINEL: &str = "未填寫";

/// Multipart field carrying the audio binary
const AUDIO_FIELD: &str = "audio";

/// Filename attached to the audio part; the backend does not rely on it
const AUDIO_FILENAME: &str = "recording.webm";

/// One upload call: the artifact plus optional handover metadata
#[derive(Debug)]
pub struct UploadRequest {
    pub artifact: AudioArtifact,
    pub handover_from: Option<String>,
}

/// Seam for submitting an artifact and receiving the report payload
#[async_trait::async_trait]
pub trait ReportUploader: Send + Sync {
    /// Upload the artifact; `Ok` carries the raw markdown-flavored report.
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;
}

/// HTTP client for the care-record upload endpoint
pub struct UploadClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl UploadClient {
    pub fn new(endpoint: Url) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for UploadClient")?;
        Ok(Self { client, endpoint })
    }
}

/// Response body of the upload endpoint
#[derive(Debug, Deserialize)]
struct UploadResponseBody {
    success: bool,
    #[serde(default)]
    report: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait::async_trait]
impl ReportUploader for UploadClient {
    #[instrument(skip(self, request), fields(bytes = request.artifact.bytes.len()))]
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let content_type = request.artifact.content_type.clone();
        let part = reqwest::multipart::Part::bytes(request.artifact.bytes)
            .file_name(AUDIO_FILENAME)
            .mime_str(&content_type)
            .map_err(|e| UploadError::InvalidResponse(format!("invalid content type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part(AUDIO_FIELD, part)
            .text("handoverFrom", handover_from_field(request.handover_from));

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Transport failure; the body is not consulted.
            return Err(UploadError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let report = parse_response(&body)?;
        info!(report_len = report.len(), "Upload succeeded");
        Ok(report)
    }
}

/// Default the handover-from field to the sentinel when absent or blank
fn handover_from_field(handover_from: Option<String>) -> String {
    match handover_from {
        Some(name) if !name.trim().is_empty() => name,
        _ => HANDOVER_FROM_SENTINEL.to_string(),
    }
}

/// Map a 2xx response body to the report payload
fn parse_response(body: &[u8]) -> Result<String, UploadError> {
    let parsed: UploadResponseBody = serde_json::from_slice(body)
        .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

    if !parsed.success {
        let message = parsed.error.unwrap_or_else(|| "處理失敗".to_string());
        return Err(UploadError::Rejected(message));
    }
    parsed
        .report
        .ok_or_else(|| UploadError::InvalidResponse("success response without a report".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_success() {
        let body = br###"{"success": true, "report": "## Note\nok"}"###;
        assert_eq!(parse_response(body).unwrap(), "## Note\nok");
    }

    #[test]
    fn test_parse_response_failure_carries_backend_message() {
        let body = br#"{"success": false, "error": "x"}"#;
        match parse_response(body) {
            Err(UploadError::Rejected(message)) => assert_eq!(message, "x"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_response_failure_without_message_is_generic() {
        let body = br#"{"success": false}"#;
        match parse_response(body) {
            Err(UploadError::Rejected(message)) => assert_eq!(message, "處理失敗"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_response_success_without_report_is_invalid() {
        let body = br#"{"success": true}"#;
        assert!(matches!(
            parse_response(body),
            Err(UploadError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_response_garbage_is_invalid() {
        assert!(matches!(
            parse_response(b"<html>oops</html>"),
            Err(UploadError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_handover_from_defaults_to_sentinel() {
        assert_eq!(handover_from_field(None), HANDOVER_FROM_SENTINEL);
        assert_eq!(handover_from_field(Some("  ".into())), HANDOVER_FROM_SENTINEL);
        assert_eq!(handover_from_field(Some("王小姐".into())), "王小姐");
    }

    #[test]
    fn test_http_error_message_format() {
        let err = UploadError::Http { status: 500 };
        assert_eq!(err.to_string(), "HTTP error 500");
    }
}
