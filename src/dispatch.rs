//! Handover email dispatch
//!
//! Validates the shift-change metadata and submits the current report text
//! to the email-send endpoint. Validation failures reject locally before
//! any network call; the in-flight guard that disables duplicate sends is
//! cleared on every exit path.

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// The shift-change metadata plus the report text to dispatch
#[derive(Debug, Clone)]
pub struct HandoverRequest {
    /// Outgoing caregiver; required
    pub handover_from: String,
    /// Incoming caregiver; required only when the dispatcher is configured
    /// to demand it
    pub handover_to: Option<String>,
    /// Plain-text extraction of the mounted report
    pub report: String,
}

/// JSON body of the email-send endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailBody<'a> {
    handover_from: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    handover_to: Option<&'a str>,
    report: &'a str,
    email: &'a str,
}

/// Response body; the success flag is informational on 2xx
#[derive(Debug, Deserialize)]
struct EmailResponseBody {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the email-send endpoint
pub struct HandoverDispatcher {
    client: reqwest::Client,
    endpoint: Url,
    notify_email: String,
    require_handover_to: bool,
    in_flight: AtomicBool,
}

impl HandoverDispatcher {
    pub fn new(
        endpoint: Url,
        notify_email: String,
        require_handover_to: bool,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for HandoverDispatcher")?;
        Ok(Self {
            client,
            endpoint,
            notify_email,
            require_handover_to,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Dispatch the report
    ///
    /// Order of operations: local validation (no side effects on failure),
    /// in-flight guard, network call, response mapping. The guard is
    /// restored whether or not the call succeeds.
    #[instrument(skip(self, request), fields(report_len = request.report.len()))]
    pub async fn send(&self, request: &HandoverRequest) -> Result<(), DispatchError> {
        self.validate(request)?;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let body = EmailBody {
            handover_from: &request.handover_from,
            handover_to: request.handover_to.as_deref(),
            report: &request.report,
            email: &self.notify_email,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Http {
                status: status.as_u16(),
            });
        }

        // 2xx is success unless the body carries an explicit failure flag.
        if let Ok(parsed) = response.json::<EmailResponseBody>().await {
            if parsed.success == Some(false) {
                let message = parsed.error.unwrap_or_else(|| "發送失敗".to_string());
                return Err(DispatchError::Rejected(message));
            }
        }

        info!("Handover report dispatched");
        Ok(())
    }

    /// Check the shift-change metadata without any side effects
    pub fn validate(&self, request: &HandoverRequest) -> Result<(), DispatchError> {
        let missing_from = request.handover_from.trim().is_empty();
        let missing_to = self.require_handover_to
            && request
                .handover_to
                .as_deref()
                .map_or(true, |to| to.trim().is_empty());

        if missing_from || missing_to {
            let message = if self.require_handover_to {
                "請填寫交接人和接班人資訊"
            } else {
                "請填寫交接人資訊"
            };
            return Err(DispatchError::Validation(message.to_string()));
        }
        Ok(())
    }
}

/// Clears the in-flight flag when dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(require_handover_to: bool) -> HandoverDispatcher {
        // Unroutable endpoint: validation must reject before any connection
        // is attempted, and network failures must clear the guard.
        let endpoint = Url::parse("https://127.0.0.1:1/care-record/send_email").unwrap();
        HandoverDispatcher::new(endpoint, "care@example.com".to_string(), require_handover_to)
            .unwrap()
    }

    fn request(from: &str, to: Option<&str>) -> HandoverRequest {
        HandoverRequest {
            handover_from: from.to_string(),
            handover_to: to.map(str::to_string),
            report: "## Note\nok".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_handover_from_rejected_without_network() {
        let dispatcher = dispatcher(false);
        let err = dispatcher
            .send(&request("", None))
            .await
            .expect_err("validation must fail");
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(!dispatcher.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_handover_to_rejected_when_required() {
        let dispatcher = dispatcher(true);
        let err = dispatcher
            .send(&request("王小姐", None))
            .await
            .expect_err("validation must fail");
        match err {
            DispatchError::Validation(message) => {
                assert_eq!(message, "請填寫交接人和接班人資訊")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handover_to_optional_when_not_required() {
        let dispatcher = dispatcher(false);
        // Passes validation, then fails at the unroutable endpoint.
        let err = dispatcher
            .send(&request("王小姐", None))
            .await
            .expect_err("network must fail");
        assert!(matches!(err, DispatchError::Network(_)));
    }

    #[tokio::test]
    async fn test_guard_cleared_after_network_failure() {
        let dispatcher = dispatcher(false);
        let _ = dispatcher.send(&request("王小姐", Some("林先生"))).await;
        assert!(!dispatcher.in_flight.load(Ordering::SeqCst));
    }

    #[test]
    fn test_body_serialization_camel_case() {
        let body = EmailBody {
            handover_from: "王小姐",
            handover_to: Some("林先生"),
            report: "ok",
            email: "care@example.com",
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert!(json.contains("\"handoverFrom\":\"王小姐\""));
        assert!(json.contains("\"handoverTo\":\"林先生\""));
        assert!(json.contains("\"email\":\"care@example.com\""));
    }

    #[test]
    fn test_body_omits_absent_handover_to() {
        let body = EmailBody {
            handover_from: "王小姐",
            handover_to: None,
            report: "ok",
            email: "care@example.com",
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert!(!json.contains("handoverTo"));
    }
}
