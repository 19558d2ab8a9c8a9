//! Application configuration
//!
//! Loads the embedded `config.toml` and applies environment-variable
//! overrides, so deployments can point the client at a different backend
//! without rebuilding.

use serde::Deserialize;
use url::Url;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub endpoints: Endpoints,
    pub audio: AudioConfig,
    pub handover: HandoverConfig,
}

/// Backend endpoints and the fixed report destination address
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    /// Audio upload endpoint (multipart POST)
    pub upload_url: String,
    /// Email dispatch endpoint (JSON POST)
    pub email_url: String,
    /// Fixed destination address for handover reports
    pub notify_email: String,
}

/// Recorder constraints
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Requested capture sample rate in Hz
    pub sample_rate: u32,
    /// Recorder bitrate target
    pub bits_per_second: u32,
    /// Fragment emission interval in milliseconds
    pub fragment_interval_ms: u64,
}

/// Handover metadata requirements
#[derive(Debug, Clone, Deserialize)]
pub struct HandoverConfig {
    /// Whether the incoming caregiver field is required before dispatch
    pub require_handover_to: bool,
}

/// Load configuration from the embedded config.toml, then apply
/// environment overrides (SHIFTNOTE_UPLOAD_URL, SHIFTNOTE_EMAIL_URL,
/// SHIFTNOTE_NOTIFY_EMAIL).
pub fn load_config() -> anyhow::Result<AppConfig> {
    const CONFIG_TOML: &str = include_str!("../config.toml");
    let mut config: AppConfig = toml::from_str(CONFIG_TOML)?;

    if let Ok(url) = std::env::var("SHIFTNOTE_UPLOAD_URL") {
        config.endpoints.upload_url = url;
    }
    if let Ok(url) = std::env::var("SHIFTNOTE_EMAIL_URL") {
        config.endpoints.email_url = url;
    }
    if let Ok(email) = std::env::var("SHIFTNOTE_NOTIFY_EMAIL") {
        config.endpoints.notify_email = email;
    }

    Ok(config)
}

/// Check the secure-transport precondition for an endpoint URL.
///
/// The backend must be reached over HTTPS except when talking to a local
/// development host. This gate runs before any component is constructed.
pub fn check_secure_endpoint(raw_url: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw_url)?;
    let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
    if url.scheme() != "https" && !is_local {
        anyhow::bail!(
            "insecure endpoint {raw_url}: https is required except on a local development host"
        );
    }
    Ok(url)
}
