use thiserror::Error;

/// Capture-related errors
///
/// Acquisition variants are terminal for the attempt; the caller may retry
/// by starting a fresh session. `user_message` carries the distinct
/// user-facing string for each cause.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("No microphone device found")]
    DeviceNotFound,

    #[error("Recording not supported on this platform")]
    NotSupported,

    #[error("Audio acquisition error: {0}")]
    Acquisition(String),

    #[error("Recording failed mid-capture: {0}")]
    Runtime(String),

    #[error("Recorder failed to finalize: {0}")]
    Finalize(String),

    #[error("A recording session is already active")]
    AlreadyRecording,
}

impl CaptureError {
    /// User-facing message for this error, matching the distinct
    /// per-cause wording the capture UI shows.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::PermissionDenied => {
                "無法啟動錄音功能：麥克風存取被拒絕。請在系統設定中允許使用麥克風。".to_string()
            }
            CaptureError::DeviceNotFound => "無法啟動錄音功能：找不到麥克風裝置。".to_string(),
            CaptureError::NotSupported => "此裝置不支援錄音功能。".to_string(),
            CaptureError::Acquisition(msg) => format!("錄音功能發生錯誤：{msg}"),
            CaptureError::Runtime(msg) => format!("錄音過程中發生錯誤：{msg}"),
            CaptureError::Finalize(msg) => format!("錄音處理失敗：{msg}"),
            CaptureError::AlreadyRecording => "錄音進行中，請先停止目前的錄音。".to_string(),
        }
    }
}

/// Upload-related errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// Non-2xx transport status; the body is never parsed for these.
    #[error("HTTP error {status}")]
    Http { status: u16 },

    /// 2xx response whose body reported `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Email-dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected locally before any network call was made.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A send is already pending; duplicate triggers are rejected.
    #[error("A send is already in flight")]
    InFlight,

    #[error("HTTP error {status}")]
    Http { status: u16 },

    /// 2xx response carrying an explicit failure flag.
    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}
