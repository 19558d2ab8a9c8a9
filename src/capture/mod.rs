//! Capture session management module
//!
//! Owns the microphone stream and the recording state machine, and turns an
//! ordered stream of backend fragments into a single audio artifact.
//!
//! # Architecture
//! A capture session consists of:
//! - Microphone acquisition through a pluggable [`RecordingBackend`]
//! - Content-type selection from an ordered preference list
//! - Periodic fragment emission, accumulated in emission order
//! - An elapsed-time ticker (`mm:ss`, 1-second granularity)
//! - Finalization into an immutable [`AudioArtifact`]
//!
//! Sessions are single-use: a stopped or failed session is discarded and a
//! fresh one constructed for the next recording.

pub mod backend;

use crate::error::CaptureError;
use crate::status::StatusSink;
use backend::{CaptureEvent, MicConstraints, MicStream, RecorderOptions, RecordingBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

/// Ordered content-type preference list: opus-in-container first, then the
/// alternate containers, before falling back to the backend's native type.
const CONTENT_TYPE_PREFERENCE: [&str; 3] = ["audio/webm;codecs=opus", "audio/mp4", "audio/ogg"];

/// How long `stop` waits for the recorder to flush and finalize.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Recording state machine
///
/// Idle → Requesting → Recording → Stopping → Stopped. Acquisition or
/// mid-capture failure lands in Failed, terminal for the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Recording,
    Stopping,
    Stopped,
    Failed,
}

/// The finalized binary audio payload of a completed session
///
/// Immutable once constructed: the ordered concatenation of every fragment
/// the recorder emitted, plus the chosen content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Audio constraints for a capture session
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub bits_per_second: u32,
    pub fragment_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bits_per_second: 128_000,
            fragment_interval: Duration::from_millis(1000),
        }
    }
}

/// One recording attempt, from microphone acquisition to artifact
pub struct CaptureSession {
    backend: Arc<dyn RecordingBackend>,
    sink: Arc<dyn StatusSink>,
    config: CaptureConfig,
    state: CaptureState,
    content_type: String,
    stream: Option<Box<dyn MicStream>>,
    events: Option<mpsc::Receiver<CaptureEvent>>,
    fragments: Vec<Vec<u8>>,
    ticker: Option<tokio::task::JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(
        backend: Arc<dyn RecordingBackend>,
        sink: Arc<dyn StatusSink>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            config,
            state: CaptureState::Idle,
            content_type: String::new(),
            stream: None,
            events: None,
            fragments: Vec::new(),
            ticker: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// Start recording
    ///
    /// Requests microphone access with echo cancellation and noise
    /// suppression at the configured sample rate, selects the first
    /// supported content type from the preference list, binds the recorder
    /// to the bitrate target and fragment interval, and starts the elapsed
    /// ticker. Each acquisition failure maps to a distinct
    /// [`CaptureError`] variant and transitions the session to Failed;
    /// retrying means constructing a fresh session.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Idle => {}
            CaptureState::Recording | CaptureState::Stopping => {
                return Err(CaptureError::AlreadyRecording);
            }
            // Stopped / Failed sessions are not reused.
            _ => return Err(CaptureError::AlreadyRecording),
        }

        self.state = CaptureState::Requesting;
        let constraints = MicConstraints {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: self.config.sample_rate,
        };

        let mut stream = match self.backend.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = CaptureState::Failed;
                return Err(e);
            }
        };

        self.content_type = select_content_type(self.backend.as_ref());
        let options = RecorderOptions {
            content_type: self.content_type.clone(),
            bits_per_second: self.config.bits_per_second,
            fragment_interval: self.config.fragment_interval,
        };

        let events = match stream.start(&options) {
            Ok(events) => events,
            Err(e) => {
                // The device was granted; give it back before failing.
                stream.release();
                self.state = CaptureState::Failed;
                return Err(e);
            }
        };

        self.stream = Some(stream);
        self.events = Some(events);
        self.fragments.clear();
        self.ticker = Some(spawn_ticker(self.sink.clone()));
        self.state = CaptureState::Recording;
        info!(content_type = %self.content_type, "Recording started");
        Ok(())
    }

    /// Drain any events the recorder has emitted so far
    ///
    /// Appends pending fragments in emission order. A mid-capture error
    /// forces an implicit stop: the partial artifact is discarded, the
    /// stream released, and the error surfaced (policy: discard and inform,
    /// never silently upload partial audio).
    pub fn pump_events(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Recording {
            return Ok(());
        }
        loop {
            let event = match self.events.as_mut() {
                Some(events) => events.try_recv(),
                None => return Ok(()),
            };
            match event {
                Ok(CaptureEvent::Fragment(bytes)) => self.fragments.push(bytes),
                Ok(CaptureEvent::Finalized) => {
                    warn!("Recorder finalized without a stop request");
                    return Ok(());
                }
                Ok(CaptureEvent::Error(msg)) => {
                    self.teardown();
                    self.fragments.clear();
                    self.state = CaptureState::Failed;
                    return Err(CaptureError::Runtime(msg));
                }
                Err(mpsc::error::TryRecvError::Empty)
                | Err(mpsc::error::TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Stop recording and assemble the artifact
    ///
    /// A no-op (`Ok(None)`) unless the session is Recording. Otherwise
    /// signals the recorder to finalize, drains the remaining fragments in
    /// order, and waits for the finalize event. The stream is released and
    /// the ticker cleared on every exit path; a finalize failure surfaces
    /// as an error with the session Stopped and the artifact empty.
    pub async fn stop(&mut self) -> Result<Option<AudioArtifact>, CaptureError> {
        if self.state != CaptureState::Recording {
            return Ok(None);
        }
        self.state = CaptureState::Stopping;

        if let Some(stream) = self.stream.as_mut() {
            stream.finalize();
        }

        let result = self.drain_until_finalized().await;
        self.teardown();
        self.state = CaptureState::Stopped;

        match result {
            Ok(()) => {
                let artifact = AudioArtifact {
                    bytes: self.fragments.concat(),
                    content_type: self.content_type.clone(),
                };
                self.fragments.clear();
                info!(
                    bytes = artifact.bytes.len(),
                    "Recording stopped, artifact assembled"
                );
                Ok(Some(artifact))
            }
            Err(e) => {
                self.fragments.clear();
                Err(e)
            }
        }
    }

    /// Wait for the finalize event, collecting trailing fragments in order
    async fn drain_until_finalized(&mut self) -> Result<(), CaptureError> {
        let Some(events) = self.events.as_mut() else {
            return Err(CaptureError::Finalize("recorder has no event stream".into()));
        };
        let deadline = tokio::time::Instant::now() + FINALIZE_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match timeout(remaining, events.recv()).await {
                Ok(Some(CaptureEvent::Fragment(bytes))) => self.fragments.push(bytes),
                Ok(Some(CaptureEvent::Finalized)) => return Ok(()),
                Ok(Some(CaptureEvent::Error(msg))) => return Err(CaptureError::Runtime(msg)),
                Ok(None) => {
                    return Err(CaptureError::Finalize(
                        "recorder shut down without finalizing".into(),
                    ));
                }
                Err(_) => {
                    return Err(CaptureError::Finalize(
                        "timed out waiting for the recorder to finalize".into(),
                    ));
                }
            }
        }
    }

    /// Clear the ticker and release the stream. Safe on every exit path.
    fn teardown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
        self.events = None;
    }

    #[cfg(test)]
    fn ticker_active(&self) -> bool {
        self.ticker.is_some()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // The microphone must never outlive its session.
        self.teardown();
    }
}

/// Pick the first supported content type, falling back to the backend's
/// native type when nothing from the preference list is offered.
fn select_content_type(backend: &dyn RecordingBackend) -> String {
    for candidate in CONTENT_TYPE_PREFERENCE {
        if backend.is_type_supported(candidate) {
            return candidate.to_string();
        }
    }
    backend.native_type().to_string()
}

/// Spawn the elapsed-time ticker: `00:00` immediately, then one tick per
/// second until aborted.
fn spawn_ticker(sink: Arc<dyn StatusSink>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut elapsed_secs: u64 = 0;
        loop {
            sink.timer(&format_elapsed(elapsed_secs));
            tokio::time::sleep(Duration::from_secs(1)).await;
            elapsed_secs += 1;
        }
    })
}

/// Format elapsed seconds as `mm:ss`
fn format_elapsed(elapsed_secs: u64) -> String {
    format!("{:02}:{:02}", elapsed_secs / 60, elapsed_secs % 60)
}
