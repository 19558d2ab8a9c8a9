//! Recording backend seam
//!
//! Abstracts the host platform's recording facility. The session chooses a
//! content type from what the backend offers and consumes an ordered stream
//! of capture events; the backend owns device access and encoding.

use crate::error::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Event emitted by an active microphone stream
///
/// Fragments arrive strictly in emission order; `Finalized` is guaranteed
/// to arrive after every fragment of the session. `Error` reports a
/// mid-capture failure, after which no further events follow.
#[derive(Debug)]
pub enum CaptureEvent {
    /// One chunk of encoded audio data
    Fragment(Vec<u8>),
    /// The recorder flushed its last fragment and shut down cleanly
    Finalized,
    /// Fatal mid-capture failure
    Error(String),
}

/// Constraints requested when acquiring the microphone
#[derive(Debug, Clone)]
pub struct MicConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Requested capture sample rate in Hz
    pub sample_rate: u32,
}

/// Recorder parameters bound at start
#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Chosen content type for emitted fragments
    pub content_type: String,
    /// Encoder bitrate target; backends with fixed-rate containers may
    /// ignore it
    pub bits_per_second: u32,
    /// Fragment emission interval
    pub fragment_interval: Duration,
}

/// The host recording facility
#[async_trait::async_trait]
pub trait RecordingBackend: Send + Sync {
    /// Whether this backend can emit fragments of the given content type
    fn is_type_supported(&self, content_type: &str) -> bool;

    /// The backend's native content type, used when nothing from the
    /// preference list is supported
    fn native_type(&self) -> &'static str;

    /// Request microphone access. Acquisition failures map to the distinct
    /// `CaptureError` variants; on success the device is held until the
    /// returned stream is released.
    async fn acquire(&self, constraints: &MicConstraints)
        -> Result<Box<dyn MicStream>, CaptureError>;
}

/// An acquired microphone stream
///
/// The stream is the one exclusively-owned resource in the system:
/// `release` must be safe to call on every exit path and idempotent.
pub trait MicStream: Send {
    /// Begin recording. Returns the ordered event channel.
    fn start(
        &mut self,
        options: &RecorderOptions,
    ) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>;

    /// Ask the recorder to flush pending data and emit `Finalized`.
    fn finalize(&mut self);

    /// Release the underlying device. Idempotent.
    fn release(&mut self);
}

/// cpal-backed recording facility
///
/// Captures mono PCM from the default input device and emits each fragment
/// as a self-contained WAV container. Echo cancellation and noise
/// suppression are left to the platform input pipeline.
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordingBackend for CpalBackend {
    fn is_type_supported(&self, content_type: &str) -> bool {
        content_type.eq_ignore_ascii_case(self.native_type())
    }

    fn native_type(&self) -> &'static str {
        "audio/wav"
    }

    async fn acquire(
        &self,
        constraints: &MicConstraints,
    ) -> Result<Box<dyn MicStream>, CaptureError> {
        // Validate device availability up front so acquisition failures
        // surface before the session transitions to Recording. The stream
        // itself is built on the capture thread because cpal streams are
        // not Send.
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::DeviceNotFound)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio input device: {}", device_name);

        let mut supported = device
            .supported_input_configs()
            .map_err(|e| CaptureError::Acquisition(e.to_string()))?;
        if supported.next().is_none() {
            return Err(CaptureError::NotSupported);
        }

        if constraints.echo_cancellation || constraints.noise_suppression {
            debug!("Echo cancellation / noise suppression delegated to the platform input pipeline");
        }

        Ok(Box::new(CpalMicStream {
            constraints: constraints.clone(),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }))
    }
}

/// Microphone stream handle for the cpal backend
struct CpalMicStream {
    constraints: MicConstraints,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MicStream for CpalMicStream {
    fn start(
        &mut self,
        options: &RecorderOptions,
    ) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        if self.thread_handle.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        if options.bits_per_second != 0 {
            debug!(
                bits_per_second = options.bits_per_second,
                "PCM container has a fixed rate; bitrate target noted but not applied"
            );
        }

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let (event_tx, event_rx) = mpsc::channel(600);
        let sample_rate = self.constraints.sample_rate;
        let interval = options.fragment_interval;

        let thread_handle = thread::spawn(move || {
            if let Err(e) = run_capture(running, event_tx.clone(), sample_rate, interval) {
                error!("Audio capture error: {}", e);
                let _ = event_tx.blocking_send(CaptureEvent::Error(e.to_string()));
            }
        });
        self.thread_handle = Some(thread_handle);

        Ok(event_rx)
    }

    fn finalize(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("Microphone released");
        }
    }
}

impl Drop for CpalMicStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run audio capture on the current thread (blocking)
///
/// Accumulates mono i16 samples from the cpal callback and drains them into
/// one WAV-encoded fragment per interval. After the stop flag clears, the
/// remainder is flushed as a final fragment and `Finalized` is emitted.
fn run_capture(
    running: Arc<AtomicBool>,
    event_tx: mpsc::Sender<CaptureEvent>,
    target_sample_rate: u32,
    fragment_interval: Duration,
) -> Result<(), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::DeviceNotFound)?;

    // Prefer the requested rate; fall back to the highest supported one.
    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Acquisition(e.to_string()))?;

    let mut best_config = None;
    for config in supported_configs {
        if config.channels() == 0 {
            continue;
        }
        if config.min_sample_rate().0 <= target_sample_rate
            && config.max_sample_rate().0 >= target_sample_rate
        {
            best_config = Some(config.with_sample_rate(cpal::SampleRate(target_sample_rate)));
            break;
        } else if best_config.is_none() {
            best_config = Some(config.with_max_sample_rate());
        }
    }
    let supported_config = best_config.ok_or(CaptureError::NotSupported)?;

    let config: cpal::StreamConfig = supported_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    if sample_rate != target_sample_rate {
        warn!(
            "{}Hz not supported, capturing at {}Hz",
            target_sample_rate, sample_rate
        );
    }
    info!("Audio config: {} channels, {} Hz", channels, sample_rate);

    let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let buffer_for_stream = buffer.clone();
    let running_for_stream = running.clone();

    let err_callback = |err| {
        error!("Audio stream error: {}", err);
    };

    let stream = match device
        .default_input_config()
        .map_err(|e| CaptureError::Acquisition(e.to_string()))?
        .sample_format()
    {
        SampleFormat::I16 => device
            .build_input_stream(
                &config,
                move |data: &[i16], _| {
                    if !running_for_stream.load(Ordering::SeqCst) {
                        return;
                    }
                    append_mono(&buffer_for_stream, data, channels);
                },
                err_callback,
                None,
            )
            .map_err(|e| CaptureError::Acquisition(e.to_string()))?,
        SampleFormat::F32 => {
            let running_f32 = running.clone();
            let buffer_f32 = buffer.clone();
            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if !running_f32.load(Ordering::SeqCst) {
                            return;
                        }
                        let samples: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                            .collect();
                        append_mono(&buffer_f32, &samples, channels);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| CaptureError::Acquisition(e.to_string()))?
        }
        sample_format => {
            return Err(CaptureError::Acquisition(format!(
                "unsupported sample format {sample_format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::Acquisition(e.to_string()))?;
    info!("Audio capture started");

    while running.load(Ordering::SeqCst) {
        thread::sleep(fragment_interval);
        if let Some(fragment) = drain_fragment(&buffer, sample_rate) {
            if event_tx.blocking_send(CaptureEvent::Fragment(fragment)).is_err() {
                // Receiver dropped; nothing left to record for.
                break;
            }
        }
    }

    drop(stream);

    // Flush whatever arrived between the last drain and the stop signal.
    if let Some(fragment) = drain_fragment(&buffer, sample_rate) {
        let _ = event_tx.blocking_send(CaptureEvent::Fragment(fragment));
    }
    let _ = event_tx.blocking_send(CaptureEvent::Finalized);
    info!("Audio capture finalized");
    Ok(())
}

/// Downmix interleaved samples to mono and append to the shared buffer
fn append_mono(buffer: &Arc<Mutex<Vec<i16>>>, data: &[i16], channels: usize) {
    let Ok(mut buf) = buffer.lock() else {
        return;
    };
    if channels <= 1 {
        buf.extend_from_slice(data);
        return;
    }
    for frame in data.chunks_exact(channels) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        buf.push((sum / channels as i32) as i16);
    }
}

/// Drain the sample buffer into one WAV-encoded fragment
fn drain_fragment(buffer: &Arc<Mutex<Vec<i16>>>, sample_rate: u32) -> Option<Vec<u8>> {
    let samples: Vec<i16> = {
        let Ok(mut buf) = buffer.lock() else {
            return None;
        };
        if buf.is_empty() {
            return None;
        }
        std::mem::take(&mut *buf)
    };
    match encode_wav(&samples, sample_rate) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to encode fragment: {}", e);
            None
        }
    }
}

/// Encode mono i16 samples into a self-contained WAV container
fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
