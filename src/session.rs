//! Session orchestration
//!
//! Wires the capture session, upload client, renderer, report view, and
//! dispatcher together. Collaborators are injected at construction; the
//! controller holds at most one capture session and serializes the
//! record/upload pipeline so duplicate triggers are rejected while an
//! operation is pending.

use crate::capture::backend::RecordingBackend;
use crate::capture::{CaptureConfig, CaptureSession};
use crate::dispatch::{HandoverDispatcher, HandoverRequest};
use crate::report::{Renderer, ReportView};
use crate::status::StatusSink;
use crate::upload::{ReportUploader, UploadRequest};
use std::sync::Arc;
use tracing::{info, warn};

const STATUS_READY: &str = "準備就緒";
const STATUS_RECORDING: &str = "正在錄音...";
const STATUS_PROCESSING: &str = "處理中...";
const STATUS_FAILED: &str = "處理失敗";
const STATUS_BUSY: &str = "處理中，請稍候再操作";
const STATUS_SENT: &str = "報告已成功發送至信箱！";
const STATUS_SEND_FAILED: &str = "發送郵件時發生錯誤，請稍後再試";

/// Orchestrates the capture-to-report pipeline
pub struct SessionController {
    backend: Arc<dyn RecordingBackend>,
    uploader: Arc<dyn ReportUploader>,
    renderer: Renderer,
    dispatcher: Arc<HandoverDispatcher>,
    sink: Arc<dyn StatusSink>,
    capture_config: CaptureConfig,
    session: Option<CaptureSession>,
    upload_pending: bool,
    view: ReportView,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn RecordingBackend>,
        uploader: Arc<dyn ReportUploader>,
        renderer: Renderer,
        dispatcher: Arc<HandoverDispatcher>,
        sink: Arc<dyn StatusSink>,
        capture_config: CaptureConfig,
    ) -> Self {
        sink.status(STATUS_READY);
        Self {
            backend,
            uploader,
            renderer,
            dispatcher,
            sink,
            capture_config,
            session: None,
            upload_pending: false,
            view: ReportView::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, CaptureSession::is_recording)
    }

    pub fn view(&self) -> &ReportView {
        &self.view
    }

    /// The record trigger: start when idle, stop-and-upload when recording.
    /// Rejected while an upload from the previous session is still pending.
    pub async fn toggle_record(&mut self, handover_from: Option<String>) {
        // A direct caller is already serialized by &mut self; the pending
        // flag rejects triggers from front ends that share the controller
        // behind a lock and can re-enter between polls of the upload.
        if self.upload_pending {
            self.sink.status(STATUS_BUSY);
            return;
        }
        if self.is_recording() {
            self.stop_and_upload(handover_from).await;
        } else {
            self.start_recording().await;
        }
    }

    /// Drain capture events accumulated since the last trigger
    ///
    /// A mid-capture runtime error forces an implicit stop; the partial
    /// artifact is discarded and the caregiver informed.
    pub fn pump(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(e) = session.pump_events() {
            warn!("Recording failed mid-capture: {}", e);
            self.sink.status(&e.user_message());
            self.session = None;
        }
    }

    async fn start_recording(&mut self) {
        // Sessions are single-use; each recording gets a fresh one.
        let mut session = CaptureSession::new(
            self.backend.clone(),
            self.sink.clone(),
            self.capture_config.clone(),
        );
        match session.start().await {
            Ok(()) => {
                self.sink.status(STATUS_RECORDING);
                self.session = Some(session);
            }
            Err(e) => {
                warn!("Failed to start recording: {}", e);
                self.sink.status(&e.user_message());
            }
        }
    }

    async fn stop_and_upload(&mut self, handover_from: Option<String>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.sink.status(STATUS_PROCESSING);

        let artifact = match session.stop().await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return,
            Err(e) => {
                self.sink.status(&e.user_message());
                self.sink.status(STATUS_FAILED);
                return;
            }
        };

        self.upload_pending = true;
        self.sink.busy(true);

        let result = self
            .uploader
            .upload(UploadRequest {
                artifact,
                handover_from,
            })
            .await;

        match result {
            Ok(report) => {
                let fragment = self.renderer.render(&report);
                self.sink.report_html(&fragment.html);
                self.view.replace(fragment);
                self.sink.status(STATUS_READY);
                info!("Report rendered and mounted");
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                self.sink.status(&format!("處理過程中發生錯誤：{e}"));
                self.sink.status(STATUS_FAILED);
            }
        }

        // Affordances are restored regardless of outcome.
        self.sink.busy(false);
        self.upload_pending = false;
    }

    /// Unlock the mounted report for in-place editing
    pub fn enter_edit(&mut self) {
        self.view.enter_edit();
    }

    /// Apply an edit to the unlocked report
    pub fn apply_edit(&mut self, new_text: &str) {
        if let Err(e) = self.view.apply_edit(new_text) {
            self.sink.status(&e.to_string());
        }
    }

    /// Lock the report again and refresh its display timestamp
    pub fn save_report(&mut self) {
        self.view.save();
    }

    /// Dispatch the current report by email
    pub async fn send_report(&mut self, handover_from: &str, handover_to: Option<&str>) {
        let request = HandoverRequest {
            handover_from: handover_from.to_string(),
            handover_to: handover_to.map(str::to_string),
            report: self.view.plain_text().to_string(),
        };

        // Validation failures must not touch the busy affordance.
        if let Err(e) = self.dispatcher.validate(&request) {
            self.sink.status(&e.to_string());
            return;
        }

        self.sink.busy(true);
        let result = self.dispatcher.send(&request).await;
        self.sink.busy(false);

        match result {
            Ok(()) => self.sink.status(STATUS_SENT),
            Err(e) => {
                warn!("Email dispatch failed: {}", e);
                self.sink.status(STATUS_SEND_FAILED);
            }
        }
    }
}
