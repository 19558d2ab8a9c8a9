#![deny(clippy::all)]

mod capture;
mod config;
mod dispatch;
mod error;
mod report;
mod session;
mod status;
mod upload;

use capture::backend::CpalBackend;
use capture::CaptureConfig;
use dispatch::HandoverDispatcher;
use report::Renderer;
use session::SessionController;
use status::StatusSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use upload::UploadClient;

/// StatusSink for the terminal front end: status lines and rendered
/// reports go to stdout, timer ticks and busy toggles to the log.
struct CliSink;

impl StatusSink for CliSink {
    fn status(&self, message: &str) {
        println!("[狀態] {message}");
    }

    fn timer(&self, elapsed: &str) {
        info!(elapsed = %elapsed, "recording");
    }

    fn busy(&self, busy: bool) {
        info!(busy = busy, "busy state changed");
    }

    fn report_html(&self, html: &str) {
        println!("--- 照護交接報告 ---");
        println!("{html}");
        println!("--------------------");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = config::load_config()?;

    // Both endpoints must pass the secure-transport gate before any
    // component is constructed.
    let upload_url = config::check_secure_endpoint(&config.endpoints.upload_url)?;
    let email_url = config::check_secure_endpoint(&config.endpoints.email_url)?;

    let capture_config = CaptureConfig {
        sample_rate: config.audio.sample_rate,
        bits_per_second: config.audio.bits_per_second,
        fragment_interval: Duration::from_millis(config.audio.fragment_interval_ms),
    };

    let dispatcher = Arc::new(HandoverDispatcher::new(
        email_url,
        config.endpoints.notify_email.clone(),
        config.handover.require_handover_to,
    )?);

    let mut controller = SessionController::new(
        Arc::new(CpalBackend::new()),
        Arc::new(UploadClient::new(upload_url)?),
        Renderer::builtin(),
        dispatcher,
        Arc::new(CliSink),
        capture_config,
    );

    info!("shiftnote ready");
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        // Surface any mid-capture failure before handling the next command.
        controller.pump();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("record") => {
                let handover_from = parts.next().map(str::to_string);
                controller.toggle_record(handover_from).await;
            }
            Some("edit") => controller.enter_edit(),
            Some("set") => {
                let text = line.trim_start()["set".len()..].trim_start();
                controller.apply_edit(&text.replace("\\n", "\n"));
            }
            Some("save") => controller.save_report(),
            Some("send") => {
                let handover_from = parts.next().unwrap_or_default();
                let handover_to = parts.next();
                controller.send_report(handover_from, handover_to).await;
            }
            Some("show") => {
                println!("{}", controller.view().plain_text());
                println!("最後更新：{}", controller.view().display_timestamp());
            }
            Some("quit") | Some("exit") => break,
            Some(_) => print_help(),
            None => {}
        }
    }

    Ok(())
}

fn print_help() {
    println!("指令：record [交接人] | edit | set <內容> | save | send <交接人> [接班人] | show | quit");
}
