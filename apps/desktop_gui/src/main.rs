//! Desktop GUI for the face-masking service.
//!
//! The UI thread runs egui; a dedicated backend thread owns a tokio runtime,
//! the HTTP client, and the upload controller. The two sides talk over
//! bounded crossbeam channels.

mod backend_bridge;
mod config;
mod controller;
mod media;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::ui::{FaceMaskApp, PersistedSettings, SETTINGS_STORAGE_KEY};

#[derive(Parser, Debug)]
#[command(name = "facemask-desktop", about = "Desktop client for the face-masking service")]
struct Args {
    /// API base URL, e.g. http://127.0.0.1:8080/api
    #[arg(long)]
    api_base: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(api_base) = args.api_base {
        settings.api_base = api_base;
    }
    if let Some(secs) = args.request_timeout_secs {
        settings.request_timeout_secs = secs;
    }
    tracing::info!(api_base = %settings.api_base, "starting desktop GUI");

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);
    let api_base = settings.api_base.clone();
    backend_bridge::runtime::launch(cmd_rx, ui_tx, settings);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Face Mask Desktop")
            .with_inner_size([900.0, 620.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Face Mask Desktop",
        options,
        Box::new(|cc| {
            let persisted = cc.storage.and_then(|storage| {
                storage
                    .get_string(SETTINGS_STORAGE_KEY)
                    .and_then(|text| serde_json::from_str::<PersistedSettings>(&text).ok())
            });
            Ok(Box::new(FaceMaskApp::new(cmd_tx, ui_rx, api_base, persisted)))
        }),
    )
}
