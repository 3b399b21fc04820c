use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui::TextureHandle;
use serde::{Deserialize, Serialize};

use shared::domain::{EditType, ImageFormat};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorCategory, UiErrorContext, UiEvent};
use crate::controller::orchestration::dispatch_backend_command;
use crate::media::{human_readable_bytes, PreviewImage};

pub const SETTINGS_STORAGE_KEY: &str = "facemask_desktop_settings";

const PREVIEW_MAX_EDGE: f32 = 360.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusBannerSeverity {
    Error,
}

#[derive(Debug, Clone)]
struct StatusBanner {
    severity: StatusBannerSeverity,
    message: String,
}

fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Api => "API",
        UiErrorCategory::Service => "Service",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

fn ctx_label(context: UiErrorContext) -> &'static str {
    match context {
        UiErrorContext::BackendStartup => "starting the backend",
        UiErrorContext::SelectImage => "selecting the image",
        UiErrorContext::Submit => "masking",
    }
}

fn health_label(health: HealthStatus, detail: &str) -> (egui::Color32, String) {
    match health {
        HealthStatus::Checking => (egui::Color32::GRAY, "checking service...".to_string()),
        HealthStatus::Healthy => {
            let text = if detail.is_empty() {
                "service healthy".to_string()
            } else {
                format!("service healthy ({detail})")
            };
            (egui::Color32::from_rgb(80, 190, 120), text)
        }
        HealthStatus::Unreachable => (
            egui::Color32::from_rgb(220, 120, 80),
            format!("service unreachable: {detail}"),
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthStatus {
    Checking,
    Healthy,
    Unreachable,
}

/// Decoded preview plus its lazily created GPU texture.
struct PreviewPane {
    image: PreviewImage,
    texture: Option<TextureHandle>,
}

impl PreviewPane {
    fn new(image: PreviewImage) -> Self {
        Self {
            image,
            texture: None,
        }
    }

    fn texture_handle(&mut self, ctx: &egui::Context, id: String) -> TextureHandle {
        if let Some(texture) = &self.texture {
            return texture.clone();
        }
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [self.image.width, self.image.height],
            &self.image.rgba,
        );
        let texture = ctx.load_texture(id, color_image, egui::TextureOptions::LINEAR);
        self.texture = Some(texture.clone());
        texture
    }
}

/// UI choices persisted across sessions via eframe storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub edit_type_code: u8,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self { edit_type_code: 1 }
    }
}

struct SelectedSummary {
    filename: String,
    format: ImageFormat,
    size_bytes: usize,
}

pub struct FaceMaskApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    api_base: String,
    selected: Option<SelectedSummary>,
    input_preview: Option<PreviewPane>,
    output_preview: Option<PreviewPane>,
    output_caption: Option<String>,

    edit_type: EditType,
    busy: bool,
    worker_ready: bool,

    health: HealthStatus,
    health_detail: String,

    status: String,
    status_banner: Option<StatusBanner>,
    drop_hover: bool,

    // Salt for texture ids so replaced images get fresh textures.
    preview_epoch: u64,
}

impl FaceMaskApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        api_base: String,
        persisted: Option<PersistedSettings>,
    ) -> Self {
        let persisted = persisted.unwrap_or_default();
        Self {
            cmd_tx,
            ui_rx,
            api_base,
            selected: None,
            input_preview: None,
            output_preview: None,
            output_caption: None,
            edit_type: EditType::from_wire_code(persisted.edit_type_code),
            busy: false,
            worker_ready: false,
            health: HealthStatus::Checking,
            health_detail: String::new(),
            status: "Starting backend worker...".to_string(),
            status_banner: None,
            drop_hover: false,
            preview_epoch: 0,
        }
    }

    fn dispatch(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status);
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = format!("{} {}", Local::now().format("%H:%M:%S"), message.into());
    }

    fn show_error(&mut self, err: &UiError) {
        self.status_banner = Some(StatusBanner {
            severity: StatusBannerSeverity::Error,
            message: format!(
                "{} failure while {}: {}",
                err_label(err.category()),
                ctx_label(err.context()),
                err.message()
            ),
        });
        self.set_status("Request failed");
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::WorkerReady => {
                    self.worker_ready = true;
                    self.set_status("Backend worker ready");
                }
                UiEvent::ImageSelected {
                    filename,
                    format,
                    size_bytes,
                    preview,
                } => {
                    self.preview_epoch += 1;
                    self.input_preview = Some(PreviewPane::new(preview));
                    self.set_status(format!("Selected {filename}"));
                    self.selected = Some(SelectedSummary {
                        filename,
                        format,
                        size_bytes,
                    });
                    self.status_banner = None;
                }
                UiEvent::SelectionRejected(err) => {
                    self.selected = None;
                    self.input_preview = None;
                    self.show_error(&err);
                    self.set_status("Selection rejected");
                }
                UiEvent::SelectionCleared => {
                    self.selected = None;
                    self.input_preview = None;
                    self.set_status("Selection cleared");
                }
                UiEvent::SubmissionStarted => {
                    self.busy = true;
                    self.set_status("Masking faces...");
                }
                UiEvent::MaskCompleted {
                    preview,
                    faces_detected,
                    fallback_used,
                    message,
                } => {
                    self.busy = false;
                    if let Some(preview) = preview {
                        self.preview_epoch += 1;
                        self.output_preview = Some(PreviewPane::new(preview));
                    }
                    let mut caption = match faces_detected {
                        Some(1) => "1 face masked".to_string(),
                        Some(n) => format!("{n} faces masked"),
                        None => "Faces masked".to_string(),
                    };
                    if fallback_used {
                        caption.push_str(" (fallback rendering)");
                    }
                    self.output_caption = Some(caption);
                    self.set_status(message.unwrap_or_else(|| "Masking completed".to_string()));
                }
                UiEvent::SubmissionFailed(err) => {
                    self.busy = false;
                    self.show_error(&err);
                }
                UiEvent::SubmissionCancelled => {
                    self.busy = false;
                    self.set_status("Submission cancelled");
                }
                UiEvent::HealthChecked { healthy, detail } => {
                    self.health = if healthy {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Unreachable
                    };
                    self.health_detail = detail;
                }
                UiEvent::Info(message) => {
                    self.set_status(message);
                }
                UiEvent::Error(err) => {
                    self.show_error(&err);
                }
            }
        }
    }

    fn handle_file_drops(&mut self, ctx: &egui::Context) {
        self.drop_hover = ctx.input(|i| !i.raw.hovered_files.is_empty());
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        // One image per interaction; extra dropped files are ignored.
        if let Some(file) = dropped.into_iter().next() {
            if let Some(path) = file.path {
                self.dispatch(BackendCommand::SelectImage { path });
            }
        }
    }

    fn pick_file(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", ImageFormat::accepted_extensions())
            .pick_file()
        {
            self.dispatch(BackendCommand::SelectImage { path });
        }
    }

    fn show_banner(&mut self, ui: &mut egui::Ui) {
        let Some(banner) = self.status_banner.clone() else {
            return;
        };
        let (fill, stroke) = match banner.severity {
            StatusBannerSeverity::Error => (
                egui::Color32::from_rgb(66, 28, 28),
                egui::Color32::from_rgb(200, 80, 80),
            ),
        };
        egui::Frame::new()
            .fill(fill)
            .stroke(egui::Stroke::new(1.0, stroke))
            .inner_margin(egui::Margin::symmetric(10, 8))
            .corner_radius(4.0)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(&banner.message).color(egui::Color32::WHITE));
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Dismiss").clicked() {
                            self.status_banner = None;
                        }
                    });
                });
            });
        ui.add_space(6.0);
    }

    fn show_drop_zone(&mut self, ui: &mut egui::Ui) {
        let stroke = if self.drop_hover {
            egui::Stroke::new(2.0, egui::Color32::from_rgb(110, 170, 255))
        } else {
            egui::Stroke::new(1.0, ui.visuals().widgets.noninteractive.bg_stroke.color)
        };
        egui::Frame::new()
            .stroke(stroke)
            .inner_margin(egui::Margin::symmetric(16, 14))
            .corner_radius(6.0)
            .show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label("Drag & drop a PNG or JPEG here");
                    if ui.button("Choose image...").clicked() {
                        self.pick_file();
                    }
                });
            });

        let summary = self.selected.as_ref().map(|selected| {
            format!(
                "{} ({}, {})",
                selected.filename,
                selected.format.mime_type(),
                human_readable_bytes(selected.size_bytes as u64),
            )
        });
        if let Some(summary) = summary {
            ui.horizontal(|ui| {
                ui.label(summary);
                if ui.small_button("Clear").clicked() {
                    self.dispatch(BackendCommand::ClearSelection);
                }
            });
        }
    }

    fn show_action_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            egui::ComboBox::from_label("Mask style")
                .selected_text(self.edit_type.label())
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut self.edit_type, EditType::Bouquet, EditType::Bouquet.label());
                    ui.selectable_value(
                        &mut self.edit_type,
                        EditType::Postcard,
                        EditType::Postcard.label(),
                    );
                });

            let can_submit = self.selected.is_some() && !self.busy && self.worker_ready;
            let label = if self.busy { "Masking..." } else { "Mask faces" };
            if ui
                .add_enabled(can_submit, egui::Button::new(label))
                .clicked()
            {
                let edit_type = self.edit_type;
                self.dispatch(BackendCommand::Submit { edit_type });
            }

            if self.busy {
                ui.spinner();
                if ui.button("Cancel").clicked() {
                    self.dispatch(BackendCommand::CancelSubmission);
                }
            }
        });
    }

    fn show_preview(
        ui: &mut egui::Ui,
        ctx: &egui::Context,
        title: &str,
        pane: Option<&mut PreviewPane>,
        texture_id: String,
        caption: Option<&str>,
    ) {
        ui.heading(title);
        match pane {
            Some(pane) => {
                let texture = pane.texture_handle(ctx, texture_id);
                let size = texture.size_vec2();
                let scale = (PREVIEW_MAX_EDGE / size.x.max(size.y)).min(1.0);
                ui.add(egui::Image::new(&texture).fit_to_exact_size(size * scale));
                if let Some(caption) = caption {
                    ui.small(caption);
                }
            }
            None => {
                ui.weak("No image");
            }
        }
    }

    fn show_health(&self, ui: &mut egui::Ui) {
        let (color, text) = health_label(self.health, &self.health_detail);
        ui.colored_label(color, text);
    }

    fn show_main(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Face Mask");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    self.show_health(ui);
                    ui.weak(&self.api_base);
                });
            });
            ui.separator();

            self.show_banner(ui);
            self.show_drop_zone(ui);
            ui.add_space(8.0);
            self.show_action_row(ui);
            ui.add_space(8.0);

            let epoch = self.preview_epoch;
            let output_caption = self.output_caption.clone();
            ui.columns(2, |columns| {
                Self::show_preview(
                    &mut columns[0],
                    ctx,
                    "Original",
                    self.input_preview.as_mut(),
                    format!("input_preview_{epoch}"),
                    None,
                );
                Self::show_preview(
                    &mut columns[1],
                    ctx,
                    "Masked",
                    self.output_preview.as_mut(),
                    format!("output_preview_{epoch}"),
                    output_caption.as_deref(),
                );
            });

            ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
                ui.small(&self.status);
            });
        });
    }
}

impl eframe::App for FaceMaskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        self.handle_file_drops(ctx);
        self.show_main(ctx);

        if self.busy {
            ctx.request_repaint_after(std::time::Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedSettings {
            edit_type_code: self.edit_type.wire_code(),
        };
        if let Ok(serialized) = serde_json::to_string(&settings) {
            storage.set_string(SETTINGS_STORAGE_KEY, serialized);
        }
    }
}
