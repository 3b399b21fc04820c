//! Backend worker: a dedicated thread owning a tokio runtime, the HTTP
//! client, and the upload controller; executes commands from the UI queue
//! and reports back over the event channel.

use std::{sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::Mutex;

use masking_client::{
    decode_data_url, ImageCandidate, MaskOutcome, MaskedOutput, MaskingApi, MaskingClient,
    UploadController,
};

use crate::backend_bridge::commands::BackendCommand;
use crate::config::Settings;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};
use crate::media::{decode_preview_image, PreviewImage};

pub fn launch(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>, settings: Settings) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };
        runtime.block_on(run_worker(cmd_rx, ui_tx, settings));
    });
}

async fn run_worker(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>, settings: Settings) {
    let client = match MaskingClient::with_timeout(
        &settings.api_base,
        Duration::from_secs(settings.request_timeout_secs),
    ) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!(
                    "backend worker startup failure: invalid API base '{}': {err}",
                    settings.api_base
                ),
            )));
            tracing::error!(api_base = %settings.api_base, "invalid API base: {err}");
            return;
        }
    };
    let controller = Arc::new(Mutex::new(UploadController::new(
        client.clone() as Arc<dyn MaskingApi>
    )));
    let _ = ui_tx.try_send(UiEvent::WorkerReady);

    // Probe the service once up-front so the UI can show reachability.
    check_health(&client, &ui_tx).await;

    let mut inflight: Option<tokio::task::JoinHandle<()>> = None;
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            BackendCommand::SelectImage { path } => {
                tracing::info!(path = %path.display(), "backend: select_image");
                let candidate = match ImageCandidate::from_path(&path).await {
                    Ok(candidate) => candidate,
                    Err(err) => {
                        tracing::warn!("backend: reading image failed: {err}");
                        controller.lock().await.clear_selection();
                        let _ = ui_tx.try_send(UiEvent::SelectionRejected(
                            UiError::from_upload_error(UiErrorContext::SelectImage, &err),
                        ));
                        continue;
                    }
                };

                let mut guard = controller.lock().await;
                match guard.select_image(candidate) {
                    Ok(image) => match decode_preview_image(&image.bytes) {
                        Ok(preview) => {
                            let _ = ui_tx.try_send(UiEvent::ImageSelected {
                                filename: image.filename.clone(),
                                format: image.format,
                                size_bytes: image.bytes.len(),
                                preview,
                            });
                        }
                        Err(err) => {
                            // MIME said png/jpeg but the bytes don't decode.
                            guard.clear_selection();
                            let _ = ui_tx.try_send(UiEvent::SelectionRejected(
                                UiError::from_message(
                                    UiErrorContext::SelectImage,
                                    format!("could not decode image: {err}"),
                                ),
                            ));
                        }
                    },
                    Err(err) => {
                        tracing::warn!("backend: selection rejected: {err}");
                        guard.clear_selection();
                        let _ = ui_tx.try_send(UiEvent::SelectionRejected(
                            UiError::from_upload_error(UiErrorContext::SelectImage, &err),
                        ));
                    }
                }
            }
            BackendCommand::ClearSelection => {
                controller.lock().await.clear_selection();
                let _ = ui_tx.try_send(UiEvent::SelectionCleared);
            }
            BackendCommand::Submit { edit_type } => {
                if inflight.as_ref().is_some_and(|task| !task.is_finished()) {
                    tracing::debug!("backend: submit ignored; submission already in flight");
                    continue;
                }
                // Begin under a short lock; SubmissionStarted is only sent
                // once a request is actually going out, so a skipped submit
                // can never leave the UI stuck busy.
                let pending = match controller.lock().await.begin_submission(edit_type) {
                    Ok(Some(pending)) => pending,
                    Ok(None) => {
                        let _ = ui_tx.try_send(UiEvent::Info("Nothing to submit".to_string()));
                        continue;
                    }
                    Err(err) => {
                        tracing::error!("backend: submit rejected: {err}");
                        let _ = ui_tx.try_send(UiEvent::SubmissionFailed(
                            UiError::from_upload_error(UiErrorContext::Submit, &err),
                        ));
                        continue;
                    }
                };
                let _ = ui_tx.try_send(UiEvent::SubmissionStarted);
                let controller = controller.clone();
                let api = client.clone();
                let ui_tx = ui_tx.clone();
                // The pending submission owns its request; the controller
                // lock is free while the call is on the wire, so select,
                // clear, and cancel commands stay responsive.
                inflight = Some(tokio::spawn(async move {
                    let result = pending.run().await;
                    controller.lock().await.finish_submission();
                    let event = match result {
                        Ok(outcome) => resolve_outcome(&api, outcome).await,
                        Err(err) => {
                            tracing::error!("backend: submit failed: {err}");
                            UiEvent::SubmissionFailed(UiError::from_upload_error(
                                UiErrorContext::Submit,
                                &err,
                            ))
                        }
                    };
                    let _ = ui_tx.try_send(event);
                }));
            }
            BackendCommand::CancelSubmission => {
                let Some(task) = inflight.take() else {
                    continue;
                };
                if task.is_finished() {
                    continue;
                }
                tracing::info!("backend: cancelling in-flight submission");
                task.abort();
                // The abort drops the in-flight request; once the task has
                // wound down, put the busy flag back to idle.
                let controller = controller.clone();
                let ui_tx = ui_tx.clone();
                tokio::spawn(async move {
                    let _ = task.await;
                    controller.lock().await.release_after_abort();
                    let _ = ui_tx.try_send(UiEvent::SubmissionCancelled);
                });
            }
            BackendCommand::CheckHealth => {
                check_health(&client, &ui_tx).await;
            }
        }
    }
}

/// Turns a successful submission into the UI event, resolving the preferred
/// output representation into preview pixels.
async fn resolve_outcome(api: &Arc<MaskingClient>, outcome: MaskOutcome) -> UiEvent {
    let preview = match &outcome.output {
        None => None,
        Some(output) => match resolve_output_preview(api, output).await {
            Ok(preview) => Some(preview),
            Err(reason) => {
                tracing::error!("backend: masked image unusable: {reason}");
                return UiEvent::SubmissionFailed(UiError::from_message(
                    UiErrorContext::Submit,
                    format!("masked image could not be rendered: {reason}"),
                ));
            }
        },
    };
    UiEvent::MaskCompleted {
        preview,
        faces_detected: outcome.faces_detected,
        fallback_used: outcome.fallback_used,
        message: outcome.message,
    }
}

async fn resolve_output_preview(
    api: &Arc<MaskingClient>,
    output: &MaskedOutput,
) -> Result<PreviewImage, String> {
    let bytes = match output {
        MaskedOutput::DataUrl(url) => decode_data_url(url)
            .map(|(_, bytes)| bytes)
            .map_err(|err| err.to_string())?,
        MaskedOutput::SignedUrl(url) => api.fetch_image(url).await.map_err(|err| err.to_string())?,
    };
    decode_preview_image(&bytes)
}

async fn check_health(client: &Arc<MaskingClient>, ui_tx: &Sender<UiEvent>) {
    let event = match client.health().await {
        Ok(health) => {
            let healthy = health.is_healthy();
            let detail = health.service.unwrap_or(health.status);
            UiEvent::HealthChecked { healthy, detail }
        }
        Err(err) => {
            tracing::warn!("backend: health probe failed: {err}");
            UiEvent::HealthChecked {
                healthy: false,
                detail: err.to_string(),
            }
        }
    };
    let _ = ui_tx.try_send(event);
}
