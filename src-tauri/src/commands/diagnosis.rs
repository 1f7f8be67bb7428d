//! Consultation-screen IPC commands.
//!
//! Every command returns the user-facing Spanish message on failure; the
//! frontend shows it in a modal and refreshes with `get_flow_state`.

use std::sync::Arc;

use tauri::{AppHandle, Emitter, State};
use tauri_plugin_dialog::DialogExt;

use crate::core_state::{CoreError, CoreState};
use crate::diagnosis::{AnalysisMode, DiagnosisResult, ImageRef, PatientContext};
use crate::flow::{FlowSnapshot, SelectionOutcome};

/// Extensions offered by the gallery picker.
const PICKER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Event carrying a fresh [`FlowSnapshot`] after an analysis settles.
const FLOW_EVENT: &str = "diagnosis-flow";

fn ipc_error(err: CoreError) -> String {
    tracing::warn!(error = %err, "Consultation command failed");
    err.user_message()
}

#[tauri::command]
pub fn get_flow_state(state: State<'_, Arc<CoreState>>) -> Result<FlowSnapshot, String> {
    state.snapshot().map_err(ipc_error)
}

#[tauri::command]
pub fn set_analysis_mode(
    mode: AnalysisMode,
    state: State<'_, Arc<CoreState>>,
) -> Result<FlowSnapshot, String> {
    let mut flow = state.lock_flow().map_err(ipc_error)?;
    flow.set_mode(mode).map_err(|e| ipc_error(e.into()))?;
    Ok(flow.snapshot())
}

/// Open the native gallery picker and apply the selection.
///
/// Runs on a blocking thread: the dialog waits for the user.
#[tauri::command]
pub async fn pick_images(
    app: AppHandle,
    state: State<'_, Arc<CoreState>>,
) -> Result<FlowSnapshot, String> {
    let state = state.inner().clone();
    tauri::async_runtime::spawn_blocking(move || {
        state
            .select_with(|| pick_from_dialog(&app))
            .map_err(ipc_error)
    })
    .await
    .map_err(|e| format!("Task failed: {e}"))?
}

fn pick_from_dialog(app: &AppHandle) -> SelectionOutcome {
    let picked = app
        .dialog()
        .file()
        .add_filter("Imágenes", PICKER_EXTENSIONS)
        .blocking_pick_files();

    let Some(files) = picked else {
        return SelectionOutcome::Cancelled;
    };
    let paths: Result<Vec<ImageRef>, _> = files
        .into_iter()
        .map(|file| file.into_path().map(ImageRef::Path))
        .collect();
    match paths {
        Ok(images) => SelectionOutcome::Picked(images),
        Err(e) => SelectionOutcome::Failed(e.to_string()),
    }
}

/// Apply a photo taken with the webview camera.
///
/// `data_uri` is `None` when the user closed the camera without shooting.
#[tauri::command]
pub fn complete_capture(
    data_uri: Option<String>,
    permission_granted: bool,
    state: State<'_, Arc<CoreState>>,
) -> Result<FlowSnapshot, String> {
    state
        .select_with(|| capture_outcome(data_uri, permission_granted))
        .map_err(ipc_error)
}

fn capture_outcome(data_uri: Option<String>, permission_granted: bool) -> SelectionOutcome {
    if !permission_granted {
        return SelectionOutcome::PermissionDenied;
    }
    match data_uri {
        Some(uri) if !uri.trim().is_empty() => {
            SelectionOutcome::Picked(vec![ImageRef::Encoded(uri)])
        }
        _ => SelectionOutcome::Cancelled,
    }
}

#[tauri::command]
pub fn update_patient_context(
    context: PatientContext,
    state: State<'_, Arc<CoreState>>,
) -> Result<FlowSnapshot, String> {
    let mut flow = state.lock_flow().map_err(ipc_error)?;
    flow.update_context(context).map_err(|e| ipc_error(e.into()))?;
    Ok(flow.snapshot())
}

/// "Continuar al análisis": store the form and enable analysis.
#[tauri::command]
pub fn submit_patient_context(
    context: PatientContext,
    state: State<'_, Arc<CoreState>>,
) -> Result<FlowSnapshot, String> {
    let mut flow = state.lock_flow().map_err(ipc_error)?;
    flow.submit_context(context).map_err(|e| ipc_error(e.into()))?;
    Ok(flow.snapshot())
}

/// Encode, send and resolve. One request, no retry.
///
/// Runs on a blocking thread to avoid freezing the UI (HTTP call).
#[tauri::command]
pub async fn analyze_images(
    app: AppHandle,
    state: State<'_, Arc<CoreState>>,
) -> Result<DiagnosisResult, String> {
    let state = state.inner().clone();
    let outcome = tauri::async_runtime::spawn_blocking({
        let state = Arc::clone(&state);
        move || state.analyze()
    })
    .await
    .map_err(|e| format!("Task failed: {e}"))?;

    if let Ok(snapshot) = state.snapshot() {
        if let Err(e) = app.emit(FLOW_EVENT, &snapshot) {
            tracing::warn!(error = %e, "Failed to emit flow snapshot");
        }
    }
    outcome.map_err(ipc_error)
}

/// "Nueva Consulta".
#[tauri::command]
pub fn reset_consultation(state: State<'_, Arc<CoreState>>) -> Result<FlowSnapshot, String> {
    let mut flow = state.lock_flow().map_err(ipc_error)?;
    flow.reset().map_err(|e| ipc_error(e.into()))?;
    tracing::info!("Consultation reset");
    Ok(flow.snapshot())
}

#[tauri::command]
pub fn dismiss_notice(state: State<'_, Arc<CoreState>>) -> Result<FlowSnapshot, String> {
    let mut flow = state.lock_flow().map_err(ipc_error)?;
    flow.dismiss_notice();
    Ok(flow.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_without_permission_is_denied() {
        assert_eq!(
            capture_outcome(Some("data:image/jpeg;base64,QUJD".into()), false),
            SelectionOutcome::PermissionDenied
        );
    }

    #[test]
    fn closed_camera_is_cancelled() {
        assert_eq!(capture_outcome(None, true), SelectionOutcome::Cancelled);
        assert_eq!(capture_outcome(Some("  ".into()), true), SelectionOutcome::Cancelled);
    }

    #[test]
    fn captured_photo_kept_as_encoded() {
        let uri = "data:image/jpeg;base64,QUJD".to_string();
        assert_eq!(
            capture_outcome(Some(uri.clone()), true),
            SelectionOutcome::Picked(vec![ImageRef::Encoded(uri)])
        );
    }
}
