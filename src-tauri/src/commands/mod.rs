pub mod diagnosis;

use std::sync::Arc;

use tauri::State;

use crate::config;
use crate::core_state::CoreState;
use crate::diagnosis::DISCLAIMER_RESULT;

/// Liveness check for the frontend.
#[tauri::command]
pub fn health_check() -> String {
    tracing::debug!("Health check called");
    "ok".to_string()
}

/// Static facts the frontend shows in its header and settings banner.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub model: String,
    /// False while the key is unset or still the placeholder.
    pub api_key_configured: bool,
    pub settings_path: String,
    pub disclaimer: &'static str,
}

#[tauri::command]
pub fn get_app_info(state: State<'_, Arc<CoreState>>) -> AppInfo {
    let settings = state.config();
    AppInfo {
        name: config::APP_NAME,
        version: config::APP_VERSION,
        model: settings.model.clone(),
        api_key_configured: settings.has_usable_api_key(),
        settings_path: config::settings_path().display().to_string(),
        disclaimer: DISCLAIMER_RESULT,
    }
}
