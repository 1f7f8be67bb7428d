pub mod config;
pub mod core_state;
pub mod diagnosis; // Encoding, prompt, Gemini client, recommendation table
pub mod flow; // Consultation screen state machine

#[cfg(feature = "desktop")]
pub mod commands;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tracing_subscriber::EnvFilter;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let (settings, problems) = config::DiagnosisConfig::load();
    for problem in &problems {
        tracing::warn!(error = %problem, "Ignoring invalid setting, default kept");
    }
    if !settings.has_usable_api_key() {
        tracing::warn!("Gemini API key not configured; analysis will be refused");
    }
    tracing::debug!(?settings, "Settings loaded");

    // Built before the async runtime starts (blocking HTTP client).
    let state = core_state::CoreState::new(settings).expect("failed to initialise app state");

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .manage(Arc::new(state))
        .invoke_handler(tauri::generate_handler![
            commands::health_check,
            commands::get_app_info,
            commands::diagnosis::get_flow_state,
            commands::diagnosis::set_analysis_mode,
            commands::diagnosis::pick_images,
            commands::diagnosis::complete_capture,
            commands::diagnosis::update_patient_context,
            commands::diagnosis::submit_patient_context,
            commands::diagnosis::analyze_images,
            commands::diagnosis::reset_consultation,
            commands::diagnosis::dismiss_notice,
        ])
        .run(tauri::generate_context!())
        .expect("error while running DermaDiagnostic");
}
