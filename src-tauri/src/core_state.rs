//! Application state shared by every IPC command.
//!
//! `CoreState` owns the configuration, the flow controller and the
//! diagnosis pipeline. The flow lock is held only for transitions; the
//! analysis round trip runs with the lock released so snapshots stay
//! readable while a request is in flight.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DiagnosisConfig;
use crate::diagnosis::{
    DiagnosisError, DiagnosisPipeline, DiagnosisResult, GeminiClient, ImageEncoder,
    InferenceClient,
};
use crate::flow::{FlowController, FlowError, FlowSnapshot, SelectionOutcome};

pub struct CoreState {
    config: DiagnosisConfig,
    flow: Mutex<FlowController>,
    pipeline: DiagnosisPipeline,
}

impl CoreState {
    /// Build state backed by the Gemini client.
    ///
    /// Must be called outside an async runtime: the blocking HTTP client
    /// owns its own runtime.
    pub fn new(config: DiagnosisConfig) -> Result<Self, CoreError> {
        let client = GeminiClient::new(&config)?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Build state around any inference client.
    pub fn with_client(config: DiagnosisConfig, client: Arc<dyn InferenceClient>) -> Self {
        let encoder = ImageEncoder::from_config(&config);
        Self {
            flow: Mutex::new(FlowController::new(config.mode)),
            pipeline: DiagnosisPipeline::new(encoder, client)
                .with_context_sanitization(config.sanitize_context),
            config,
        }
    }

    pub fn config(&self) -> &DiagnosisConfig {
        &self.config
    }

    /// Lock the flow controller for a transition.
    pub fn lock_flow(&self) -> Result<MutexGuard<'_, FlowController>, CoreError> {
        self.flow.lock().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn snapshot(&self) -> Result<FlowSnapshot, CoreError> {
        Ok(self.lock_flow()?.snapshot())
    }

    /// Run `begin_selection`, the picker, then `complete_selection`.
    ///
    /// The picker runs with the lock released.
    pub fn select_with<F>(&self, pick: F) -> Result<FlowSnapshot, CoreError>
    where
        F: FnOnce() -> SelectionOutcome,
    {
        self.lock_flow()?.begin_selection()?;
        let outcome = pick();
        let mut flow = self.lock_flow()?;
        flow.complete_selection(outcome)?;
        Ok(flow.snapshot())
    }

    /// Validate, run the pipeline, settle the flow.
    ///
    /// Blocking. Errors leave the flow in `ReadyOrForm` with a notice set;
    /// a panic inside the pipeline is settled the same way.
    pub fn analyze(&self) -> Result<DiagnosisResult, CoreError> {
        let request = self.lock_flow()?.begin_analysis(&self.config)?;
        tracing::info!(
            request_id = %request.request_id,
            images = request.images.len(),
            "Analysis started"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.pipeline.analyze(&request)))
            .unwrap_or_else(|_| {
                tracing::error!(request_id = %request.request_id, "Analysis panicked");
                Err(DiagnosisError::Inference("analysis aborted".into()))
            });

        let mut flow = self.lock_flow()?;
        let shown = flow.finish_analysis(outcome)?;
        Ok(shown.clone())
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("Could not start the inference client: {0}")]
    Client(#[from] DiagnosisError),
}

impl CoreError {
    /// Text for the frontend notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::LockPoisoned => "Error interno. Reinicia la aplicación.".to_string(),
            Self::Flow(err) => err.user_message(),
            Self::Client(err) => err.user_message(),
        }
    }
}
