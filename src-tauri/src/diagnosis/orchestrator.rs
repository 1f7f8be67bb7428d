//! One analysis: encode images → build prompt → one inference round trip →
//! resolve the reply.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::encoder::{ImageEncoder, ImageRef};
use super::prompt::{build_prompt, AnalysisMode, PatientContext};
use super::resolver::{resolve_diagnosis, DiagnosisResult};
use super::{DiagnosisError, InferenceClient};

/// Snapshot of everything needed for one analysis, taken when the flow
/// controller enters `Analyzing`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub request_id: Uuid,
    pub mode: AnalysisMode,
    pub images: Vec<ImageRef>,
    pub context: PatientContext,
}

impl AnalysisRequest {
    pub fn new(mode: AnalysisMode, images: Vec<ImageRef>, context: PatientContext) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            mode,
            images,
            context,
        }
    }
}

pub struct DiagnosisPipeline {
    encoder: ImageEncoder,
    client: Arc<dyn InferenceClient>,
    sanitize_context: bool,
}

impl DiagnosisPipeline {
    pub fn new(encoder: ImageEncoder, client: Arc<dyn InferenceClient>) -> Self {
        Self {
            encoder,
            client,
            sanitize_context: false,
        }
    }

    /// Fold and cap patient-context fields before they reach the prompt.
    pub fn with_context_sanitization(mut self, enabled: bool) -> Self {
        self.sanitize_context = enabled;
        self
    }

    /// Run one analysis end to end. Blocking; call off the UI thread.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<DiagnosisResult, DiagnosisError> {
        let _span = tracing::info_span!(
            "diagnosis_analyze",
            request_id = %request.request_id,
            mode = ?request.mode,
            images = request.images.len(),
            model = %self.client.model(),
            context_provided = !request.context.is_empty(),
        )
        .entered();
        let start = std::time::Instant::now();

        if !request.mode.accepts_count(request.images.len()) {
            return Err(DiagnosisError::Selection(
                request.mode.count_violation_message().to_string(),
            ));
        }

        let encoded = self.encoder.encode_all(&request.images)?;
        let prompt = if self.sanitize_context {
            build_prompt(request.mode, Some(&request.context.sanitized()))
        } else {
            build_prompt(request.mode, Some(&request.context))
        };

        let reply = self.client.generate(&prompt, &encoded).inspect_err(|e| {
            tracing::error!(error = %e, "Diagnosis inference failed");
        })?;

        let result = resolve_diagnosis(&reply);
        tracing::info!(
            condition = %result.condition,
            recognized = result.recognized,
            elapsed_ms = %start.elapsed().as_millis(),
            "Diagnosis resolved"
        );
        Ok(result)
    }
}
