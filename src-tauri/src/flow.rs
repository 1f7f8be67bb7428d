//! UI flow controller: which section of the consultation screen is shown and
//! which actions are available.
//!
//! ```text
//! Idle ──begin_selection──▶ Selecting ──complete_selection(Picked ok)──▶ ReadyOrForm
//!   ▲                          │ cancelled / denied / rejected                │
//!   │                          ▼                                             begin_analysis
//!   │                     prior state                                         ▼
//!   └──────── reset ◀── Result ◀──finish_analysis(Ok)── Analyzing ──finish_analysis(Err)──▶ ReadyOrForm
//! ```
//!
//! Transitions are synchronous. The only slow work (encoding + inference)
//! happens between `begin_analysis` and `finish_analysis`, outside any lock.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DiagnosisConfig;
use crate::diagnosis::{
    AnalysisMode, AnalysisRequest, DiagnosisError, DiagnosisResult, ImageRef, PatientContext,
    DISCLAIMER_SHORT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// No image held.
    Idle,
    /// Picker or camera dialog open.
    Selecting,
    /// Images held; form shown in multi-image mode.
    ReadyOrForm,
    /// Inference request in flight. Not cancellable.
    Analyzing,
    /// Diagnosis displayed.
    Result,
}

/// What the picker or camera returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Cancelled,
    PermissionDenied,
    Failed(String),
    Picked(Vec<ImageRef>),
}

/// Modal notice for the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("Action '{action}' is not available while {state:?}")]
    InvalidTransition { action: &'static str, state: FlowState },

    #[error("Complete the patient information form before analyzing")]
    FormIncomplete,

    #[error(transparent)]
    Rejected(#[from] DiagnosisError),
}

impl FlowError {
    /// Message for the modal notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidTransition { .. } => "Esta acción no está disponible ahora.".to_string(),
            Self::FormIncomplete => {
                "Completa la información para enriquecer el análisis.".to_string()
            }
            Self::Rejected(err) => err.user_message(),
        }
    }
}

/// Serializable view of the controller for the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub mode: AnalysisMode,
    pub state: FlowState,
    pub image_count: usize,
    /// Human-readable image descriptions (paths for picked files).
    pub images: Vec<String>,
    pub context: PatientContext,
    pub form_visible: bool,
    pub form_complete: bool,
    pub can_select: bool,
    pub can_analyze: bool,
    pub can_reset: bool,
    pub is_loading: bool,
    pub diagnosis: Option<DiagnosisResult>,
    /// Uppercased condition for the result card heading.
    pub result_heading: Option<String>,
    /// Whole result card as plain text, for copy/share.
    pub result_text: Option<String>,
    pub notice: Option<Notice>,
    pub selection_hint: &'static str,
    pub disclaimer: &'static str,
}

/// The consultation state machine. One per app.
#[derive(Debug)]
pub struct FlowController {
    mode: AnalysisMode,
    state: FlowState,
    /// State to return to when a selection is cancelled or rejected.
    return_state: FlowState,
    images: Vec<ImageRef>,
    context: PatientContext,
    form_complete: bool,
    diagnosis: Option<DiagnosisResult>,
    notice: Option<Notice>,
}

impl FlowController {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            mode,
            state: FlowState::Idle,
            return_state: FlowState::Idle,
            images: Vec::new(),
            context: PatientContext::default(),
            form_complete: false,
            diagnosis: None,
            notice: None,
        }
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn context(&self) -> &PatientContext {
        &self.context
    }

    pub fn diagnosis(&self) -> Option<&DiagnosisResult> {
        self.diagnosis.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    fn invalid(&self, action: &'static str) -> FlowError {
        FlowError::InvalidTransition {
            action,
            state: self.state,
        }
    }

    /// Record the notice for a rejected action and hand the error back.
    fn reject(&mut self, err: FlowError) -> FlowError {
        tracing::debug!(state = ?self.state, error = %err, "Flow action rejected");
        self.notice = Some(Notice::error(err.user_message()));
        err
    }

    /// Switch between single- and multi-image flows. Only while idle.
    pub fn set_mode(&mut self, mode: AnalysisMode) -> Result<(), FlowError> {
        if self.state != FlowState::Idle {
            return Err(self.invalid("set_mode"));
        }
        self.mode = mode;
        Ok(())
    }

    /// Open the picker. Allowed from `Idle`, or from `ReadyOrForm` to
    /// replace the current selection.
    pub fn begin_selection(&mut self) -> Result<(), FlowError> {
        match self.state {
            FlowState::Idle | FlowState::ReadyOrForm => {
                self.return_state = self.state;
                self.state = FlowState::Selecting;
                self.notice = None;
                Ok(())
            }
            _ => Err(self.invalid("begin_selection")),
        }
    }

    /// Apply the picker result.
    ///
    /// The image count is validated here, so a bad selection never reaches
    /// `ReadyOrForm`. Non-image files are rejected the same way.
    pub fn complete_selection(&mut self, outcome: SelectionOutcome) -> Result<(), FlowError> {
        if self.state != FlowState::Selecting {
            return Err(self.invalid("complete_selection"));
        }
        let previous = self.return_state;

        let images = match outcome {
            SelectionOutcome::Cancelled => {
                self.state = previous;
                return Ok(());
            }
            SelectionOutcome::PermissionDenied => {
                self.state = previous;
                let err = DiagnosisError::PermissionDenied("picker access refused".into());
                return Err(self.reject(err.into()));
            }
            SelectionOutcome::Failed(detail) => {
                self.state = previous;
                let err = DiagnosisError::Selection(format!(
                    "No se pudo seleccionar las imágenes: {detail}"
                ));
                return Err(self.reject(err.into()));
            }
            SelectionOutcome::Picked(images) => images,
        };

        if !self.mode.accepts_count(images.len()) {
            self.state = previous;
            let err = DiagnosisError::Selection(self.mode.count_violation_message().to_string());
            return Err(self.reject(err.into()));
        }
        if let Some(bad) = images.iter().find(|img| !looks_like_image(img)) {
            self.state = previous;
            let err = DiagnosisError::Selection(format!(
                "El archivo {} no es una imagen.",
                bad.describe()
            ));
            return Err(self.reject(err.into()));
        }

        tracing::info!(count = images.len(), mode = ?self.mode, "Images selected");
        self.images = images;
        self.form_complete = false;
        self.diagnosis = None;
        self.notice = None;
        self.state = FlowState::ReadyOrForm;
        Ok(())
    }

    /// Replace the context fields while the form is shown.
    pub fn update_context(&mut self, context: PatientContext) -> Result<(), FlowError> {
        if self.state != FlowState::ReadyOrForm || !self.mode.requires_form() {
            return Err(self.invalid("update_context"));
        }
        self.context = context;
        Ok(())
    }

    /// Store the context and mark the form complete. Fields may be empty.
    pub fn submit_context(&mut self, context: PatientContext) -> Result<(), FlowError> {
        self.update_context(context)?;
        self.form_complete = true;
        Ok(())
    }

    pub fn form_visible(&self) -> bool {
        self.mode.requires_form() && self.state == FlowState::ReadyOrForm
    }

    /// Whether the analyze action is enabled.
    pub fn can_analyze(&self) -> bool {
        self.state == FlowState::ReadyOrForm
            && (!self.mode.requires_form() || self.form_complete)
    }

    pub fn can_reset(&self) -> bool {
        matches!(
            self.state,
            FlowState::Idle | FlowState::ReadyOrForm | FlowState::Result
        )
    }

    /// Validation gate, then move to `Analyzing`.
    ///
    /// Returns the request snapshot to run through the pipeline. On any
    /// violation the state is unchanged and a notice is set.
    pub fn begin_analysis(
        &mut self,
        config: &DiagnosisConfig,
    ) -> Result<AnalysisRequest, FlowError> {
        if self.state != FlowState::ReadyOrForm {
            return Err(self.invalid("begin_analysis"));
        }
        if !self.mode.accepts_count(self.images.len()) {
            let err = DiagnosisError::Selection(match self.mode {
                AnalysisMode::Multi => {
                    "Por favor selecciona entre 3 y 5 imágenes primero".to_string()
                }
                AnalysisMode::Single => "Por favor selecciona una imagen primero".to_string(),
            });
            return Err(self.reject(err.into()));
        }
        if !config.has_usable_api_key() {
            let err = DiagnosisError::Configuration("API key unset or placeholder".into());
            return Err(self.reject(err.into()));
        }
        if self.mode.requires_form() && !self.form_complete {
            return Err(self.reject(FlowError::FormIncomplete));
        }

        self.state = FlowState::Analyzing;
        self.notice = None;
        self.diagnosis = None;
        Ok(AnalysisRequest::new(
            self.mode,
            self.images.clone(),
            self.context.clone(),
        ))
    }

    /// Settle an in-flight analysis.
    ///
    /// Success shows the result. Failure returns to the form with images and
    /// context intact and a notice set.
    pub fn finish_analysis(
        &mut self,
        outcome: Result<DiagnosisResult, DiagnosisError>,
    ) -> Result<&DiagnosisResult, FlowError> {
        if self.state != FlowState::Analyzing {
            return Err(self.invalid("finish_analysis"));
        }
        match outcome {
            Ok(result) => {
                self.state = FlowState::Result;
                Ok(self.diagnosis.insert(result))
            }
            Err(err) => {
                self.state = FlowState::ReadyOrForm;
                Err(self.reject(err.into()))
            }
        }
    }

    /// New consultation: drop images, context, result and notice.
    pub fn reset(&mut self) -> Result<(), FlowError> {
        if !self.can_reset() {
            return Err(self.invalid("reset"));
        }
        self.images.clear();
        self.context = PatientContext::default();
        self.form_complete = false;
        self.diagnosis = None;
        self.notice = None;
        self.return_state = FlowState::Idle;
        self.state = FlowState::Idle;
        Ok(())
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            mode: self.mode,
            state: self.state,
            image_count: self.images.len(),
            images: self.images.iter().map(ImageRef::describe).collect(),
            context: self.context.clone(),
            form_visible: self.form_visible(),
            form_complete: self.form_complete,
            can_select: matches!(self.state, FlowState::Idle | FlowState::ReadyOrForm),
            can_analyze: self.can_analyze(),
            can_reset: self.can_reset(),
            is_loading: self.state == FlowState::Analyzing,
            diagnosis: self.diagnosis.clone(),
            result_heading: self.diagnosis.as_ref().map(DiagnosisResult::display_heading),
            result_text: self.diagnosis.as_ref().map(DiagnosisResult::to_display_text),
            notice: self.notice.clone(),
            selection_hint: self.mode.selection_hint(),
            disclaimer: DISCLAIMER_SHORT,
        }
    }
}

/// Paths must carry an image extension when they carry one at all;
/// extensionless URIs and in-memory images pass.
fn looks_like_image(image: &ImageRef) -> bool {
    match image {
        ImageRef::Path(path) => match mime_guess::from_path(path).first() {
            Some(mime) => mime.type_() == mime_guess::mime::IMAGE,
            None => true,
        },
        ImageRef::Bytes(_) | ImageRef::Encoded(_) => true,
    }
}
