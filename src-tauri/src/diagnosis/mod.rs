//! Diagnosis-request pipeline: image encoding, prompt construction, remote
//! inference and mapping of the reply onto a recommendation record.

pub mod recommendations;
pub mod resolver;
pub mod encoder;
pub mod prompt;
pub mod gemini;
pub mod gemini_types;
pub mod orchestrator;

pub use recommendations::*;
pub use resolver::*;
pub use encoder::*;
pub use prompt::*;
pub use gemini::*;
pub use orchestrator::*;

use thiserror::Error;

/// Everything that can go wrong between picking photos and showing a result.
///
/// All variants are recoverable: the caller turns them into a modal notice
/// and the flow controller stays where it was (or returns to the form).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosisError {
    #[error("Camera or gallery access was refused: {0}")]
    PermissionDenied(String),

    #[error("Image selection failed: {0}")]
    Selection(String),

    #[error("Image encoding failed: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Inference request failed: {0}")]
    Inference(String),
}

impl DiagnosisError {
    /// Short Spanish message for the modal notice shown to the patient.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => {
                "Se necesitan permisos para acceder a la cámara o a la galería.".to_string()
            }
            Self::Selection(detail) => detail.clone(),
            Self::Encoding(_) => "Error al convertir imagen.".to_string(),
            Self::Configuration(_) => {
                "Por favor configura tu API key de Gemini en la configuración.".to_string()
            }
            Self::Inference(_) => {
                "No se pudo analizar las imágenes. Verifica tu conexión y API key.".to_string()
            }
        }
    }
}
