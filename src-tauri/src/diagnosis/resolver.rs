//! Maps the model's free-text reply onto a displayable diagnosis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recommendations::Condition;

/// Shown above every result.
pub const DISCLAIMER_SHORT: &str =
    "Este análisis es orientativo, no reemplaza la consulta médica";

/// Shown below every result.
pub const DISCLAIMER_RESULT: &str = "IMPORTANTE: Este diagnóstico es orientativo. \
Siempre consulta con un dermatólogo profesional para un diagnóstico definitivo y tratamiento adecuado.";

/// A resolved diagnosis: the recommendation record merged with the label.
///
/// Always fully populated. Unrecognized labels carry the fallback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    /// Normalized label, shown even when the table has no entry for it.
    pub condition: String,
    pub description: String,
    pub medications: Vec<String>,
    pub advice: String,
    /// Whether the label matched a curated record.
    pub recognized: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl DiagnosisResult {
    /// Heading for the result card.
    pub fn display_heading(&self) -> String {
        self.condition.to_uppercase()
    }

    /// Plain-text rendering of the result card.
    pub fn to_display_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Diagnóstico\n");
        out.push_str(&self.display_heading());
        out.push_str("\n\nDescripción:\n");
        out.push_str(&self.description);
        out.push_str("\n\nTratamientos recomendados:\n");
        for medication in &self.medications {
            out.push_str("• ");
            out.push_str(medication);
            out.push('\n');
        }
        out.push_str("\nConsejos:\n");
        out.push_str(&self.advice);
        out.push_str("\n\n");
        out.push_str(DISCLAIMER_RESULT);
        out
    }
}

/// Lowercase and trim. Idempotent.
pub fn normalize_label(raw: &str) -> String {
    raw.to_lowercase().trim().to_string()
}

/// Resolve a raw reply into a diagnosis, stamping the current time.
pub fn resolve_diagnosis(raw_reply: &str) -> DiagnosisResult {
    resolve_diagnosis_at(raw_reply, Utc::now())
}

/// Resolve with an explicit timestamp.
pub fn resolve_diagnosis_at(raw_reply: &str, analyzed_at: DateTime<Utc>) -> DiagnosisResult {
    let label = normalize_label(raw_reply);
    let condition = Condition::from_normalized(&label);
    let record = condition.record();

    if !condition.is_recognized() {
        tracing::debug!(label = %label, "Reply not in recommendation table, using fallback");
    }

    DiagnosisResult {
        condition: label,
        description: record.description.to_string(),
        medications: record.medications.iter().map(|m| m.to_string()).collect(),
        advice: record.advice.to_string(),
        recognized: condition.is_recognized(),
        analyzed_at,
    }
}
