//! Static recommendation table keyed by condition label.
//!
//! Labels are stored normalized (lowercase, trimmed) with the diacritics the
//! model is asked to produce, e.g. `acné`. Records never change at runtime.

use serde::{Deserialize, Serialize};

/// Description, treatments and advice shown for one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationRecord {
    pub description: &'static str,
    pub medications: &'static [&'static str],
    pub advice: &'static str,
}

/// Conditions that have a curated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownCondition {
    Acne,
    HerpesZoster,
    Dermatitis,
    Psoriasis,
    Melanoma,
    Eczema,
}

impl KnownCondition {
    pub const ALL: [KnownCondition; 6] = [
        KnownCondition::Acne,
        KnownCondition::HerpesZoster,
        KnownCondition::Dermatitis,
        KnownCondition::Psoriasis,
        KnownCondition::Melanoma,
        KnownCondition::Eczema,
    ];

    /// Normalized lookup label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Acne => "acné",
            Self::HerpesZoster => "herpes zoster",
            Self::Dermatitis => "dermatitis",
            Self::Psoriasis => "psoriasis",
            Self::Melanoma => "melanoma",
            Self::Eczema => "eczema",
        }
    }

    pub fn record(self) -> &'static RecommendationRecord {
        match self {
            Self::Acne => &ACNE,
            Self::HerpesZoster => &HERPES_ZOSTER,
            Self::Dermatitis => &DERMATITIS,
            Self::Psoriasis => &PSORIASIS,
            Self::Melanoma => &MELANOMA,
            Self::Eczema => &ECZEMA,
        }
    }

    /// Exact match against an already-normalized label.
    pub fn from_normalized(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

/// Condition identity derived from the model's reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Known(KnownCondition),
    /// Anything the table has no record for, including the model's
    /// explicit "condición no identificada". Holds the normalized label.
    Unrecognized(String),
}

impl Condition {
    /// Map an already-normalized label to a condition.
    pub fn from_normalized(label: &str) -> Self {
        match KnownCondition::from_normalized(label) {
            Some(known) => Self::Known(known),
            None => Self::Unrecognized(label.to_string()),
        }
    }

    /// Label to display: the table label, or the model's text verbatim.
    pub fn label(&self) -> &str {
        match self {
            Self::Known(known) => known.label(),
            Self::Unrecognized(label) => label,
        }
    }

    pub fn record(&self) -> &'static RecommendationRecord {
        match self {
            Self::Known(known) => known.record(),
            Self::Unrecognized(_) => &FALLBACK,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Reply the model is told to give when nothing matches.
pub const NOT_IDENTIFIED_LABEL: &str = "condición no identificada";

pub static FALLBACK: RecommendationRecord = RecommendationRecord {
    description: "Condición no identificada en nuestra base de datos",
    medications: &["Consulta con un dermatólogo"],
    advice: "Se recomienda evaluación médica profesional para un diagnóstico preciso",
};

static ACNE: RecommendationRecord = RecommendationRecord {
    description: "Condición común de la piel caracterizada por poros obstruidos",
    medications: &["Peróxido de benzoilo", "Ácido salicílico", "Tretinoína"],
    advice: "Mantén la piel limpia, evita tocar las lesiones y usa productos no comedogénicos",
};

static HERPES_ZOSTER: RecommendationRecord = RecommendationRecord {
    description: "Infección viral que causa una erupción dolorosa",
    medications: &["Aciclovir", "Valaciclovir", "Famciclovir"],
    advice: "Consulta inmediatamente con un médico. El tratamiento temprano es crucial.",
};

static DERMATITIS: RecommendationRecord = RecommendationRecord {
    description: "Inflamación de la piel que puede ser alérgica o de contacto",
    medications: &["Cremas con corticosteroides", "Antihistamínicos", "Emolientes"],
    advice: "Identifica y evita los desencadenantes, mantén la piel hidratada",
};

static PSORIASIS: RecommendationRecord = RecommendationRecord {
    description: "Enfermedad autoinmune que acelera el ciclo de vida de las células de la piel",
    medications: &[
        "Corticosteroides tópicos",
        "Análogos de vitamina D",
        "Metotrexato",
    ],
    advice: "Evita el estrés, mantén la piel hidratada y considera tratamientos con luz UV",
};

static MELANOMA: RecommendationRecord = RecommendationRecord {
    description: "Tipo de cáncer de piel que se desarrolla en los melanocitos",
    medications: &["Requiere evaluación médica inmediata"],
    advice: "¡URGENTE! Consulta inmediatamente con un dermatólogo oncólogo",
};

static ECZEMA: RecommendationRecord = RecommendationRecord {
    description: "Condición que hace que la piel se inflame, pique y se enrojezca",
    medications: &[
        "Cremas con corticosteroides",
        "Inhibidores de calcineurina",
        "Emolientes",
    ],
    advice: "Evita irritantes, usa jabones suaves y mantén la piel bien hidratada",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_condition_has_a_distinct_label() {
        let mut labels: Vec<_> = KnownCondition::ALL.iter().map(|c| c.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), KnownCondition::ALL.len());
    }

    #[test]
    fn labels_are_stored_normalized() {
        for condition in KnownCondition::ALL {
            let label = condition.label();
            assert_eq!(label, label.trim());
            assert_eq!(label, label.to_lowercase());
        }
    }

    #[test]
    fn every_record_is_fully_populated() {
        for condition in KnownCondition::ALL {
            let record = condition.record();
            assert!(!record.description.is_empty(), "{condition:?}");
            assert!(!record.medications.is_empty(), "{condition:?}");
            assert!(!record.advice.is_empty(), "{condition:?}");
        }
    }

    #[test]
    fn acne_with_accent_has_record() {
        let record = KnownCondition::from_normalized("acné").unwrap().record();
        assert_eq!(record.medications.len(), 3);
        assert_eq!(record.medications[0], "Peróxido de benzoilo");
    }

    #[test]
    fn known_condition_requires_exact_label() {
        for label in ["acne", "Acné", " acné", "rosácea"] {
            assert!(KnownCondition::from_normalized(label).is_none(), "{label}");
        }
    }

    #[test]
    fn melanoma_record_is_urgent() {
        let record = KnownCondition::Melanoma.record();
        assert!(record.advice.starts_with("¡URGENTE!"));
    }

    #[test]
    fn not_identified_label_maps_to_fallback() {
        let condition = Condition::from_normalized(NOT_IDENTIFIED_LABEL);
        assert!(!condition.is_recognized());
        assert_eq!(condition.label(), NOT_IDENTIFIED_LABEL);
        assert_eq!(condition.record(), &FALLBACK);
    }

    #[test]
    fn known_condition_round_trips_through_condition() {
        for known in KnownCondition::ALL {
            let condition = Condition::from_normalized(known.label());
            assert_eq!(condition, Condition::Known(known));
            assert_eq!(condition.record(), known.record());
        }
    }
}
