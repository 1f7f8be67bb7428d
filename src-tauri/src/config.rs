use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnosis::AnalysisMode;

/// Application-level constants
pub const APP_NAME: &str = "DermaDiagnostic";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Literal shipped in the sample settings. A key equal to this is treated as unset.
pub const API_KEY_PLACEHOLDER: &str = "TU_API_KEY_DE_GEMINI_AQUI";

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_QUALITY: f32 = 0.8;
pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 1024;
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 30_000;

/// Smallest accepted `max_image_size`. Below this the model sees mush.
const MIN_IMAGE_DIMENSION: u32 = 64;

const SETTINGS_FILE: &str = "settings.json";

/// Model ids end up in the request path: letters, digits, `.`, `-`, `_` only.
static MODEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").unwrap());

/// Tracing filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,derma_lib=debug"
}

/// Get the application data directory
/// ~/DermaDiagnostic/ on all platforms. Falls back to the working directory
/// when no home directory can be determined (sandboxed mobile targets).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Optional JSON settings file read by [`DiagnosisConfig::load`].
pub fn settings_path() -> PathBuf {
    app_data_dir().join(SETTINGS_FILE)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Everything the diagnosis pipeline needs from the outside world.
///
/// Built once at startup and handed to the inference client and the flow
/// controller. Nothing reads configuration ambiently.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    /// Gemini API key. Empty means unset.
    pub api_key: String,
    /// Model identifier, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// Scheme + host of the Generative Language API.
    pub api_base_url: String,
    /// JPEG quality factor in (0, 1] used when re-encoding images.
    pub image_quality: f32,
    /// Longest edge, in pixels, of images sent to the model.
    pub max_image_size: u32,
    /// Hard deadline for one inference round trip.
    pub analysis_timeout_ms: u64,
    /// Re-encode images as JPEG before upload (false sends raw bytes).
    pub recompress_images: bool,
    /// Which entry flow the controller starts in.
    pub mode: AnalysisMode,
    /// Fold line breaks and cap patient-context fields before prompting.
    /// Off by default: the form text reaches the model verbatim.
    pub sanitize_context: bool,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            image_quality: DEFAULT_IMAGE_QUALITY,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            analysis_timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
            recompress_images: true,
            mode: AnalysisMode::Multi,
            sanitize_context: false,
        }
    }
}

// The API key must never reach logs, so Debug is written by hand.
impl std::fmt::Debug for DiagnosisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("image_quality", &self.image_quality)
            .field("max_image_size", &self.max_image_size)
            .field("analysis_timeout_ms", &self.analysis_timeout_ms)
            .field("recompress_images", &self.recompress_images)
            .field("mode", &self.mode)
            .field("sanitize_context", &self.sanitize_context)
            .finish()
    }
}

impl DiagnosisConfig {
    /// Load configuration: defaults, then `~/DermaDiagnostic/settings.json`
    /// if present, then environment variables.
    ///
    /// Never fails: each bad source or value is reported and replaced by its
    /// default. Valid values, the API key included, are kept.
    pub fn load() -> (Self, Vec<ConfigError>) {
        Self::load_from(&settings_path(), |key| std::env::var(key).ok())
    }

    /// [`Self::load`] against an explicit file and environment lookup.
    pub fn load_from<F>(path: &Path, lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();
        let mut config = if path.exists() {
            Self::from_file(path).unwrap_or_else(|e| {
                problems.push(e);
                Self::default()
            })
        } else {
            Self::default()
        };
        problems.extend(config.apply_env(lookup));
        problems.extend(config.repair());
        (config, problems)
    }

    /// Read a settings file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values from an environment lookup.
    ///
    /// Recognized: `GEMINI_API_KEY`, `DERMA_MODEL`, `DERMA_API_BASE_URL`,
    /// `DERMA_TIMEOUT_MS`, `DERMA_MODE` (`single` | `multi`),
    /// `DERMA_SANITIZE_CONTEXT` (`true` | `false`). Unparseable values are
    /// skipped and returned; the other keys still apply.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.api_key = key.trim().to_string();
        }
        if let Some(model) = lookup("DERMA_MODEL") {
            self.model = model.trim().to_string();
        }
        if let Some(url) = lookup("DERMA_API_BASE_URL") {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup("DERMA_TIMEOUT_MS") {
            match raw.trim().parse() {
                Ok(ms) => self.analysis_timeout_ms = ms,
                Err(_) => problems.push(ConfigError::InvalidValue {
                    key: "DERMA_TIMEOUT_MS",
                    value: raw,
                }),
            }
        }
        if let Some(raw) = lookup("DERMA_MODE") {
            match raw.trim().to_lowercase().as_str() {
                "single" => self.mode = AnalysisMode::Single,
                "multi" => self.mode = AnalysisMode::Multi,
                _ => problems.push(ConfigError::InvalidValue {
                    key: "DERMA_MODE",
                    value: raw,
                }),
            }
        }
        if let Some(raw) = lookup("DERMA_SANITIZE_CONTEXT") {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" => self.sanitize_context = true,
                "0" | "false" => self.sanitize_context = false,
                _ => problems.push(ConfigError::InvalidValue {
                    key: "DERMA_SANITIZE_CONTEXT",
                    value: raw,
                }),
            }
        }
        problems
    }

    /// Reset every out-of-range field to its default and report it.
    pub fn repair(&mut self) -> Vec<ConfigError> {
        let defaults = Self::default();
        let mut problems = Vec::new();
        if !(self.image_quality > 0.0 && self.image_quality <= 1.0) {
            problems.push(ConfigError::InvalidValue {
                key: "image_quality",
                value: self.image_quality.to_string(),
            });
            self.image_quality = defaults.image_quality;
        }
        if self.max_image_size < MIN_IMAGE_DIMENSION {
            problems.push(ConfigError::InvalidValue {
                key: "max_image_size",
                value: self.max_image_size.to_string(),
            });
            self.max_image_size = defaults.max_image_size;
        }
        if self.analysis_timeout_ms == 0 {
            problems.push(ConfigError::InvalidValue {
                key: "analysis_timeout_ms",
                value: "0".to_string(),
            });
            self.analysis_timeout_ms = defaults.analysis_timeout_ms;
        }
        if !MODEL_NAME.is_match(self.model.trim()) {
            problems.push(ConfigError::InvalidValue {
                key: "model",
                value: self.model.clone(),
            });
            self.model = defaults.model;
        }
        problems
    }

    /// Range checks for the numeric settings and the model id.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.clone().repair().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// True when a real key is configured (non-empty, not the placeholder).
    pub fn has_usable_api_key(&self) -> bool {
        is_usable_api_key(&self.api_key)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.analysis_timeout_ms)
    }
}

/// Placeholder check shared by the flow gate and the inference client.
pub fn is_usable_api_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != API_KEY_PLACEHOLDER
}
