//! Gemini `generateContent` request/response types.
//!
//! Only the subset of the Generative Language API this app touches:
//! one user turn with text + inline images, and the candidate text back.

use serde::{Deserialize, Serialize};

/// MIME type attached to every inline image.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Most images a single request may carry.
pub const MAX_IMAGES_PER_REQUEST: usize = 5;

// ──────────────────────────────────────────────
// Request
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// One user turn: prompt text first, then each image in order.
    pub fn with_images(prompt: &str, images_base64: &[String]) -> Self {
        let mut parts = Vec::with_capacity(images_base64.len() + 1);
        parts.push(Part::text(prompt));
        parts.extend(images_base64.iter().map(|data| Part::inline_jpeg(data)));

        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig::label_only()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part. Exactly one of the fields is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    pub fn inline_jpeg(data: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: IMAGE_MIME_TYPE.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 payload without any data-URI prefix.
    pub data: String,
}

/// Sampling settings for a one-label answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    /// Near-deterministic, short output.
    pub fn label_only() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 64,
        }
    }
}

// ──────────────────────────────────────────────
// Response
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    ///
    /// `None` when there is no candidate or it carries no text part.
    pub fn reply_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let texts: Vec<&str> = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    /// Why the prompt was blocked, if it was.
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// Best human-readable message from an error body, falling back to the raw text.
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            if envelope.error.status.is_empty() {
                envelope.error.message
            } else {
                format!("{} ({})", envelope.error.message, envelope.error.status)
            }
        }
        _ => body.trim().chars().take(300).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_camel_case_inline_data() {
        let req = GenerateContentRequest::with_images("prompt", &["QUJD".into(), "REVG".into()]);
        let value = serde_json::to_value(&req).unwrap();

        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0], json!({"text": "prompt"}));
        assert_eq!(
            parts[1],
            json!({"inlineData": {"mimeType": "image/jpeg", "data": "QUJD"}})
        );
        assert_eq!(parts[2]["inlineData"]["data"], "REVG");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn reply_text_joins_parts_of_first_candidate() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "herpes "}, {"text": "zoster"}]},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(resp.reply_text().as_deref(), Some("herpes zoster"));
        assert_eq!(resp.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn reply_text_none_without_candidates() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(resp.reply_text().is_none());
        assert_eq!(resp.block_reason(), Some("SAFETY"));
    }

    #[test]
    fn reply_text_none_when_candidate_has_no_content() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(resp.reply_text().is_none());
    }

    #[test]
    fn api_error_message_prefers_envelope() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid. (INVALID_ARGUMENT)");
    }

    #[test]
    fn api_error_message_falls_back_to_raw_body() {
        assert_eq!(api_error_message("  Bad Gateway \n"), "Bad Gateway");
    }
}
