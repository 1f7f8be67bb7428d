use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::gemini_types::{
    api_error_message, GenerateContentRequest, GenerateContentResponse, MAX_IMAGES_PER_REQUEST,
};
use super::DiagnosisError;
use crate::config::{is_usable_api_key, DiagnosisConfig};

/// Remote multimodal model abstraction (allows mocking).
pub trait InferenceClient: Send + Sync {
    /// Send the prompt plus base64 images in one request; return the raw reply text.
    fn generate(&self, prompt: &str, images_base64: &[String]) -> Result<String, DiagnosisError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl GeminiClient {
    /// Build a client from explicit configuration.
    ///
    /// A placeholder key is accepted here so the app can start; every
    /// `generate` call rejects it before touching the network.
    pub fn new(config: &DiagnosisConfig) -> Result<Self, DiagnosisError> {
        let timeout = config.timeout();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DiagnosisError::Configuration(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.trim().to_string(),
            client,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn ensure_api_key(&self) -> Result<(), DiagnosisError> {
        if is_usable_api_key(&self.api_key) {
            Ok(())
        } else {
            Err(DiagnosisError::Configuration(
                "Gemini API key is missing or still the placeholder value".to_string(),
            ))
        }
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Reject empty or oversized image lists before building a request.
pub fn check_image_count(images_base64: &[String]) -> Result<(), DiagnosisError> {
    if images_base64.is_empty() || images_base64.len() > MAX_IMAGES_PER_REQUEST {
        return Err(DiagnosisError::Inference(format!(
            "A request carries 1 to {MAX_IMAGES_PER_REQUEST} images, got {}",
            images_base64.len()
        )));
    }
    Ok(())
}

impl InferenceClient for GeminiClient {
    fn generate(&self, prompt: &str, images_base64: &[String]) -> Result<String, DiagnosisError> {
        self.ensure_api_key()?;
        check_image_count(images_base64)?;

        let body = GenerateContentRequest::with_images(prompt, images_base64);
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    DiagnosisError::Inference(format!("Cannot reach {}", self.base_url))
                } else if e.is_timeout() {
                    DiagnosisError::Inference(format!(
                        "Request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    DiagnosisError::Inference(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(DiagnosisError::Inference(format!(
                "HTTP {}: {}",
                status.as_u16(),
                api_error_message(&body)
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| DiagnosisError::Inference(format!("Malformed response body: {e}")))?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = %start.elapsed().as_millis(),
            candidates = parsed.candidates.len(),
            "Gemini reply received"
        );

        match parsed.reply_text() {
            Some(text) => Ok(text),
            None => Err(DiagnosisError::Inference(match parsed.block_reason() {
                Some(reason) => format!("Prompt blocked by the model: {reason}"),
                None => "Response contained no text".to_string(),
            })),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Mock inference client for testing. Returns a configurable reply and
/// records every call.
pub struct MockInferenceClient {
    reply: Result<String, DiagnosisError>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, Vec<String>)>>,
}

impl MockInferenceClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(error: DiagnosisError) -> Self {
        Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt and images of the most recent call.
    pub fn last_request(&self) -> Option<(String, Vec<String>)> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }
}

impl InferenceClient for MockInferenceClient {
    fn generate(&self, prompt: &str, images_base64: &[String]) -> Result<String, DiagnosisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_request.lock() {
            *guard = Some((prompt.to_string(), images_base64.to_vec()));
        }
        self.reply.clone()
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn config_for(base_url: &str, key: &str) -> DiagnosisConfig {
        DiagnosisConfig {
            api_key: key.to_string(),
            api_base_url: base_url.to_string(),
            analysis_timeout_ms: 5_000,
            ..Default::default()
        }
    }

    /// Serve `router` on an ephemeral port from a background runtime.
    fn spawn_server(router: Router) -> SocketAddr {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, router).await.unwrap();
            });
        });
        rx.recv().unwrap()
    }

    fn images(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("aW1n{i}")).collect()
    }

    // ── configuration checks (no network) ──

    #[test]
    fn placeholder_key_fails_before_network() {
        // Port 9 (discard) would fail with a network error if a call were made.
        let client = GeminiClient::new(&config_for(
            "http://127.0.0.1:9",
            crate::config::API_KEY_PLACEHOLDER,
        ))
        .unwrap();
        let err = client.generate("prompt", &images(1)).unwrap_err();
        assert!(matches!(err, DiagnosisError::Configuration(_)), "{err:?}");
    }

    #[test]
    fn empty_key_fails_before_network() {
        let client = GeminiClient::new(&config_for("http://127.0.0.1:9", "")).unwrap();
        assert!(matches!(
            client.generate("prompt", &images(1)),
            Err(DiagnosisError::Configuration(_))
        ));
    }

    #[test]
    fn image_count_bounds() {
        assert!(check_image_count(&images(0)).is_err());
        assert!(check_image_count(&images(1)).is_ok());
        assert!(check_image_count(&images(5)).is_ok());
        assert!(check_image_count(&images(6)).is_err());
    }

    #[test]
    fn endpoint_uses_model_and_trims_slash() {
        let client = GeminiClient::new(&config_for("https://example.test/", "k")).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(client.model(), "gemini-1.5-flash");
    }

    #[test]
    fn debug_does_not_print_key() {
        let client = GeminiClient::new(&config_for("https://example.test", "secret-key")).unwrap();
        assert!(!format!("{client:?}").contains("secret-key"));
    }

    #[test]
    fn unreachable_host_is_inference_error() {
        let client = GeminiClient::new(&config_for("http://127.0.0.1:9", "real-key")).unwrap();
        let err = client.generate("prompt", &images(1)).unwrap_err();
        assert!(matches!(err, DiagnosisError::Inference(_)), "{err:?}");
    }

    // ── local server round trips ──

    #[test]
    fn sends_prompt_images_and_key_and_returns_text() {
        let seen: std::sync::Arc<Mutex<Option<(String, String, Value)>>> = Default::default();
        let seen_in_handler = seen.clone();
        let router = Router::new().fallback(
            move |uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                async move {
                    let key = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *seen.lock().unwrap() = Some((uri.path().to_string(), key, body));
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"text": "  Psoriasis\n"}]}}]
                    }))
                }
            },
        );
        let addr = spawn_server(router);

        let client =
            GeminiClient::new(&config_for(&format!("http://{addr}"), "real-key")).unwrap();
        let reply = client.generate("Analiza", &images(3)).unwrap();
        assert_eq!(reply, "  Psoriasis\n", "reply is returned raw");

        let (path, key, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(path, "/v1beta/models/gemini-1.5-flash:generateContent");
        assert_eq!(key, "real-key");
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["text"], "Analiza");
        for (i, part) in parts[1..].iter().enumerate() {
            assert_eq!(part["inlineData"]["mimeType"], "image/jpeg");
            assert_eq!(part["inlineData"]["data"], format!("aW1n{i}"));
        }
    }

    #[test]
    fn non_success_status_is_inference_error_with_message() {
        let router = Router::new().fallback(|| async {
            (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {"code": 403, "message": "API key not valid.", "status": "PERMISSION_DENIED"}})),
            )
        });
        let addr = spawn_server(router);

        let client =
            GeminiClient::new(&config_for(&format!("http://{addr}"), "bad-key")).unwrap();
        match client.generate("p", &images(1)).unwrap_err() {
            DiagnosisError::Inference(msg) => {
                assert!(msg.contains("HTTP 403"), "{msg}");
                assert!(msg.contains("API key not valid."), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blocked_prompt_is_inference_error() {
        let router = Router::new()
            .fallback(|| async { Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})) });
        let addr = spawn_server(router);

        let client =
            GeminiClient::new(&config_for(&format!("http://{addr}"), "real-key")).unwrap();
        match client.generate("p", &images(1)).unwrap_err() {
            DiagnosisError::Inference(msg) => assert!(msg.contains("SAFETY"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn configured_timeout_is_enforced() {
        let router = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"candidates": []}))
        });
        let addr = spawn_server(router);

        let mut config = config_for(&format!("http://{addr}"), "real-key");
        config.analysis_timeout_ms = 200;
        let client = GeminiClient::new(&config).unwrap();

        let start = std::time::Instant::now();
        let err = client.generate("p", &images(1)).unwrap_err();
        assert!(matches!(err, DiagnosisError::Inference(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    // ── mock ──

    #[test]
    fn mock_records_calls() {
        let mock = MockInferenceClient::new("eczema");
        assert_eq!(mock.call_count(), 0);
        assert_eq!(mock.generate("p", &images(2)).unwrap(), "eczema");
        assert_eq!(mock.call_count(), 1);
        let (prompt, imgs) = mock.last_request().unwrap();
        assert_eq!(prompt, "p");
        assert_eq!(imgs.len(), 2);
    }

    #[test]
    fn failing_mock_returns_error() {
        let mock = MockInferenceClient::failing(DiagnosisError::Inference("down".into()));
        assert!(mock.generate("p", &images(1)).is_err());
        assert_eq!(mock.call_count(), 1);
    }
}
