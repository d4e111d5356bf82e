use crate::error::BackendError;
use crate::models::gemini::{GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// The single backend capability the rest of the proxy depends on.
///
/// Constructed once at process start and shared read-only. One invocation
/// means one outbound call, with no retries; failures carry the backend's
/// own error text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Single-shot generation: one request, one complete native response.
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BackendError>;

    /// Incremental generation: a finite, single-pass sequence of partial
    /// native responses, produced as the backend delivers them. Re-invoking
    /// issues a new backend call; the stream is not restartable.
    async fn generate_streaming(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<BoxStream<'static, Result<GenerateContentResponse, BackendError>>, BackendError>;
}

/// Gemini REST client speaking the `v1beta` generateContent surface.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (self-hosted gateways, mock
    /// servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        // Accept "models/..."-prefixed ids as a convenience.
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerateContentRequest,
        accept: &'static str,
    ) -> Result<reqwest::Response, BackendError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, accept)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::new(format!("request to Gemini failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Gemini API error: {body}");
            return Err(BackendError::new(format!(
                "Gemini API error (status {status}): {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BackendError> {
        let url = self.endpoint(model, "generateContent");
        let response = self.post(&url, request, "application/json").await?;
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::new(format!("failed to read Gemini response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| BackendError::new(format!("failed to parse Gemini response: {e}")))
    }

    async fn generate_streaming(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<BoxStream<'static, Result<GenerateContentResponse, BackendError>>, BackendError>
    {
        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        let response = self.post(&url, request, "text/event-stream").await?;

        // Each SSE data payload is one partial GenerateContentResponse.
        // Pass-through: no buffering beyond event framing.
        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        if event.data.trim().is_empty() {
                            return None;
                        }
                        Some(
                            serde_json::from_str::<GenerateContentResponse>(&event.data).map_err(
                                |e| {
                                    BackendError::new(format!(
                                        "failed to parse Gemini stream event: {e}"
                                    ))
                                },
                            ),
                        )
                    }
                    Err(e) => Some(Err(BackendError::new(format!(
                        "Gemini stream transport error: {e}"
                    )))),
                }
            });

        Ok(stream.boxed())
    }
}
