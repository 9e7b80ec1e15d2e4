pub mod error;
pub mod types;

pub use error::{OllamaError, Result};
pub use types::{GenerateOptions, GenerateRequest, GenerateResponse};

use std::time::Duration;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a local Ollama instance.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run a single non-streaming generation constrained to JSON output.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            format: "json".to_string(),
            stream: false,
            options: GenerateOptions::default(),
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Ollama generate request");

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATE_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: GenerateResponse = resp.json().await?;
        Ok(body.response)
    }

    /// Probe `/api/tags`; false on any failure.
    pub async fn health(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        matches!(result, Ok(resp) if resp.status().is_success())
    }
}
