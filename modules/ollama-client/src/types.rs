use serde::{Deserialize, Serialize};

/// Body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// `"json"` constrains the model to emit a single JSON object.
    pub format: String,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    /// Response token cap.
    pub num_predict: u32,
    /// Context window size.
    pub num_ctx: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            num_predict: 200,
            num_ctx: 1024,
        }
    }
}

/// Non-streaming response from `/api/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}
