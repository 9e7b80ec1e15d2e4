use thiserror::Error;

pub type Result<T> = std::result::Result<T, OllamaError>;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for OllamaError {
    fn from(err: reqwest::Error) -> Self {
        OllamaError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for OllamaError {
    fn from(err: serde_json::Error) -> Self {
        OllamaError::Parse(err.to_string())
    }
}
