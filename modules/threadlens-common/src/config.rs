use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Ollama
    pub ollama_base_url: String,
    pub ollama_model: String,

    // Reddit
    pub reddit_user_agent: String,
    pub reddit_rate_limit_ms: u64,

    // Analysis
    pub analysis_context: String,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string()),
            reddit_user_agent: env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "threadlens/0.1".to_string()),
            reddit_rate_limit_ms: env::var("REDDIT_RATE_LIMIT_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .expect("REDDIT_RATE_LIMIT_MS must be a number"),
            analysis_context: env::var("ANALYSIS_CONTEXT")
                .unwrap_or_else(|_| "construction equipment".to_string()),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("API_PORT must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
