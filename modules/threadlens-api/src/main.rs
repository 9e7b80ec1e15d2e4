use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ollama_client::OllamaClient;
use reddit_client::RedditClient;
use threadlens_common::Config;
use threadlens_engine::{
    Analyzer, BatchAnalyzer, JobRunner, JobStore, LanguageModel, PostFetcher, RateLimiter,
};
use threadlens_store::PgStore;

mod routes;

pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub runner: Arc<JobRunner>,
    pub model: Arc<dyn LanguageModel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("threadlens=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store: Arc<dyn JobStore> = Arc::new(store);

    // One rate limiter per external source, shared by every job in the
    // process so concurrent jobs serialize against the same clock.
    let reddit = Arc::new(RedditClient::new(&config.reddit_user_agent));
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
        config.reddit_rate_limit_ms,
    )));
    let fetcher = PostFetcher::new(reddit, limiter);

    let model: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(
        &config.ollama_base_url,
        &config.ollama_model,
    ));
    let analyzer = Arc::new(Analyzer::new(model.clone(), &config.analysis_context));
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        fetcher,
        BatchAnalyzer::new(analyzer),
    ));

    let state = Arc::new(AppState {
        store,
        runner,
        model,
    });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/api/jobs", post(routes::create_job).get(routes::list_jobs))
        .route(
            "/api/jobs/{id}",
            get(routes::get_job).delete(routes::delete_job),
        )
        .route("/api/jobs/{id}/pause", post(routes::pause_job))
        .route("/api/jobs/{id}/resume", post(routes::resume_job))
        .route("/api/jobs/{id}/cancel", post(routes::cancel_job))
        .route("/api/jobs/{id}/posts", get(routes::list_posts))
        .route("/api/jobs/{id}/insights", get(routes::get_insights))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!(addr, "threadlens API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
