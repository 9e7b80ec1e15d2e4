// Trait abstractions for the pipeline's external collaborators.
//
// JobStore — persisted job/post/action-item records behind one seam.
// ContentSource — keyword search against the external content source.
// LanguageModel — one-shot text generation plus a health probe.
//
// These enable deterministic testing with MemoryStore, MockSource and
// MockModel: no network, no database, no Docker.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use ollama_client::OllamaClient;
use reddit_client::RedditClient;
use threadlens_common::{ActionItem, Job, Post, RawPost, SortMode, TimeWindow};

use crate::fetcher::normalize;

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;

    /// Upsert; full replace of all mutable fields.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Most recent first. Returns (total count, page).
    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<(i64, Vec<Job>)>;

    /// Removes the job and everything it owns.
    async fn delete_job(&self, id: Uuid) -> Result<()>;

    /// Append, or replace by (job, source_id) keeping the original position.
    async fn save_posts(&self, job_id: Uuid, posts: &[Post]) -> Result<()>;

    /// Posts in insertion order.
    async fn list_posts(&self, job_id: Uuid) -> Result<Vec<Post>>;

    /// Replaces the job's full action-item set.
    async fn save_action_items(&self, job_id: Uuid, items: &[ActionItem]) -> Result<()>;

    async fn list_action_items(&self, job_id: Uuid) -> Result<Vec<ActionItem>>;
}

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SourceError {
    /// The source asked us to slow down (HTTP 429). Retryable after a cooldown.
    #[error("content source throttled the request")]
    Throttled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Search one scope for one keyword, returning normalized posts.
    async fn search(
        &self,
        subreddit: &str,
        keyword: &str,
        window: TimeWindow,
        sort: SortMode,
        limit: u32,
    ) -> Result<Vec<RawPost>, SourceError>;
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn search(
        &self,
        subreddit: &str,
        keyword: &str,
        window: TimeWindow,
        sort: SortMode,
        limit: u32,
    ) -> Result<Vec<RawPost>, SourceError> {
        let posts = self
            .search(subreddit, keyword, window.as_str(), sort.as_str(), limit)
            .await
            .map_err(|e| match e {
                reddit_client::RedditError::Throttled => SourceError::Throttled,
                other => SourceError::Other(anyhow::Error::new(other)),
            })?;

        Ok(posts
            .into_iter()
            .map(|post| normalize(post, keyword))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// LanguageModel
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One-shot generation; the prompt asks for a single JSON object.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Whether the backing service is reachable right now.
    async fn healthy(&self) -> bool;
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(self.generate(prompt).await?)
    }

    async fn healthy(&self) -> bool {
        self.health().await
    }
}
