pub mod error;
pub mod types;

pub use error::{RedditError, Result};
pub use types::{Listing, ListingChild, ListingData, RedditPost};

use std::time::Duration;

const BASE_URL: &str = "https://www.reddit.com";

/// Reddit caps search listings at 100 items per request.
pub const MAX_PAGE_SIZE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for Reddit's public (unauthenticated) JSON search endpoint.
///
/// Pure wire client: no retries, no pacing. Throttling is surfaced as
/// [`RedditError::Throttled`] for the caller to handle.
pub struct RedditClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl RedditClient {
    pub fn new(user_agent: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: BASE_URL.to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Search a subreddit for posts matching a keyword.
    ///
    /// `time_filter` is one of `hour|day|week|month|year|all`; `sort` one of
    /// `relevance|hot|top|new|comments`. `limit` is clamped to
    /// [`MAX_PAGE_SIZE`].
    pub async fn search(
        &self,
        subreddit: &str,
        keyword: &str,
        time_filter: &str,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>> {
        let url = format!("{}/search.json", self.base_url);
        let query = format!("{keyword} subreddit:{subreddit}");
        let limit = limit.min(MAX_PAGE_SIZE);

        tracing::debug!(subreddit, keyword, sort, time_filter, limit, "Reddit search request");

        let resp = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .query(&[
                ("q", query.as_str()),
                ("sort", sort),
                ("t", time_filter),
                ("limit", &limit.to_string()),
                ("type", "link"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(RedditError::Throttled);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RedditError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let listing: Listing = resp.json().await?;
        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .collect();

        tracing::info!(subreddit, keyword, count = posts.len(), "Reddit search complete");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_envelope_parses() {
        let payload = serde_json::json!({
            "kind": "Listing",
            "data": {
                "children": [
                    {
                        "kind": "t3",
                        "data": {
                            "id": "abc123",
                            "title": "Mower died again",
                            "selftext": "Third breakdown this season.",
                            "subreddit": "lawncare",
                            "author": "grassman",
                            "permalink": "/r/lawncare/comments/abc123/mower_died_again/",
                            "score": 42,
                            "num_comments": 7,
                            "created_utc": 1700000000.0
                        }
                    }
                ]
            }
        });

        let listing: Listing = serde_json::from_value(payload).unwrap();
        assert_eq!(listing.data.children.len(), 1);
        let post = &listing.data.children[0].data;
        assert_eq!(post.id, "abc123");
        assert_eq!(post.author.as_deref(), Some("grassman"));
        assert_eq!(post.score, 42);
    }

    #[test]
    fn missing_fields_default() {
        // Deleted accounts drop the author field entirely.
        let payload = serde_json::json!({
            "data": {
                "children": [
                    { "kind": "t3", "data": { "id": "x1", "title": "t" } }
                ]
            }
        });

        let listing: Listing = serde_json::from_value(payload).unwrap();
        let post = &listing.data.children[0].data;
        assert!(post.author.is_none());
        assert_eq!(post.selftext, "");
        assert_eq!(post.num_comments, 0);
        assert_eq!(post.created_utc, 0.0);
    }
}
