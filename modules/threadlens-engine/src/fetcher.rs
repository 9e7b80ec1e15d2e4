use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use reddit_client::RedditPost;
use threadlens_common::{RawPost, SortMode, TimeWindow};

use crate::rate_limit::RateLimiter;
use crate::traits::{ContentSource, SourceError};

/// Fixed cooldown before the single retry after a throttling response.
const THROTTLE_COOLDOWN: Duration = Duration::from_secs(10);

/// Author sentinel for accounts removed upstream.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Fetches posts for one subreddit×keyword pair under the shared rate limiter.
///
/// Fetching never fails the job: throttling gets one retry after a fixed
/// cooldown, anything else degrades to an empty result and a warning.
pub struct PostFetcher {
    source: Arc<dyn ContentSource>,
    limiter: Arc<RateLimiter>,
}

impl PostFetcher {
    pub fn new(source: Arc<dyn ContentSource>, limiter: Arc<RateLimiter>) -> Self {
        Self { source, limiter }
    }

    pub async fn search(
        &self,
        subreddit: &str,
        keyword: &str,
        window: TimeWindow,
        sort: SortMode,
        limit: u32,
    ) -> Vec<RawPost> {
        self.limiter.acquire().await;

        match self.source.search(subreddit, keyword, window, sort, limit).await {
            Ok(posts) => {
                info!(subreddit, keyword, count = posts.len(), "Search complete");
                posts
            }
            Err(SourceError::Throttled) => {
                warn!(
                    subreddit,
                    keyword,
                    cooldown_secs = THROTTLE_COOLDOWN.as_secs(),
                    "Throttled, cooling down before one retry"
                );
                tokio::time::sleep(THROTTLE_COOLDOWN).await;
                self.limiter.acquire().await;

                match self.source.search(subreddit, keyword, window, sort, limit).await {
                    Ok(posts) => {
                        info!(subreddit, keyword, count = posts.len(), "Search complete after retry");
                        posts
                    }
                    Err(e) => {
                        warn!(subreddit, keyword, error = %e, "Search failed after retry");
                        Vec::new()
                    }
                }
            }
            Err(e) => {
                warn!(subreddit, keyword, error = %e, "Search failed");
                Vec::new()
            }
        }
    }
}

/// Map a wire post into the pipeline shape: canonical URL from the permalink,
/// author sentinel when the account is gone, epoch seconds to UTC.
pub fn normalize(post: RedditPost, keyword: &str) -> RawPost {
    let author = match post.author {
        Some(name) if !name.is_empty() => name,
        _ => DELETED_AUTHOR.to_string(),
    };
    let body = if post.selftext.trim().is_empty() {
        None
    } else {
        Some(post.selftext)
    };

    RawPost {
        source_id: post.id,
        title: post.title,
        body,
        subreddit: post.subreddit,
        author,
        url: format!("https://www.reddit.com{}", post.permalink),
        score: post.score,
        num_comments: post.num_comments,
        posted_at: epoch_to_utc(post.created_utc),
        matched_keyword: keyword.to_string(),
    }
}

fn epoch_to_utc(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
