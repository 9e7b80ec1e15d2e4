// Test mocks for the job pipeline.
//
// Three mocks matching the three trait boundaries:
// - MemoryStore (JobStore) — stateful in-memory records, with hooks to
//   inject external transitions and persistence failures mid-run
// - MockSource (ContentSource) — scripted per (subreddit, keyword) replies
// - MockModel (LanguageModel) — scripted generations with optional delays
//   and in-flight tracking
//
// Plus helpers for constructing RawPost/Post fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use threadlens_common::{
    ActionItem, Analysis, Job, JobStatus, Post, RawPost, Sentiment, SortMode, TimeWindow,
};

use crate::runner::CANCELLED_MESSAGE;
use crate::traits::{ContentSource, JobStore, LanguageModel, SourceError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn raw_post(source_id: &str, title: &str) -> RawPost {
    RawPost {
        source_id: source_id.to_string(),
        title: title.to_string(),
        body: None,
        subreddit: "lawncare".to_string(),
        author: "tester".to_string(),
        url: format!("https://www.reddit.com/r/lawncare/comments/{source_id}/"),
        score: 1,
        num_comments: 0,
        posted_at: Utc::now(),
        matched_keyword: "mower".to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn analyzed_post(
    job_id: Uuid,
    source_id: &str,
    sentiment: Sentiment,
    score: f64,
    pain_points: &[&str],
    feature_requests: &[&str],
    brands: &[&str],
) -> Post {
    let analysis = Analysis {
        sentiment,
        sentiment_score: score,
        pain_points: pain_points.iter().map(|s| s.to_string()).collect(),
        feature_requests: feature_requests.iter().map(|s| s.to_string()).collect(),
        brands_mentioned: brands.iter().map(|s| s.to_string()).collect(),
        user_type: "unknown".to_string(),
        summary: String::new(),
        raw: None,
    };
    raw_post(source_id, &format!("post {source_id}")).into_post(job_id, Some(analysis))
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum SearchReply {
    Posts(Vec<RawPost>),
    Throttled,
    Fail(String),
}

/// Scripted content source. Replies queue per (subreddit, keyword); the last
/// scripted reply is sticky so repeated fetches (resume) see the same data.
/// Unscripted pairs return an empty page.
pub struct MockSource {
    replies: Mutex<HashMap<(String, String), VecDeque<SearchReply>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockSource {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(self, subreddit: &str, keyword: &str, reply: SearchReply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry((subreddit.to_string(), keyword.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_search(self, subreddit: &str, keyword: &str, posts: Vec<RawPost>) -> Self {
        self.push(subreddit, keyword, SearchReply::Posts(posts))
    }

    pub fn on_throttled(self, subreddit: &str, keyword: &str) -> Self {
        self.push(subreddit, keyword, SearchReply::Throttled)
    }

    pub fn on_failure(self, subreddit: &str, keyword: &str, message: &str) -> Self {
        self.push(subreddit, keyword, SearchReply::Fail(message.to_string()))
    }

    /// Shared handle to the (subreddit, keyword) call log.
    pub fn call_log(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl ContentSource for MockSource {
    async fn search(
        &self,
        subreddit: &str,
        keyword: &str,
        _window: TimeWindow,
        _sort: SortMode,
        _limit: u32,
    ) -> Result<Vec<RawPost>, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((subreddit.to_string(), keyword.to_string()));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&(subreddit.to_string(), keyword.to_string())) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(SearchReply::Posts(posts)) => Ok(posts),
            Some(SearchReply::Throttled) => Err(SourceError::Throttled),
            Some(SearchReply::Fail(message)) => Err(SourceError::Other(anyhow::anyhow!(message))),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockModel
// ---------------------------------------------------------------------------

/// Tracks concurrent generate() calls; shared out so tests can assert the cap.
#[derive(Default)]
pub struct InFlightTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlightTracker {
    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlightTracker);

impl<'a> InFlightGuard<'a> {
    fn enter(tracker: &'a InFlightTracker) -> Self {
        let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
        tracker.max.fetch_max(now, Ordering::SeqCst);
        Self(tracker)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptedReply {
    needle: String,
    response: String,
    delay: Option<Duration>,
}

/// Scripted language model. The first reply whose needle occurs in the
/// prompt wins; an empty needle matches everything. Prompts with no match
/// error, as does every call on an unreachable model.
pub struct MockModel {
    replies: Vec<ScriptedReply>,
    uniform_delay: Option<Duration>,
    unreachable: bool,
    healthy: bool,
    in_flight: Arc<InFlightTracker>,
}

impl MockModel {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            uniform_delay: None,
            unreachable: false,
            healthy: true,
            in_flight: Arc::new(InFlightTracker::default()),
        }
    }

    /// Every call fails, as when the service is down.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            healthy: false,
            ..Self::new()
        }
    }

    pub fn reply(mut self, needle: &str, response: serde_json::Value) -> Self {
        self.replies.push(ScriptedReply {
            needle: needle.to_string(),
            response: response.to_string(),
            delay: None,
        });
        self
    }

    pub fn reply_with_delay(
        mut self,
        needle: &str,
        response: serde_json::Value,
        delay: Duration,
    ) -> Self {
        self.replies.push(ScriptedReply {
            needle: needle.to_string(),
            response: response.to_string(),
            delay: Some(delay),
        });
        self
    }

    /// Catch-all JSON reply for any prompt.
    pub fn reply_all(self, response: serde_json::Value) -> Self {
        self.reply("", response)
    }

    /// Catch-all raw-text reply (for exercising the unparseable path).
    pub fn reply_all_text(mut self, response: &str) -> Self {
        self.replies.push(ScriptedReply {
            needle: String::new(),
            response: response.to_string(),
            delay: None,
        });
        self
    }

    pub fn with_uniform_delay(mut self, delay: Duration) -> Self {
        self.uniform_delay = Some(delay);
        self
    }

    pub fn in_flight_tracker(&self) -> Arc<InFlightTracker> {
        self.in_flight.clone()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let _guard = InFlightGuard::enter(&self.in_flight);

        if let Some(delay) = self.uniform_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            bail!("connection refused");
        }

        match self.replies.iter().find(|r| prompt.contains(&r.needle)) {
            Some(reply) => {
                if let Some(delay) = reply.delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(reply.response.clone())
            }
            None => bail!("no scripted reply for prompt"),
        }
    }

    async fn healthy(&self) -> bool {
        self.healthy
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StatusFlip {
    after_saves: usize,
    to: JobStatus,
    message: Option<String>,
}

/// In-memory JobStore. Posts keep insertion order; replacing by source id
/// keeps the original position, matching the real store's upsert.
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    posts: Mutex<HashMap<Uuid, Vec<Post>>>,
    action_items: Mutex<HashMap<Uuid, Vec<ActionItem>>>,
    save_posts_calls: AtomicUsize,
    flip: Mutex<Option<StatusFlip>>,
    fail_save_posts: AtomicBool,
}

impl MemoryStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            posts: Mutex::new(HashMap::new()),
            action_items: Mutex::new(HashMap::new()),
            save_posts_calls: AtomicUsize::new(0),
            flip: Mutex::new(None),
            fail_save_posts: AtomicBool::new(false),
        }
    }

    /// Simulate an external pause landing after the nth save_posts call.
    pub fn pause_after_save_posts(self, after_saves: usize) -> Self {
        *self.flip.lock().unwrap() = Some(StatusFlip {
            after_saves,
            to: JobStatus::Paused,
            message: None,
        });
        self
    }

    /// Simulate an external cancel landing after the nth save_posts call.
    pub fn cancel_after_save_posts(self, after_saves: usize) -> Self {
        *self.flip.lock().unwrap() = Some(StatusFlip {
            after_saves,
            to: JobStatus::Failed,
            message: Some(CANCELLED_MESSAGE.to_string()),
        });
        self
    }

    /// Make the next save_posts call fail once.
    pub fn fail_next_save_posts(self) -> Self {
        self.fail_save_posts.store(true, Ordering::SeqCst);
        self
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn posts_for(&self, job_id: Uuid) -> Vec<Post> {
        self.posts
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn action_items_for(&self, job_id: Uuid) -> Vec<ActionItem> {
        self.action_items
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn save_posts_call_count(&self) -> usize {
        self.save_posts_calls.load(Ordering::SeqCst)
    }

    /// Externally flip a job's status, as the API layer would.
    pub fn set_status(&self, job_id: Uuid, status: JobStatus) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
            job.status = status;
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<(i64, Vec<Job>)> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((total, page))
    }

    async fn delete_job(&self, id: Uuid) -> Result<()> {
        self.jobs.lock().unwrap().remove(&id);
        self.posts.lock().unwrap().remove(&id);
        self.action_items.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn save_posts(&self, job_id: Uuid, posts: &[Post]) -> Result<()> {
        if self.fail_save_posts.swap(false, Ordering::SeqCst) {
            bail!("store unavailable");
        }

        {
            let mut all = self.posts.lock().unwrap();
            let list = all.entry(job_id).or_default();
            for post in posts {
                match list.iter_mut().find(|p| p.source_id == post.source_id) {
                    Some(existing) => *existing = post.clone(),
                    None => list.push(post.clone()),
                }
            }
        }

        let calls = self.save_posts_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let flip = self.flip.lock().unwrap().clone();
        if let Some(flip) = flip {
            if calls == flip.after_saves {
                if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
                    job.status = flip.to;
                    job.error_message = flip.message.clone();
                }
            }
        }
        Ok(())
    }

    async fn list_posts(&self, job_id: Uuid) -> Result<Vec<Post>> {
        Ok(self.posts_for(job_id))
    }

    async fn save_action_items(&self, job_id: Uuid, items: &[ActionItem]) -> Result<()> {
        self.action_items
            .lock()
            .unwrap()
            .insert(job_id, items.to_vec());
        Ok(())
    }

    async fn list_action_items(&self, job_id: Uuid) -> Result<Vec<ActionItem>> {
        Ok(self.action_items_for(job_id))
    }
}
