use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// --- Job ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Completed and failed jobs never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reddit search time filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    #[default]
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hour" => Some(TimeWindow::Hour),
            "day" => Some(TimeWindow::Day),
            "week" => Some(TimeWindow::Week),
            "month" => Some(TimeWindow::Month),
            "year" => Some(TimeWindow::Year),
            "all" => Some(TimeWindow::All),
            _ => None,
        }
    }
}

/// Reddit search sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Relevance,
    Hot,
    Top,
    New,
    Comments,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Relevance => "relevance",
            SortMode::Hot => "hot",
            SortMode::Top => "top",
            SortMode::New => "new",
            SortMode::Comments => "comments",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "relevance" => Some(SortMode::Relevance),
            "hot" => Some(SortMode::Hot),
            "top" => Some(SortMode::Top),
            "new" => Some(SortMode::New),
            "comments" => Some(SortMode::Comments),
            _ => None,
        }
    }
}

/// Point-in-time progress of a job run. Written together with `status` on
/// every commit so readers always see a consistent pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current: u32,
    pub total: u32,
    pub step: String,
    pub posts_found: u32,
}

impl JobProgress {
    pub fn new(current: u32, total: u32, step: impl Into<String>, posts_found: u32) -> Self {
        Self {
            current,
            total,
            step: step.into(),
            posts_found,
        }
    }
}

/// An analysis job: which subreddits and keywords to mine, how, and where the
/// run currently stands.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    #[builder(default)]
    pub status: JobStatus,
    pub subreddits: Vec<String>,
    pub keywords: Vec<String>,
    #[builder(default)]
    pub time_window: TimeWindow,
    #[builder(default)]
    pub sort: SortMode,
    #[builder(default = 50)]
    pub post_limit: u32,
    #[builder(default)]
    pub progress: JobProgress,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
}

impl Job {
    /// Units of work in the fetch stage.
    pub fn total_searches(&self) -> u32 {
        (self.subreddits.len() * self.keywords.len()) as u32
    }
}

// --- Posts ---

/// Sentiment label, exactly five values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Negative,
    SlightlyNegative,
    #[default]
    Neutral,
    SlightlyPositive,
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::SlightlyNegative => "slightly_negative",
            Sentiment::Neutral => "neutral",
            Sentiment::SlightlyPositive => "slightly_positive",
            Sentiment::Positive => "positive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "negative" => Some(Sentiment::Negative),
            "slightly_negative" => Some(Sentiment::SlightlyNegative),
            "neutral" => Some(Sentiment::Neutral),
            "slightly_positive" => Some(Sentiment::SlightlyPositive),
            "positive" => Some(Sentiment::Positive),
            _ => None,
        }
    }

    /// Normalize a free-form model label: lowercased, spaces collapsed to
    /// underscores, anything unrecognized mapped to neutral.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(' ', "_");
        Self::parse(&normalized).unwrap_or(Sentiment::Neutral)
    }

    pub fn is_negative_leaning(&self) -> bool {
        matches!(self, Sentiment::Negative | Sentiment::SlightlyNegative)
    }

    pub fn is_positive_leaning(&self) -> bool {
        matches!(self, Sentiment::Positive | Sentiment::SlightlyPositive)
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-post analysis result. `raw` holds the verbatim model payload on the
/// AI path and is `None` when the local heuristic produced the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub sentiment: Sentiment,
    /// Always within [-1.0, 1.0].
    pub sentiment_score: f64,
    pub pain_points: Vec<String>,
    pub feature_requests: Vec<String>,
    pub brands_mentioned: Vec<String>,
    pub user_type: String,
    pub summary: String,
    pub raw: Option<serde_json::Value>,
}

/// A post as fetched and normalized from the content source, before it is
/// attached to a job or analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    /// Reddit's post id; the dedup key within a job.
    pub source_id: String,
    pub title: String,
    pub body: Option<String>,
    pub subreddit: String,
    /// `"[deleted]"` when the account is gone upstream.
    pub author: String,
    /// Canonical URL built from the permalink.
    pub url: String,
    pub score: i64,
    pub num_comments: i64,
    pub posted_at: DateTime<Utc>,
    pub matched_keyword: String,
}

impl RawPost {
    pub fn into_post(self, job_id: Uuid, analysis: Option<Analysis>) -> Post {
        Post {
            id: Uuid::new_v4(),
            job_id,
            source_id: self.source_id,
            title: self.title,
            body: self.body,
            subreddit: self.subreddit,
            author: self.author,
            url: self.url,
            score: self.score,
            num_comments: self.num_comments,
            posted_at: self.posted_at,
            matched_keyword: self.matched_keyword,
            analysis,
        }
    }
}

/// A stored post owned by a job. At most one per (job, source_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub job_id: Uuid,
    pub source_id: String,
    pub title: String,
    pub body: Option<String>,
    pub subreddit: String,
    pub author: String,
    pub url: String,
    pub score: i64,
    pub num_comments: i64,
    pub posted_at: DateTime<Utc>,
    pub matched_keyword: String,
    pub analysis: Option<Analysis>,
}

// --- Action items ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Priority::Critical),
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Product,
    Service,
    Marketing,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Product => "product",
            Category::Service => "service",
            Category::Marketing => "marketing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "product" => Some(Category::Product),
            "service" => Some(Category::Service),
            "marketing" => Some(Category::Marketing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl EffortLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffortLevel::Low => "low",
            EffortLevel::Medium => "medium",
            EffortLevel::High => "high",
            EffortLevel::VeryHigh => "very_high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(EffortLevel::Low),
            "medium" => Some(EffortLevel::Medium),
            "high" => Some(EffortLevel::High),
            "very_high" => Some(EffortLevel::VeryHigh),
            _ => None,
        }
    }
}

/// A derived, prioritized recommendation. Replaced wholesale each time the
/// aggregation stage runs for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    /// Within [0, 100].
    pub impact_score: i32,
    pub effort_level: EffortLevel,
    pub timeline: String,
    /// At most 5 entries.
    pub recommendations: Vec<String>,
    /// At most 10 entries.
    pub related_post_ids: Vec<Uuid>,
    pub metrics: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_label_normalization() {
        assert_eq!(Sentiment::from_label("Slightly Negative"), Sentiment::SlightlyNegative);
        assert_eq!(Sentiment::from_label("POSITIVE"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("meh"), Sentiment::Neutral);
        assert_eq!(Sentiment::from_label(""), Sentiment::Neutral);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert!(JobStatus::parse("cancelled").is_none());
    }

    #[test]
    fn job_builder_defaults() {
        let job = Job::builder()
            .subreddits(vec!["lawncare".to_string()])
            .keywords(vec!["mower".to_string()])
            .build();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.time_window, TimeWindow::Year);
        assert_eq!(job.sort, SortMode::Relevance);
        assert_eq!(job.post_limit, 50);
        assert!(job.started_at.is_none());
        assert_eq!(job.total_searches(), 1);
    }
}
