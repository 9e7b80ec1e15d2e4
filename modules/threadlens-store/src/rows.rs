// Row types mirroring the tables, converted to domain types via TryFrom.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use threadlens_common::{
    ActionItem, Category, EffortLevel, Job, JobStatus, Post, Priority, SortMode, TimeWindow,
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub status: String,
    pub subreddits: serde_json::Value,
    pub keywords: serde_json::Value,
    pub time_window: String,
    pub sort_mode: String,
    pub post_limit: i32,
    pub progress: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            status: JobStatus::parse(&row.status)
                .ok_or_else(|| anyhow!("unknown job status: {}", row.status))?,
            subreddits: serde_json::from_value(row.subreddits)?,
            keywords: serde_json::from_value(row.keywords)?,
            time_window: TimeWindow::parse(&row.time_window)
                .ok_or_else(|| anyhow!("unknown time window: {}", row.time_window))?,
            sort: SortMode::parse(&row.sort_mode)
                .ok_or_else(|| anyhow!("unknown sort mode: {}", row.sort_mode))?,
            post_limit: row.post_limit as u32,
            progress: serde_json::from_value(row.progress)?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    #[allow(dead_code)]
    pub seq: i64,
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
    pub analysis: Option<serde_json::Value>,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self> {
        Ok(Post {
            id: row.id,
            job_id: row.job_id,
            source_id: row.source_id,
            title: row.title,
            body: row.body,
            subreddit: row.subreddit,
            author: row.author,
            url: row.url,
            score: row.score,
            num_comments: row.num_comments,
            posted_at: row.posted_at,
            matched_keyword: row.matched_keyword,
            analysis: row.analysis.map(serde_json::from_value).transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ActionItemRow {
    pub id: Uuid,
    #[allow(dead_code)]
    pub seq: i64,
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub impact_score: i32,
    pub effort_level: String,
    pub timeline: String,
    pub recommendations: serde_json::Value,
    pub related_post_ids: serde_json::Value,
    pub metrics: serde_json::Value,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ActionItemRow> for ActionItem {
    type Error = anyhow::Error;

    fn try_from(row: ActionItemRow) -> Result<Self> {
        Ok(ActionItem {
            id: row.id,
            job_id: row.job_id,
            title: row.title,
            description: row.description,
            category: Category::parse(&row.category)
                .ok_or_else(|| anyhow!("unknown category: {}", row.category))?,
            priority: Priority::parse(&row.priority)
                .ok_or_else(|| anyhow!("unknown priority: {}", row.priority))?,
            impact_score: row.impact_score,
            effort_level: EffortLevel::parse(&row.effort_level)
                .ok_or_else(|| anyhow!("unknown effort level: {}", row.effort_level))?,
            timeline: row.timeline,
            recommendations: serde_json::from_value(row.recommendations)?,
            related_post_ids: serde_json::from_value(row.related_post_ids)?,
            metrics: row.metrics,
        })
    }
}
