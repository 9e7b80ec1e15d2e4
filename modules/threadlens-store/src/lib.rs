//! Postgres persistence for jobs, posts and action items.
//!
//! Runtime-checked queries with `$n` binds; enums stored as text, lists and
//! progress as JSONB. Row structs convert to domain types via `TryFrom` so a
//! corrupt row surfaces as an error instead of a panic.

mod rows;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use threadlens_common::{ActionItem, Job, Post};
use threadlens_engine::JobStore;

use rows::{ActionItemRow, JobRow, PostRow};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, status, subreddits, keywords, time_window, sort_mode,
                 post_limit, progress, created_at, started_at, completed_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                error_message = EXCLUDED.error_message
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(serde_json::to_value(&job.subreddits)?)
        .bind(serde_json::to_value(&job.keywords)?)
        .bind(job.time_window.as_str())
        .bind(job.sort.as_str())
        .bind(job.post_limit as i32)
        .bind(serde_json::to_value(&job.progress)?)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> Result<(i64, Vec<Job>)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let jobs = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((total, jobs))
    }

    async fn delete_job(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_posts(&self, job_id: Uuid, posts: &[Post]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for post in posts {
            let analysis = post
                .analysis
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO posts
                    (id, job_id, source_id, title, body, subreddit, author, url,
                     score, num_comments, posted_at, matched_keyword, analysis)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (job_id, source_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    body = EXCLUDED.body,
                    subreddit = EXCLUDED.subreddit,
                    author = EXCLUDED.author,
                    url = EXCLUDED.url,
                    score = EXCLUDED.score,
                    num_comments = EXCLUDED.num_comments,
                    posted_at = EXCLUDED.posted_at,
                    matched_keyword = EXCLUDED.matched_keyword,
                    analysis = EXCLUDED.analysis
                "#,
            )
            .bind(post.id)
            .bind(job_id)
            .bind(&post.source_id)
            .bind(&post.title)
            .bind(&post.body)
            .bind(&post.subreddit)
            .bind(&post.author)
            .bind(&post.url)
            .bind(post.score)
            .bind(post.num_comments)
            .bind(post.posted_at)
            .bind(&post.matched_keyword)
            .bind(analysis)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_posts(&self, job_id: Uuid) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(
            "SELECT * FROM posts WHERE job_id = $1 ORDER BY seq ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Post::try_from).collect()
    }

    async fn save_action_items(&self, job_id: Uuid, items: &[ActionItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Aggregation replaces the full set; re-running it never appends.
        sqlx::query("DELETE FROM action_items WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO action_items
                    (id, job_id, title, description, category, priority,
                     impact_score, effort_level, timeline, recommendations,
                     related_post_ids, metrics)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(item.id)
            .bind(job_id)
            .bind(&item.title)
            .bind(&item.description)
            .bind(item.category.as_str())
            .bind(item.priority.as_str())
            .bind(item.impact_score)
            .bind(item.effort_level.as_str())
            .bind(&item.timeline)
            .bind(serde_json::to_value(&item.recommendations)?)
            .bind(serde_json::to_value(&item.related_post_ids)?)
            .bind(&item.metrics)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_action_items(&self, job_id: Uuid) -> Result<Vec<ActionItem>> {
        let rows = sqlx::query_as::<_, ActionItemRow>(
            "SELECT * FROM action_items WHERE job_id = $1 ORDER BY seq ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActionItem::try_from).collect()
    }
}
