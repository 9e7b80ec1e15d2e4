use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use threadlens_common::{Job, JobProgress, JobStatus, Post};

use crate::analyzer::BatchAnalyzer;
use crate::dedup::PostSet;
use crate::fetcher::PostFetcher;
use crate::insights;
use crate::traits::JobStore;

/// Posts analyzed per batch; also the poll granularity of the analysis stage.
pub const ANALYSIS_BATCH_SIZE: usize = 5;

/// Error message recorded when a job is cancelled from outside.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

enum StageExit {
    Finished,
    /// An external transition (pause, cancel, delete) landed; the last
    /// committed state stands.
    Interrupted,
}

/// Drives one job through fetch → dedup → analyze → aggregate, committing
/// progress after every unit of work and polling for external transitions
/// between units.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    fetcher: PostFetcher,
    analyzer: BatchAnalyzer,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>, fetcher: PostFetcher, analyzer: BatchAnalyzer) -> Self {
        Self {
            store,
            fetcher,
            analyzer,
        }
    }

    /// Run a job to completion or to its next suspension point.
    ///
    /// Pending jobs start fresh; running jobs re-enter after a resume. Any
    /// other status is a no-op. Errors escaping a stage mark the job failed
    /// and are returned for the spawner to log.
    // Returns a boxed, explicitly-`Send` future rather than an `async fn`.
    // The future is `Send` for every concrete lifetime but, as an `async fn`,
    // not provably so under the higher-ranked `for<'a>` bound that
    // `tokio::spawn` demands (a known limitation around `#[async_trait]`
    // futures held across awaits). Boxing the async block runs the `Send`
    // check at this signature's concrete lifetime, which holds.
    pub fn run(&self, job_id: Uuid) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let store = self.store.clone();
            let Some(job) = store.get_job(job_id).await? else {
                warn!(%job_id, "Job not found, nothing to run");
                return Ok(());
            };
            if !matches!(job.status, JobStatus::Pending | JobStatus::Running) {
                info!(%job_id, status = %job.status, "Job is not runnable, skipping");
                return Ok(());
            }

            match self.run_stages(job).await {
                Ok(StageExit::Finished) => Ok(()),
                Ok(StageExit::Interrupted) => {
                    info!(%job_id, "Job run suspended");
                    Ok(())
                }
                Err(e) => {
                    error!(%job_id, error = %e, "Job failed");
                    self.mark_failed(job_id, &e).await;
                    Err(e)
                }
            }
        })
    }

    async fn run_stages(&self, mut job: Job) -> Result<StageExit> {
        // started_at is set on the first entry only; a resume re-enters with
        // status already running and keeps the original timestamp.
        if job.status == JobStatus::Pending {
            job.started_at = Some(Utc::now());
        }
        job.status = JobStatus::Running;
        self.store
            .save_job(&job)
            .await
            .context("Failed to mark job running")?;

        // Stage 1: fetch every subreddit×keyword pair, dedup by source id.
        let total_searches = job.total_searches();
        let subreddits = job.subreddits.clone();
        let keywords = job.keywords.clone();
        let mut unique = PostSet::new();
        let mut search_no = 0u32;

        for subreddit in &subreddits {
            for keyword in &keywords {
                search_no += 1;
                let progress = JobProgress::new(
                    search_no,
                    total_searches,
                    format!("Searching r/{subreddit} for '{keyword}'"),
                    unique.len() as u32,
                );
                if !self.checkpoint(&mut job, progress).await? {
                    return Ok(StageExit::Interrupted);
                }

                let posts = self
                    .fetcher
                    .search(subreddit, keyword, job.time_window, job.sort, job.post_limit)
                    .await;
                let added = unique.merge(posts);
                info!(
                    job_id = %job.id,
                    subreddit,
                    keyword,
                    added,
                    unique = unique.len(),
                    "Search merged"
                );
            }
        }

        let posts = unique.into_posts();
        let total_posts = posts.len() as u32;
        info!(job_id = %job.id, posts = total_posts, "Fetch stage complete");

        // Stage 2: analyze in fixed-size batches, persisting each batch
        // before advancing progress. A crash re-does at most one batch.
        let progress = JobProgress::new(0, total_posts, "Analyzing posts with AI...", total_posts);
        if !self.checkpoint(&mut job, progress).await? {
            return Ok(StageExit::Interrupted);
        }

        for (batch_no, batch) in posts.chunks(ANALYSIS_BATCH_SIZE).enumerate() {
            if !self.still_running(job.id).await? {
                return Ok(StageExit::Interrupted);
            }

            let outcomes = self.analyzer.analyze_batch(batch).await;
            let fallbacks = outcomes.iter().filter(|o| o.is_fallback()).count();
            if fallbacks > 0 {
                warn!(
                    job_id = %job.id,
                    batch = batch_no + 1,
                    fallbacks,
                    "Heuristic fallback used for part of the batch"
                );
            }

            let records: Vec<Post> = batch
                .iter()
                .cloned()
                .zip(outcomes)
                .map(|(raw, outcome)| raw.into_post(job.id, Some(outcome.into_analysis())))
                .collect();
            self.store
                .save_posts(job.id, &records)
                .await
                .context("Failed to persist analyzed posts")?;

            let done = (batch_no * ANALYSIS_BATCH_SIZE + batch.len()) as u32;
            let progress =
                JobProgress::new(done, total_posts, "Analyzing posts with AI...", total_posts);
            if !self.checkpoint(&mut job, progress).await? {
                return Ok(StageExit::Interrupted);
            }
        }

        // Stage 3: aggregate once over everything persisted for the job.
        let progress = JobProgress::new(
            total_posts,
            total_posts,
            "Generating insights and recommendations...",
            total_posts,
        );
        if !self.checkpoint(&mut job, progress).await? {
            return Ok(StageExit::Interrupted);
        }

        let stored = self
            .store
            .list_posts(job.id)
            .await
            .context("Failed to load posts for aggregation")?;
        let summary = insights::aggregate(&stored);
        let items = insights::derive_action_items(job.id, &summary, &stored);
        self.store
            .save_action_items(job.id, &items)
            .await
            .context("Failed to persist action items")?;

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.progress = JobProgress::new(total_posts, total_posts, "Complete", total_posts);
        self.store
            .save_job(&job)
            .await
            .context("Failed to mark job completed")?;

        info!(
            job_id = %job.id,
            posts = stored.len(),
            action_items = items.len(),
            "Job completed"
        );
        Ok(StageExit::Finished)
    }

    /// Poll the persisted status; true while the job should keep going.
    async fn still_running(&self, job_id: Uuid) -> Result<bool> {
        let status = self.store.get_job(job_id).await?.map(|j| j.status);
        Ok(matches!(status, Some(JobStatus::Running)))
    }

    /// Poll-then-write: persist new progress unless an external transition
    /// landed since the last commit.
    async fn checkpoint(&self, job: &mut Job, progress: JobProgress) -> Result<bool> {
        if !self.still_running(job.id).await? {
            return Ok(false);
        }
        job.progress = progress;
        self.store
            .save_job(job)
            .await
            .context("Failed to persist job progress")?;
        Ok(true)
    }

    async fn mark_failed(&self, job_id: Uuid, err: &anyhow::Error) {
        match self.store.get_job(job_id).await {
            Ok(Some(mut job)) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(format!("{err:#}"));
                if let Err(e) = self.store.save_job(&job).await {
                    error!(%job_id, error = %e, "Failed to record job failure");
                }
            }
            Ok(None) => {}
            Err(e) => error!(%job_id, error = %e, "Failed to load job while recording failure"),
        }
    }
}
