use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::domain::{group_into_stages, Job, Pipeline};
use crate::error::{ActionError, ConnectivityError, PollError, Result};
use crate::providers::poller::{PipelineFeed, PollingAdapter, PAGE_SIZE};
use crate::providers::{Backend, EventStream};

use super::client::GitLabClient;
use super::types::{map_status, GitLabJob, GitLabPipeline};

/// GitLab CI/CD source for one project.
///
/// Jobs are fetched per pipeline and grouped into stages in the order the stages first
/// appear, which is the order GitLab lists them.
pub struct GitLabProvider {
    client: Arc<GitLabClient>,
    project_path: String,
    adapter: PollingAdapter<GitLabClient>,
}

impl GitLabProvider {
    /// Creates a new GitLab provider for the specified project.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
    /// * `project_path` - Project path (e.g., "group/project"), also the source name
    /// * `token` - Optional authentication token
    /// * `interval` - Poll interval
    /// * `cancel` - Stops the poller when fired
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL cannot be constructed.
    pub fn new(
        base_url: &str,
        project_path: String,
        token: Option<Token>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        info!(
            "Initializing GitLab provider for {project_path} at {base_url} (token {})",
            token.as_ref().map_or_else(|| "MISSING".to_string(), Token::redacted)
        );

        let client = Arc::new(GitLabClient::new(base_url, &project_path, token.as_ref())?);
        let adapter = PollingAdapter::new(
            project_path.clone(),
            interval,
            Arc::clone(&client),
            cancel,
        );

        Ok(Self {
            client,
            project_path,
            adapter,
        })
    }
}

#[async_trait]
impl PipelineFeed for GitLabClient {
    async fn recent_pipelines(&self) -> std::result::Result<Vec<Pipeline>, PollError> {
        let listed = self.list_pipelines(PAGE_SIZE).await?;

        let mut pipelines = Vec::with_capacity(listed.len());
        for pipeline in listed {
            match self.pipeline_jobs(pipeline.id).await {
                Ok(jobs) => pipelines.push(normalize_pipeline(pipeline, jobs)),
                // Skipped for this cycle only, the next tick tries again.
                Err(e) => warn!("GitLab job fetch failed for pipeline {}: {e}", pipeline.id),
            }
        }

        Ok(pipelines)
    }
}

pub(super) fn normalize_pipeline(pipeline: GitLabPipeline, jobs: Vec<GitLabJob>) -> Pipeline {
    let status = map_status(&pipeline.status);

    let duration = match pipeline.updated_at {
        Some(updated) if !status.is_active() => (updated - pipeline.created_at).to_std().ok(),
        _ => None,
    };

    let (commit_message, author) = jobs
        .iter()
        .find_map(|job| job.commit.as_ref())
        .map(|commit| {
            let message = commit
                .title
                .clone()
                .or_else(|| commit.message.clone())
                .unwrap_or_default();
            (message, commit.author_name.clone().unwrap_or_default())
        })
        .unwrap_or_default();

    let stages = group_into_stages(jobs.into_iter().map(|job| {
        let stage = job.stage.clone();
        (stage, normalize_job(job))
    }));

    Pipeline {
        id: pipeline.id.to_string(),
        ref_: pipeline.ref_,
        commit_message,
        author,
        status,
        created_at: pipeline.created_at,
        duration,
        web_url: pipeline.web_url,
        stages,
    }
}

fn normalize_job(job: GitLabJob) -> Job {
    Job {
        id: job.id.to_string(),
        name: job.name,
        status: map_status(&job.status),
        started_at: job.started_at,
        duration: job
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
        web_url: job.web_url,
        allow_failure: job.allow_failure,
    }
}

#[async_trait]
impl Backend for GitLabProvider {
    fn kind_label(&self) -> &'static str {
        "GitLab"
    }

    async fn ping(&self) -> std::result::Result<(), ConnectivityError> {
        self.client.ping().await
    }

    fn subscribe(&self) -> EventStream {
        self.adapter.subscribe()
    }

    async fn retry_pipeline(&self, pipeline_id: &str) -> std::result::Result<(), ActionError> {
        info!("Retrying {} pipeline {pipeline_id}", self.project_path);
        self.client.act(&format!("pipelines/{pipeline_id}/retry")).await
    }

    async fn cancel_pipeline(&self, pipeline_id: &str) -> std::result::Result<(), ActionError> {
        info!("Cancelling {} pipeline {pipeline_id}", self.project_path);
        self.client.act(&format!("pipelines/{pipeline_id}/cancel")).await
    }

    async fn retry_job(&self, job_id: &str) -> std::result::Result<(), ActionError> {
        info!("Retrying {} job {job_id}", self.project_path);
        self.client.act(&format!("jobs/{job_id}/retry")).await
    }

    async fn get_job_log(&self, job_id: &str) -> std::result::Result<String, ActionError> {
        self.client.job_trace(job_id).await
    }
}
