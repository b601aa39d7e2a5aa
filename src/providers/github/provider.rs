use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::domain::{Job, Pipeline, Stage};
use crate::error::{ActionError, ActionKind, CiWatchError, ConnectivityError, PollError, Result};
use crate::providers::poller::{PipelineFeed, PollingAdapter, PAGE_SIZE};
use crate::providers::{Backend, EventStream};

use super::client::GitHubClient;
use super::types::{map_status, GitHubJob, GitHubWorkflowRun};

const KIND_LABEL: &str = "GitHub Actions";

/// GitHub has no stages, every job of a run lands in this one.
const WORKFLOW_STAGE: &str = "Workflow";

/// GitHub Actions source for one `owner/repo`.
pub struct GitHubProvider {
    /// GitHub API client
    client: Arc<GitHubClient>,
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
    adapter: PollingAdapter<GitHubClient>,
}

impl GitHubProvider {
    /// Create a new GitHub Actions provider.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL
    /// * `project_path` - Repository path in format "owner/repo", also the source name
    /// * `token` - GitHub personal access token, required
    /// * `interval` - Poll interval
    /// * `cancel` - Stops the poller when fired
    pub fn new(
        base_url: String,
        project_path: String,
        token: Option<Token>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let parts: Vec<&str> = project_path.split('/').collect();
        let (owner, repo) = match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
                (owner.to_string(), repo.to_string())
            }
            _ => {
                return Err(CiWatchError::Config(format!(
                    "Project path must be in format 'owner/repo', got '{project_path}'"
                )))
            }
        };

        let token = token.ok_or_else(|| {
            CiWatchError::Config(format!("Missing GitHub token for {project_path}"))
        })?;

        info!(
            "Initializing GitHub provider for {project_path} (token {})",
            token.redacted()
        );

        let client = Arc::new(GitHubClient::new(
            &base_url,
            owner.clone(),
            repo.clone(),
            &token,
        )?);
        let adapter = PollingAdapter::new(project_path, interval, Arc::clone(&client), cancel);

        Ok(Self {
            client,
            owner,
            repo,
            adapter,
        })
    }
}

#[async_trait]
impl PipelineFeed for GitHubClient {
    async fn recent_pipelines(&self) -> std::result::Result<Vec<Pipeline>, PollError> {
        let runs = self.recent_runs(PAGE_SIZE).await?;

        let mut pipelines = Vec::with_capacity(runs.len());
        for run in runs {
            let jobs = match self.run_jobs(run.id).await {
                Ok(jobs) => Some(jobs),
                Err(e) => {
                    warn!("Failed to fetch jobs for run {}: {e}", run.id);
                    None
                }
            };
            pipelines.push(normalize_run(run, jobs));
        }

        Ok(pipelines)
    }
}

/// Builds the canonical pipeline. Without a job list the pipeline has no stages.
pub(super) fn normalize_run(run: GitHubWorkflowRun, jobs: Option<Vec<GitHubJob>>) -> Pipeline {
    let status = map_status(run.status.as_deref().unwrap_or_default(), run.conclusion.as_deref());

    let duration = match (run.run_started_at, run.updated_at) {
        (Some(started), Some(updated)) if !status.is_active() => (updated - started).to_std().ok(),
        _ => None,
    };

    let (commit_message, author) = run
        .head_commit
        .map(|commit| {
            let author = commit.author.map(|a| a.name).unwrap_or_default();
            (commit.message, author)
        })
        .unwrap_or_default();

    let stages = jobs
        .map(|jobs| {
            let jobs = jobs.into_iter().map(normalize_job).collect();
            vec![Stage::new(WORKFLOW_STAGE, jobs)]
        })
        .unwrap_or_default();

    Pipeline {
        id: run.id.to_string(),
        ref_: run.head_branch.unwrap_or_default(),
        commit_message,
        author,
        status,
        created_at: run.created_at,
        duration,
        web_url: run.html_url,
        stages,
    }
}

fn normalize_job(job: GitHubJob) -> Job {
    let duration = match (job.started_at, job.completed_at) {
        (Some(started), Some(completed)) => (completed - started).to_std().ok(),
        _ => None,
    };

    Job {
        id: job.id.to_string(),
        name: job.name,
        status: map_status(&job.status, job.conclusion.as_deref()),
        started_at: job.started_at,
        duration,
        web_url: job.html_url.unwrap_or_default(),
        allow_failure: false,
    }
}

#[async_trait]
impl Backend for GitHubProvider {
    fn kind_label(&self) -> &'static str {
        KIND_LABEL
    }

    async fn ping(&self) -> std::result::Result<(), ConnectivityError> {
        self.client.ping().await
    }

    fn subscribe(&self) -> EventStream {
        self.adapter.subscribe()
    }

    async fn retry_pipeline(&self, pipeline_id: &str) -> std::result::Result<(), ActionError> {
        info!("Re-running {}/{} run {pipeline_id}", self.owner, self.repo);
        self.client.rerun(pipeline_id).await
    }

    async fn cancel_pipeline(&self, pipeline_id: &str) -> std::result::Result<(), ActionError> {
        info!("Cancelling {}/{} run {pipeline_id}", self.owner, self.repo);
        self.client.cancel(pipeline_id).await
    }

    async fn retry_job(&self, _job_id: &str) -> std::result::Result<(), ActionError> {
        Err(ActionError::Unsupported {
            action: ActionKind::RetryJob,
            backend: KIND_LABEL,
            hint: "retry the whole run from the pipeline row".to_string(),
        })
    }

    async fn get_job_log(&self, job_id: &str) -> std::result::Result<String, ActionError> {
        self.client.job_log(job_id).await
    }
}
