use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

use crate::auth::Token;
use crate::error::{ActionError, CiWatchError, ConnectivityError, PollError, Result};
use crate::providers::http;

use super::types::{GitHubJob, GitHubWorkflowRun, WorkflowJobsResponse, WorkflowRunsResponse};

/// GitHub REST client scoped to one repository.
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL for GitHub API
    base_url: String,
    /// Repository owner
    owner: String,
    /// Repository name
    repo: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, owner: String, repo: String, token: &Token) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
            .map_err(|e| CiWatchError::Config(format!("Invalid GitHub token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        Ok(Self {
            client: http::build_client(headers)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            owner,
            repo,
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url, self.owner, self.repo, path
        )
    }

    pub async fn recent_runs(&self, per_page: usize) -> std::result::Result<Vec<GitHubWorkflowRun>, PollError> {
        let url = self.repo_url(&format!("actions/runs?per_page={per_page}"));
        let response: WorkflowRunsResponse = http::fetch_json(self.client.get(url)).await?;
        Ok(response.workflow_runs)
    }

    pub async fn run_jobs(&self, run_id: u64) -> std::result::Result<Vec<GitHubJob>, PollError> {
        let url = self.repo_url(&format!("actions/runs/{run_id}/jobs"));
        let response: WorkflowJobsResponse = http::fetch_json(self.client.get(url)).await?;
        Ok(response.jobs)
    }

    pub async fn ping(&self) -> std::result::Result<(), ConnectivityError> {
        http::probe(self.client.get(format!("{}/user", self.base_url))).await
    }

    pub async fn rerun(&self, run_id: &str) -> std::result::Result<(), ActionError> {
        let url = self.repo_url(&format!("actions/runs/{run_id}/rerun"));
        http::fire(self.client.post(url)).await
    }

    pub async fn cancel(&self, run_id: &str) -> std::result::Result<(), ActionError> {
        let url = self.repo_url(&format!("actions/runs/{run_id}/cancel"));
        http::fire(self.client.post(url)).await
    }

    /// The API answers with a redirect to the raw log, which reqwest follows.
    pub async fn job_log(&self, job_id: &str) -> std::result::Result<String, ActionError> {
        let url = self.repo_url(&format!("actions/jobs/{job_id}/logs"));
        http::fetch_text(self.client.get(url)).await
    }
}
