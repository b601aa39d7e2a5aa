use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::Status;

/// GitHub Actions workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubWorkflowRun {
    /// Unique identifier for the workflow run
    pub id: u64,
    /// Head branch or tag name
    pub head_branch: Option<String>,
    /// Commit the run was triggered for
    pub head_commit: Option<GitHubCommit>,
    /// queued, in_progress, waiting, completed
    pub status: Option<String>,
    /// Conclusion of the run (success, failure, etc.)
    pub conclusion: Option<String>,
    /// When the run was created
    pub created_at: DateTime<Utc>,
    /// When the run actually started
    pub run_started_at: Option<DateTime<Utc>>,
    /// When the run was updated
    pub updated_at: Option<DateTime<Utc>>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommit {
    pub message: String,
    pub author: Option<GitHubCommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitAuthor {
    pub name: String,
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubJob {
    /// Unique identifier for the job
    pub id: u64,
    /// Name of the job
    pub name: String,
    /// Status of the job
    pub status: String,
    /// Conclusion of the job
    pub conclusion: Option<String>,
    /// When the job started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed
    pub completed_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
}

/// Response from GitHub API for workflow runs.
#[derive(Deserialize)]
pub(super) struct WorkflowRunsResponse {
    pub workflow_runs: Vec<GitHubWorkflowRun>,
}

/// Response from GitHub API for workflow jobs.
#[derive(Deserialize)]
pub(super) struct WorkflowJobsResponse {
    pub jobs: Vec<GitHubJob>,
}

/// Maps GitHub's `(status, conclusion)` pair onto the canonical status.
pub fn map_status(status: &str, conclusion: Option<&str>) -> Status {
    match status {
        "queued" | "in_progress" | "waiting" => Status::Running,
        "completed" => match conclusion {
            Some("success") => Status::Success,
            Some("cancelled") => Status::Canceled,
            Some("skipped") => Status::Skipped,
            _ => Status::Failed,
        },
        _ => Status::Pending,
    }
}
