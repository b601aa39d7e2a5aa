use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::Status;

/// A GitLab CI/CD pipeline as returned by the pipelines listing.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabPipeline {
    pub id: u64,
    /// Pipeline status (e.g., "running", "success")
    pub status: String,
    /// Git reference that triggered the pipeline (e.g., "main", "develop")
    #[serde(rename = "ref")]
    pub ref_: String,
    pub web_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A job within a GitLab CI/CD pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabJob {
    pub id: u64,
    /// Job name as defined in .gitlab-ci.yml
    pub name: String,
    /// Stage this job belongs to
    pub stage: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    /// Job execution duration in seconds
    pub duration: Option<f64>,
    pub web_url: String,
    #[serde(default)]
    pub allow_failure: bool,
    pub commit: Option<GitLabCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabCommit {
    pub title: Option<String>,
    pub message: Option<String>,
    pub author_name: Option<String>,
}

pub fn map_status(status: &str) -> Status {
    match status {
        "success" => Status::Success,
        "failed" => Status::Failed,
        "running" => Status::Running,
        "skipped" => Status::Skipped,
        "canceled" => Status::Canceled,
        "manual" => Status::Manual,
        _ => Status::Pending,
    }
}
