//! CI backends and the capability surface the dashboard relies on.
//!
//! Every backend is a standalone implementer of [`Backend`]. The polling loop shared by
//! all of them lives in [`poller`]; each backend only supplies a [`poller::PipelineFeed`]
//! that turns its native responses into canonical pipelines.

mod github;
mod gitlab;
mod http;
pub mod poller;
mod simulator;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::error::{ActionError, CiWatchError, ConnectivityError, Result};

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use poller::EventStream;
pub use simulator::SimulatorBackend;

/// Capability surface of one configured CI source.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label of the CI system, used in messages.
    fn kind_label(&self) -> &'static str;

    /// Best-effort reachability and credential check. Only used at startup.
    async fn ping(&self) -> std::result::Result<(), ConnectivityError>;

    /// Starts polling on the first call. Later calls hand out the same live stream.
    fn subscribe(&self) -> EventStream;

    async fn retry_pipeline(&self, pipeline_id: &str) -> std::result::Result<(), ActionError>;

    async fn cancel_pipeline(&self, pipeline_id: &str) -> std::result::Result<(), ActionError>;

    async fn retry_job(&self, job_id: &str) -> std::result::Result<(), ActionError>;

    /// Full current log text of one job, already de-framed.
    async fn get_job_log(&self, job_id: &str) -> std::result::Result<String, ActionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
    Gitlab,
    #[serde(alias = "mock")]
    Simulator,
}

impl SourceKind {
    /// Fixed poll interval. Rate-limited REST APIs get the conservative values.
    pub fn default_poll_interval(self) -> Duration {
        match self {
            SourceKind::Github => Duration::from_secs(10),
            SourceKind::Gitlab => Duration::from_secs(5),
            SourceKind::Simulator => Duration::from_millis(800),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::Github => "github",
            SourceKind::Gitlab => "gitlab",
            SourceKind::Simulator => "simulator",
        };
        f.write_str(label)
    }
}

/// Registration of one source: kind, name, credentials and endpoint.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub name: String,
    pub token: Option<Token>,
    pub endpoint: Option<String>,
    pub poll_interval: Option<Duration>,
    /// Run `ping` before the source is admitted.
    pub validate: bool,
}

impl SourceSpec {
    pub fn new(kind: SourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            token: None,
            endpoint: None,
            poll_interval: None,
            validate: false,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| self.kind.default_poll_interval())
    }
}

/// Constructs the backend declared by `spec`. Its poller stops when `cancel` fires.
pub fn build_backend(spec: &SourceSpec, cancel: CancellationToken) -> Result<Arc<dyn Backend>> {
    let interval = spec.poll_interval();
    if interval.is_zero() {
        return Err(CiWatchError::Config(format!(
            "Poll interval of source '{}' must be greater than zero",
            spec.name
        )));
    }

    let backend: Arc<dyn Backend> = match spec.kind {
        SourceKind::Github => Arc::new(GitHubProvider::new(
            spec.endpoint
                .clone()
                .unwrap_or_else(|| github::DEFAULT_BASE_URL.to_string()),
            spec.name.clone(),
            spec.token.clone(),
            interval,
            cancel,
        )?),
        SourceKind::Gitlab => Arc::new(GitLabProvider::new(
            spec.endpoint.as_deref().unwrap_or(gitlab::DEFAULT_BASE_URL),
            spec.name.clone(),
            spec.token.clone(),
            interval,
            cancel,
        )?),
        SourceKind::Simulator => Arc::new(SimulatorBackend::new(spec.name.clone(), interval, cancel)),
    };

    Ok(backend)
}
