use std::fmt;

use thiserror::Error;

/// A backend could not be reached or rejected the credentials. Surfaced once at startup.
#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication rejected (status {status})")]
    Unauthorized { status: u16 },

    #[error("unexpected status {status}")]
    Status { status: u16 },
}

/// One poll cycle failed. Non-fatal, the adapter retries on its next tick.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API request failed with status {status}")]
    Status { status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

/// User-triggered remote actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    RetryPipeline,
    CancelPipeline,
    RetryJob,
    FetchLog,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::RetryPipeline => "retry pipeline",
            ActionKind::CancelPipeline => "cancel pipeline",
            ActionKind::RetryJob => "retry job",
            ActionKind::FetchLog => "fetch log",
        };
        f.write_str(label)
    }
}

/// A remote action failed. Shown in the status line, never retried automatically.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{action} is not supported by {backend}: {hint}")]
    Unsupported {
        action: ActionKind,
        backend: &'static str,
        hint: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request rejected with status {status}")]
    Rejected { status: u16 },

    #[error("{0}")]
    Backend(String),
}

/// An action targets a source that has no registered backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no backend registered for source '{0}'")]
pub struct NotFoundError(pub String);

#[derive(Error, Debug)]
pub enum CiWatchError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Source '{name}' is unreachable: {cause}")]
    Connectivity {
        name: String,
        cause: ConnectivityError,
    },

    #[error("No usable sources: every configured source failed to start")]
    NoSources,
}

pub type Result<T> = std::result::Result<T, CiWatchError>;
