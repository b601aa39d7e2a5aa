//! In-memory backend for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::Pipeline;
use crate::error::{ActionError, ActionKind, ConnectivityError, PollError};
use crate::providers::poller::{PipelineFeed, PollingAdapter};
use crate::providers::{Backend, EventStream};

pub struct FixedFeed(Vec<Pipeline>);

#[async_trait]
impl PipelineFeed for FixedFeed {
    async fn recent_pipelines(&self) -> Result<Vec<Pipeline>, PollError> {
        Ok(self.0.clone())
    }
}

/// Reports a fixed pipeline list once per hour and counts every remote action.
pub struct FakeBackend {
    adapter: PollingAdapter<FixedFeed>,
    calls: AtomicUsize,
    job_retry: bool,
}

impl FakeBackend {
    pub fn new(source: &str, pipelines: Vec<Pipeline>) -> Arc<Self> {
        Self::build(source, pipelines, true)
    }

    /// A backend that cannot retry single jobs.
    pub fn without_job_retry(source: &str) -> Arc<Self> {
        Self::build(source, Vec::new(), false)
    }

    fn build(source: &str, pipelines: Vec<Pipeline>, job_retry: bool) -> Arc<Self> {
        Arc::new(Self {
            adapter: PollingAdapter::new(
                source.to_string(),
                Duration::from_secs(3600),
                Arc::new(FixedFeed(pipelines)),
                CancellationToken::new(),
            ),
            calls: AtomicUsize::new(0),
            job_retry,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn kind_label(&self) -> &'static str {
        "Fake"
    }

    async fn ping(&self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        self.adapter.subscribe()
    }

    async fn retry_pipeline(&self, _pipeline_id: &str) -> Result<(), ActionError> {
        self.record();
        Ok(())
    }

    async fn cancel_pipeline(&self, _pipeline_id: &str) -> Result<(), ActionError> {
        self.record();
        Ok(())
    }

    async fn retry_job(&self, _job_id: &str) -> Result<(), ActionError> {
        self.record();
        if self.job_retry {
            Ok(())
        } else {
            Err(ActionError::Unsupported {
                action: ActionKind::RetryJob,
                backend: "Fake",
                hint: "retry the pipeline".to_string(),
            })
        }
    }

    async fn get_job_log(&self, job_id: &str) -> Result<String, ActionError> {
        self.record();
        Ok((1..=40).map(|n| format!("{job_id} line {n}\n")).collect())
    }
}
