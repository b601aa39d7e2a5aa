use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::PollError;

/// Canonical status vocabulary every backend maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Canceled,
    Manual,
}

impl Status {
    /// Whether the entity has not reached a terminal state yet.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Pending | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Canceled => "canceled",
            Status::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// A single job inside a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Backend-native job identifier
    pub id: String,
    pub name: String,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub web_url: String,
    /// A failure of this job does not fail its stage
    pub allow_failure: bool,
}

/// A named group of jobs. Jobs keep first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub status: Status,
    pub jobs: Vec<Job>,
}

impl Stage {
    /// Builds a stage whose status is rolled up from its jobs.
    pub fn new(name: impl Into<String>, jobs: Vec<Job>) -> Self {
        let status = roll_up(&jobs);
        Self {
            name: name.into(),
            status,
            jobs,
        }
    }
}

/// Stage roll-up: `Failed` if any job that may not fail has failed, else `Running`
/// while anything is pending or running, else `Success`.
pub fn roll_up(jobs: &[Job]) -> Status {
    if jobs
        .iter()
        .any(|job| job.status == Status::Failed && !job.allow_failure)
    {
        Status::Failed
    } else if jobs.iter().any(|job| job.status.is_active()) {
        Status::Running
    } else {
        Status::Success
    }
}

/// Groups jobs into stages, keeping the order in which stage names first appear.
pub fn group_into_stages<I>(jobs: I) -> Vec<Stage>
where
    I: IntoIterator<Item = (String, Job)>,
{
    let mut grouped: Vec<(String, Vec<Job>)> = Vec::new();

    for (stage_name, job) in jobs {
        match grouped.iter_mut().find(|(name, _)| *name == stage_name) {
            Some((_, stage_jobs)) => stage_jobs.push(job),
            None => grouped.push((stage_name, vec![job])),
        }
    }

    grouped
        .into_iter()
        .map(|(name, jobs)| Stage::new(name, jobs))
        .collect()
}

/// One pipeline run as reported by a backend.
///
/// `status` is authoritative from the backend and is never recomputed from the stages,
/// so it may disagree with the stage roll-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Backend-native pipeline identifier
    pub id: String,
    /// Branch or tag
    pub ref_: String,
    pub commit_message: String,
    pub author: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub web_url: String,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Jobs across all stages in stage order, then job order within the stage.
    ///
    /// This is the only order used both for rendering and for resolving the job cursor.
    pub fn flattened_jobs(&self) -> impl Iterator<Item = (&Stage, &Job)> {
        self.stages
            .iter()
            .flat_map(|stage| stage.jobs.iter().map(move |job| (stage, job)))
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.jobs.len()).sum()
    }

    pub fn job_at(&self, index: usize) -> Option<&Job> {
        self.flattened_jobs().nth(index).map(|(_, job)| job)
    }
}

/// Composite identity `source#pipelineID` of a pipeline inside the dashboard table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineKey(String);

impl PipelineKey {
    pub fn new(source: &str, pipeline_id: &str) -> Self {
        Self(format!("{source}#{pipeline_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display order: newest first, ties broken by key for determinism.
pub fn display_order(a: (&PipelineKey, &Pipeline), b: (&PipelineKey, &Pipeline)) -> Ordering {
    b.1.created_at
        .cmp(&a.1.created_at)
        .then_with(|| a.0.cmp(b.0))
}

/// The only mutation channel for pipeline state inside the dashboard.
#[derive(Debug)]
pub enum Event {
    Update { source: String, pipeline: Pipeline },
    Error { source: String, cause: PollError },
}
