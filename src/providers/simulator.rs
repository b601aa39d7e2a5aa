//! Offline backend that fabricates self-consistent, evolving pipelines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{roll_up, Job, Pipeline, Stage, Status};
use crate::error::{ActionError, ConnectivityError, PollError};
use crate::providers::poller::{PipelineFeed, PollingAdapter};
use crate::providers::{Backend, EventStream};

const JOB_SUCCESS_RATE: f64 = 0.9;
const FAILED_RESTART_RATE: f64 = 0.2;
const GREEN_RESTART_RATE: f64 = 0.1;

pub struct SimulatorBackend {
    name: String,
    world: Arc<SimulatedWorld>,
    adapter: PollingAdapter<SimulatedWorld>,
}

impl SimulatorBackend {
    pub fn new(name: String, interval: Duration, cancel: CancellationToken) -> Self {
        Self::with_rng(name, interval, cancel, StdRng::from_entropy())
    }

    /// Reproducible simulation.
    #[cfg(test)]
    pub fn with_seed(name: String, interval: Duration, cancel: CancellationToken, seed: u64) -> Self {
        Self::with_rng(name, interval, cancel, StdRng::seed_from_u64(seed))
    }

    fn with_rng(name: String, interval: Duration, cancel: CancellationToken, rng: StdRng) -> Self {
        info!("Initializing simulator source {name}");
        let world = Arc::new(SimulatedWorld {
            state: Mutex::new(WorldState::seeded(rng)),
        });
        let adapter = PollingAdapter::new(name.clone(), interval, Arc::clone(&world), cancel);
        Self {
            name,
            world,
            adapter,
        }
    }
}

pub struct SimulatedWorld {
    state: Mutex<WorldState>,
}

struct WorldState {
    pipelines: Vec<Pipeline>,
    rng: StdRng,
    iteration: u32,
    started: bool,
}

#[async_trait]
impl PipelineFeed for SimulatedWorld {
    async fn recent_pipelines(&self) -> Result<Vec<Pipeline>, PollError> {
        let mut state = self.state.lock().await;
        // The first poll reports the seed state untouched.
        if state.started {
            state.advance();
        }
        state.started = true;
        Ok(state.pipelines.clone())
    }
}

impl WorldState {
    fn seeded(rng: StdRng) -> Self {
        let now = Utc::now();
        let seeds = [
            ("1", "main", "Max", "feat: kernel config", Status::Running,
                [Status::Success, Status::Running, Status::Pending]),
            ("2", "feature/audit", "Bot", "fix: gitleaks rules", Status::Pending,
                [Status::Pending, Status::Pending, Status::Pending]),
            ("3", "fix/ui", "Max", "chore: update deps", Status::Failed,
                [Status::Success, Status::Failed, Status::Pending]),
        ];

        let pipelines = seeds
            .into_iter()
            .enumerate()
            .map(|(age, (id, ref_, author, message, status, job_statuses))| {
                let names = ["build", "test", "deploy"];
                let stages = names
                    .iter()
                    .zip(job_statuses)
                    .enumerate()
                    .map(|(n, (stage, job_status))| {
                        let job = Job {
                            id: format!("{id}-{n}"),
                            name: format!("{stage}-job"),
                            status: job_status,
                            started_at: (job_status != Status::Pending).then_some(now),
                            duration: None,
                            web_url: String::new(),
                            allow_failure: false,
                        };
                        Stage::new(*stage, vec![job])
                    })
                    .collect();

                Pipeline {
                    id: id.to_string(),
                    ref_: ref_.to_string(),
                    commit_message: message.to_string(),
                    author: author.to_string(),
                    status,
                    created_at: now - chrono::Duration::minutes(age as i64 * 7),
                    duration: None,
                    web_url: String::new(),
                    stages,
                }
            })
            .collect();

        Self {
            pipelines,
            rng,
            iteration: 0,
            started: false,
        }
    }

    /// Moves one random pipeline a step forward.
    fn advance(&mut self) {
        if self.pipelines.is_empty() {
            return;
        }
        let index = self.rng.gen_range(0..self.pipelines.len());
        self.step(index);
    }

    fn step(&mut self, index: usize) {
        let now = Utc::now();
        let positions = job_positions(&self.pipelines[index]);
        let mut all_done = true;

        for (n, &(s, j)) in positions.iter().enumerate() {
            let status = self.pipelines[index].stages[s].jobs[j].status;
            match status {
                Status::Running => {
                    let succeeded = self.rng.gen_bool(JOB_SUCCESS_RATE);
                    let pipeline = &mut self.pipelines[index];
                    let job = &mut pipeline.stages[s].jobs[j];
                    job.status = if succeeded { Status::Success } else { Status::Failed };
                    job.duration = job.started_at.and_then(|started| (now - started).to_std().ok());

                    if !succeeded {
                        pipeline.status = Status::Failed;
                    } else if let Some(&(ns, nj)) = positions.get(n + 1) {
                        let next = &mut pipeline.stages[ns].jobs[nj];
                        next.status = Status::Running;
                        next.started_at = Some(now);
                    } else {
                        pipeline.status = Status::Success;
                        pipeline.duration = (now - pipeline.created_at).to_std().ok();
                    }
                    all_done = false;
                    break;
                }
                Status::Pending => {
                    let ready = n == 0 || {
                        let (ps, pj) = positions[n - 1];
                        self.pipelines[index].stages[ps].jobs[pj].status == Status::Success
                    };
                    if ready {
                        let pipeline = &mut self.pipelines[index];
                        let job = &mut pipeline.stages[s].jobs[j];
                        job.status = Status::Running;
                        job.started_at = Some(now);
                        pipeline.status = Status::Running;
                    }
                    all_done = false;
                    break;
                }
                Status::Failed | Status::Canceled => {
                    if self.rng.gen_bool(FAILED_RESTART_RATE) {
                        self.reset(index);
                    }
                    all_done = false;
                    break;
                }
                Status::Success | Status::Skipped | Status::Manual => {}
            }
        }

        if all_done && self.rng.gen_bool(GREEN_RESTART_RATE) {
            self.reset(index);
        }
        refresh_stages(&mut self.pipelines[index]);
    }

    fn reset(&mut self, index: usize) {
        self.iteration += 1;
        let pipeline = &mut self.pipelines[index];
        pipeline.status = Status::Pending;
        pipeline.duration = None;
        pipeline.created_at = Utc::now();
        pipeline.commit_message = format!("update: iteration {}", self.iteration);
        for job in pipeline.stages.iter_mut().flat_map(|s| s.jobs.iter_mut()) {
            job.status = Status::Pending;
            job.started_at = None;
            job.duration = None;
        }
        refresh_stages(pipeline);
    }

    fn pipeline_index(&self, pipeline_id: &str) -> Result<usize, ActionError> {
        self.pipelines
            .iter()
            .position(|p| p.id == pipeline_id)
            .ok_or_else(|| ActionError::Backend(format!("unknown pipeline {pipeline_id}")))
    }

    fn job_location(&self, job_id: &str) -> Result<(usize, usize, usize), ActionError> {
        self.pipelines
            .iter()
            .enumerate()
            .find_map(|(p, pipeline)| {
                job_positions(pipeline)
                    .into_iter()
                    .find(|&(s, j)| pipeline.stages[s].jobs[j].id == job_id)
                    .map(|(s, j)| (p, s, j))
            })
            .ok_or_else(|| ActionError::Backend(format!("unknown job {job_id}")))
    }
}

fn job_positions(pipeline: &Pipeline) -> Vec<(usize, usize)> {
    pipeline
        .stages
        .iter()
        .enumerate()
        .flat_map(|(s, stage)| (0..stage.jobs.len()).map(move |j| (s, j)))
        .collect()
}

fn refresh_stages(pipeline: &mut Pipeline) {
    for stage in &mut pipeline.stages {
        stage.status = roll_up(&stage.jobs);
    }
}

#[async_trait]
impl Backend for SimulatorBackend {
    fn kind_label(&self) -> &'static str {
        "Simulator"
    }

    async fn ping(&self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        self.adapter.subscribe()
    }

    async fn retry_pipeline(&self, pipeline_id: &str) -> Result<(), ActionError> {
        let mut state = self.world.state.lock().await;
        let index = state.pipeline_index(pipeline_id)?;
        state.reset(index);
        info!("{}: pipeline {pipeline_id} restarted", self.name);
        Ok(())
    }

    async fn cancel_pipeline(&self, pipeline_id: &str) -> Result<(), ActionError> {
        let mut state = self.world.state.lock().await;
        let index = state.pipeline_index(pipeline_id)?;
        let pipeline = &mut state.pipelines[index];
        if !pipeline.status.is_active() {
            return Err(ActionError::Backend(format!(
                "pipeline {pipeline_id} is already {}",
                pipeline.status
            )));
        }
        pipeline.status = Status::Canceled;
        for job in pipeline.stages.iter_mut().flat_map(|s| s.jobs.iter_mut()) {
            if job.status.is_active() {
                job.status = Status::Canceled;
            }
        }
        refresh_stages(pipeline);
        Ok(())
    }

    async fn retry_job(&self, job_id: &str) -> Result<(), ActionError> {
        let mut state = self.world.state.lock().await;
        let (p, s, j) = state.job_location(job_id)?;
        let pipeline = &mut state.pipelines[p];
        let job = &mut pipeline.stages[s].jobs[j];
        if job.status.is_active() {
            return Err(ActionError::Backend(format!("job {job_id} is still {}", job.status)));
        }
        job.status = Status::Pending;
        job.started_at = None;
        job.duration = None;
        pipeline.status = Status::Running;
        refresh_stages(pipeline);
        Ok(())
    }

    async fn get_job_log(&self, job_id: &str) -> Result<String, ActionError> {
        let state = self.world.state.lock().await;
        let (p, s, j) = state.job_location(job_id)?;
        let pipeline = &state.pipelines[p];
        let job = &pipeline.stages[s].jobs[j];

        let mut log = format!(
            "Running job {} ({}) for {} on {}\n",
            job.name, job.id, pipeline.id, pipeline.ref_
        );
        log.push_str(&format!("$ make {}\n", pipeline.stages[s].name));
        for step in 1..=12 {
            log.push_str(&format!("[{step:02}] {} step {step} ok\n", job.name));
        }
        log.push_str(&format!("Job finished with status: {}\n", job.status));
        Ok(log)
    }
}
