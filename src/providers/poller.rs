//! Fixed-interval polling adapter shared by every backend.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::domain::{Event, Pipeline};
use crate::error::PollError;

/// Number of pipelines requested per poll, most recent first.
pub const PAGE_SIZE: usize = 5;

const EVENT_BUFFER: usize = 64;

/// Source of canonical pipelines for one backend connection.
#[async_trait]
pub trait PipelineFeed: Send + Sync + 'static {
    /// Current list of recent pipelines, normalized with their stages and jobs.
    async fn recent_pipelines(&self) -> Result<Vec<Pipeline>, PollError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    Polling,
    /// Last cycle failed, waiting for the next tick.
    Backoff,
}

/// Shared handle to a source's live event stream.
#[derive(Clone)]
pub struct EventStream {
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
}

impl EventStream {
    /// Next event, or `None` once the adapter has stopped.
    pub async fn next(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }
}

pub struct PollingAdapter<F> {
    source: String,
    interval: Duration,
    feed: Arc<F>,
    cancel: CancellationToken,
    stream: OnceLock<EventStream>,
    state: watch::Sender<AdapterState>,
}

impl<F: PipelineFeed> PollingAdapter<F> {
    pub fn new(
        source: String,
        interval: Duration,
        feed: Arc<F>,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(AdapterState::Idle);
        Self {
            source,
            interval,
            feed,
            cancel,
            stream: OnceLock::new(),
            state,
        }
    }

    /// Starts the poll loop once; every call returns the same stream.
    pub fn subscribe(&self) -> EventStream {
        self.stream.get_or_init(|| self.start()).clone()
    }

    #[cfg(test)]
    pub fn state(&self) -> AdapterState {
        *self.state.borrow()
    }

    fn start(&self) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let poll_loop = PollLoop {
            source: self.source.clone(),
            interval: self.interval,
            feed: Arc::clone(&self.feed),
            cancel: self.cancel.clone(),
            state: self.state.clone(),
            tx,
        };
        tokio::spawn(poll_loop.run());

        EventStream {
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

struct PollLoop<F> {
    source: String,
    interval: Duration,
    feed: Arc<F>,
    cancel: CancellationToken,
    state: watch::Sender<AdapterState>,
    tx: mpsc::Sender<Event>,
}

impl<F: PipelineFeed> PollLoop<F> {
    async fn run(self) {
        info!("Subscribed to {} (every {:?})", self.source, self.interval);

        // The first tick completes immediately, so the UI is populated right away.
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'poll: loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break 'poll,
                _ = ticker.tick() => {}
            }

            self.state.send_replace(AdapterState::Polling);
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break 'poll,
                outcome = self.feed.recent_pipelines() => outcome,
            };

            let events = match outcome {
                Ok(pipelines) => {
                    debug!("{}: fetched {} pipelines", self.source, pipelines.len());
                    self.state.send_replace(AdapterState::Idle);
                    pipelines
                        .into_iter()
                        .map(|pipeline| Event::Update {
                            source: self.source.clone(),
                            pipeline,
                        })
                        .collect()
                }
                Err(cause) => {
                    warn!("{}: poll failed: {cause}", self.source);
                    self.state.send_replace(AdapterState::Backoff);
                    vec![Event::Error {
                        source: self.source.clone(),
                        cause,
                    }]
                }
            };

            for event in events {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break 'poll,
                    sent = self.tx.send(event) => {
                        if sent.is_err() {
                            debug!("{}: event stream dropped", self.source);
                            break 'poll;
                        }
                    }
                }
            }
        }

        self.state.send_replace(AdapterState::Idle);
        info!("Stopped polling {}", self.source);
    }
}
