//! Dashboard state machine.
//!
//! The [`Dashboard`] owns the pipeline table and every piece of view state. It is driven
//! one [`Message`] at a time and never performs I/O itself: remote actions come back out
//! of [`Dashboard::handle`] as an [`Effect`] for the runtime to spawn, and their results
//! re-enter the loop as messages.

pub mod keymap;
mod render;
mod styling;
pub mod terminal;


use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::aggregator::SourceRegistry;
use crate::domain::{display_order, Event, Job, Pipeline, PipelineKey};
use crate::error::{ActionError, ActionKind};
use crate::providers::Backend;

pub use keymap::KeyContext;
pub use render::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scroll {
    Up,
    Down,
    PageUp,
    PageDown,
    Top,
    Bottom,
}

/// Input-method independent command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Navigate(Direction),
    ToggleFocus,
    ToggleExpand,
    /// Expand the focused pipeline and move into its jobs.
    Open,
    /// Leave job focus.
    Back,
    RetryFocused,
    CancelFocused,
    ViewLogsFocused,
    CloseLogs,
    Scroll(Scroll),
    Quit,
}

/// A remote operation against one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    RetryPipeline { pipeline_id: String },
    CancelPipeline { pipeline_id: String },
    RetryJob { job_id: String },
    FetchLog { job_id: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::RetryPipeline { .. } => ActionKind::RetryPipeline,
            Action::CancelPipeline { .. } => ActionKind::CancelPipeline,
            Action::RetryJob { .. } => ActionKind::RetryJob,
            Action::FetchLog { .. } => ActionKind::FetchLog,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Action::RetryPipeline { pipeline_id } | Action::CancelPipeline { pipeline_id } => {
                pipeline_id
            }
            Action::RetryJob { job_id } | Action::FetchLog { job_id } => job_id,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.target())
    }
}

/// Everything the dashboard loop reacts to.
#[derive(Debug)]
pub enum Message {
    Feed(Event),
    Input(Command),
    ActionFinished {
        source: String,
        action: Action,
        outcome: Result<(), ActionError>,
    },
    LogLoaded {
        source: String,
        job_id: String,
        outcome: Result<String, ActionError>,
    },
    Resize {
        width: u16,
        height: u16,
    },
}

/// What the runtime has to do after a message was handled.
#[derive(Debug)]
pub enum Effect {
    None,
    Quit,
    Dispatch(ActionRequest),
}

/// A resolved action, ready to run off the dashboard loop.
pub struct ActionRequest {
    backend: Arc<dyn Backend>,
    pub source: String,
    pub action: Action,
}

impl fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRequest")
            .field("backend", &self.backend.kind_label())
            .field("source", &self.source)
            .field("action", &self.action)
            .finish()
    }
}

impl ActionRequest {
    /// Performs the call and wraps its outcome as a message for the dashboard loop.
    pub async fn run(self) -> Message {
        let ActionRequest {
            backend,
            source,
            action,
        } = self;

        let outcome = match &action {
            Action::RetryPipeline { pipeline_id } => backend.retry_pipeline(pipeline_id).await,
            Action::CancelPipeline { pipeline_id } => backend.cancel_pipeline(pipeline_id).await,
            Action::RetryJob { job_id } => backend.retry_job(job_id).await,
            Action::FetchLog { job_id } => {
                let outcome = backend.get_job_log(job_id).await;
                return Message::LogLoaded {
                    source,
                    job_id: job_id.clone(),
                    outcome,
                };
            }
        };

        Message::ActionFinished {
            source,
            action,
            outcome,
        }
    }

    pub fn spawn(self, results: mpsc::Sender<Message>) {
        tokio::spawn(async move {
            let message = self.run().await;
            if results.send(message).await.is_err() {
                debug!("Dashboard closed before an action result arrived");
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// Transient one-line message at the bottom of the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub level: Level,
    pub text: String,
}

impl StatusLine {
    fn info(text: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogContent {
    Loading,
    Loaded(Vec<String>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogView {
    pub source: String,
    pub job_id: String,
    pub job_name: String,
    pub content: LogContent,
    /// Index of the first visible line.
    pub scroll: usize,
}

impl LogView {
    fn line_count(&self) -> usize {
        match &self.content {
            LogContent::Loaded(lines) => lines.len(),
            LogContent::Loading | LogContent::Failed(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Logs(LogView),
}

#[derive(Debug, Clone)]
struct Entry {
    source: String,
    pipeline: Pipeline,
}

pub struct Dashboard {
    registry: SourceRegistry,
    table: HashMap<PipelineKey, Entry>,
    /// Table keys in display order.
    order: Vec<PipelineKey>,
    cursor: usize,
    child_focus: bool,
    child_cursor: usize,
    expanded: HashSet<PipelineKey>,
    view: View,
    status: Option<StatusLine>,
    width: u16,
    height: u16,
}

impl Dashboard {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            table: HashMap::new(),
            order: Vec::new(),
            cursor: 0,
            child_focus: false,
            child_cursor: 0,
            expanded: HashSet::new(),
            view: View::Dashboard,
            status: None,
            width: 80,
            height: 24,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn key_context(&self) -> KeyContext {
        KeyContext {
            in_logs: matches!(self.view, View::Logs(_)),
            child_focus: self.child_focus,
        }
    }

    /// Processes exactly one message.
    pub fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::Feed(event) => {
                self.apply_event(event);
                Effect::None
            }
            Message::Input(command) => self.apply_command(command),
            Message::ActionFinished {
                source,
                action,
                outcome,
            } => {
                self.action_finished(&source, &action, outcome);
                Effect::None
            }
            Message::LogLoaded {
                source,
                job_id,
                outcome,
            } => {
                self.log_loaded(source, job_id, outcome);
                Effect::None
            }
            Message::Resize { width, height } => {
                self.width = width;
                self.height = height;
                self.clamp_scroll();
                Effect::None
            }
        }
    }

    fn apply_event(&mut self, event: Event) {
        match event {
            Event::Update { source, pipeline } => {
                let key = PipelineKey::new(&source, &pipeline.id);
                self.table.insert(key, Entry { source, pipeline });
                self.reorder();
            }
            Event::Error { source, cause } => {
                warn!("Poll of {source} failed: {cause}");
                self.status = Some(StatusLine::error(format!("{source}: {cause}")));
            }
        }
    }

    /// Recomputes the display order; the cursor stays on the pipeline it was on.
    fn reorder(&mut self) {
        let anchor = self.order.get(self.cursor).cloned();

        let mut rows: Vec<(&PipelineKey, &Pipeline)> = self
            .table
            .iter()
            .map(|(key, entry)| (key, &entry.pipeline))
            .collect();
        rows.sort_by(|a, b| display_order(*a, *b));
        self.order = rows.into_iter().map(|(key, _)| key.clone()).collect();

        self.cursor = anchor
            .and_then(|key| self.order.iter().position(|k| *k == key))
            .unwrap_or(self.cursor)
            .min(self.order.len().saturating_sub(1));
        self.clamp_child();
    }

    fn clamp_child(&mut self) {
        let count = self.focused().map_or(0, |(_, entry)| entry.pipeline.job_count());
        if count == 0 {
            self.child_focus = false;
            self.child_cursor = 0;
        } else {
            self.child_cursor = self.child_cursor.min(count - 1);
        }
    }

    fn focused(&self) -> Option<(&PipelineKey, &Entry)> {
        let key = self.order.get(self.cursor)?;
        self.table.get(key).map(|entry| (key, entry))
    }

    /// The job under the child cursor, resolved through the flattened job list.
    fn focused_job(&self) -> Option<&Job> {
        if !self.child_focus {
            return None;
        }
        let (_, entry) = self.focused()?;
        entry.pipeline.job_at(self.child_cursor)
    }

    fn apply_command(&mut self, command: Command) -> Effect {
        if let View::Logs(_) = self.view {
            return match command {
                Command::CloseLogs => {
                    self.view = View::Dashboard;
                    Effect::None
                }
                Command::Scroll(scroll) => {
                    self.scroll_logs(scroll);
                    Effect::None
                }
                Command::Quit => Effect::Quit,
                _ => Effect::None,
            };
        }

        match command {
            Command::Navigate(direction) => self.navigate(direction),
            Command::ToggleFocus => self.toggle_focus(),
            Command::ToggleExpand => self.toggle_expand(),
            Command::Open => self.open(),
            Command::Back => self.child_focus = false,
            Command::RetryFocused => return self.retry_focused(),
            Command::CancelFocused => return self.cancel_focused(),
            Command::ViewLogsFocused => return self.view_logs_focused(),
            Command::CloseLogs | Command::Scroll(_) => {}
            Command::Quit => return Effect::Quit,
        }
        Effect::None
    }

    fn navigate(&mut self, direction: Direction) {
        if self.child_focus {
            let count = self.focused().map_or(0, |(_, entry)| entry.pipeline.job_count());
            self.child_cursor = step(self.child_cursor, count, direction);
            return;
        }

        let previous = self.cursor;
        self.cursor = step(self.cursor, self.order.len(), direction);
        if self.cursor != previous {
            self.child_cursor = 0;
        }
    }

    fn toggle_focus(&mut self) {
        if self.child_focus {
            self.child_focus = false;
            return;
        }

        let Some((key, entry)) = self.focused() else {
            return;
        };
        if self.expanded.contains(key) && entry.pipeline.job_count() > 0 {
            self.child_focus = true;
            self.clamp_child();
        } else {
            self.status = Some(StatusLine::info("Expand a pipeline with jobs to focus them"));
        }
    }

    fn toggle_expand(&mut self) {
        let Some(key) = self.order.get(self.cursor).cloned() else {
            return;
        };
        if self.expanded.remove(&key) {
            self.child_focus = false;
        } else {
            self.expanded.insert(key);
        }
    }

    fn open(&mut self) {
        let Some((key, entry)) = self.focused() else {
            return;
        };
        let key = key.clone();
        let has_jobs = entry.pipeline.job_count() > 0;

        self.expanded.insert(key);
        if has_jobs && !self.child_focus {
            self.child_focus = true;
            self.clamp_child();
        }
    }

    /// Source and id of the focused pipeline.
    fn focused_pipeline(&self) -> Option<(String, String)> {
        self.focused()
            .map(|(_, entry)| (entry.source.clone(), entry.pipeline.id.clone()))
    }

    fn retry_focused(&mut self) -> Effect {
        let job_id = self.focused_job().map(|job| job.id.clone());
        let Some((source, pipeline_id)) = self.focused_pipeline() else {
            self.status = Some(StatusLine::info("No pipeline selected"));
            return Effect::None;
        };
        let action = match job_id {
            Some(job_id) => Action::RetryJob { job_id },
            None => Action::RetryPipeline { pipeline_id },
        };
        self.dispatch(source, action)
    }

    fn cancel_focused(&mut self) -> Effect {
        let Some((source, pipeline_id)) = self.focused_pipeline() else {
            self.status = Some(StatusLine::info("No pipeline selected"));
            return Effect::None;
        };
        self.dispatch(source, Action::CancelPipeline { pipeline_id })
    }

    fn view_logs_focused(&mut self) -> Effect {
        let job = self
            .focused_job()
            .map(|job| (job.id.clone(), job.name.clone()));
        let (Some((source, _)), Some((job_id, job_name))) = (self.focused_pipeline(), job) else {
            self.status = Some(StatusLine::info("Select a job to view its logs"));
            return Effect::None;
        };

        let effect = self.dispatch(
            source.clone(),
            Action::FetchLog {
                job_id: job_id.clone(),
            },
        );
        if let Effect::Dispatch(_) = effect {
            self.view = View::Logs(LogView {
                source,
                job_id,
                job_name,
                content: LogContent::Loading,
                scroll: 0,
            });
        }
        effect
    }

    /// Resolves the backend of `source`. Unknown sources fail here, before any call.
    fn dispatch(&mut self, source: String, action: Action) -> Effect {
        match self.registry.get(&source) {
            Ok(backend) => {
                info!("Dispatching {action} on {source}");
                if !matches!(action, Action::FetchLog { .. }) {
                    self.status = Some(StatusLine::info(format!("{action} on {source}...")));
                }
                Effect::Dispatch(ActionRequest {
                    backend,
                    source,
                    action,
                })
            }
            Err(e) => {
                warn!("Cannot {action}: {e}");
                self.status = Some(StatusLine::error(format!("Cannot {action}: {e}")));
                Effect::None
            }
        }
    }

    fn action_finished(&mut self, source: &str, action: &Action, outcome: Result<(), ActionError>) {
        self.status = Some(match outcome {
            Ok(()) => {
                info!("{action} on {source} accepted");
                StatusLine::info(format!("{action} on {source} accepted"))
            }
            Err(e) => {
                warn!("{action} on {source} failed: {e}");
                StatusLine::error(format!("{action} on {source} failed: {e}"))
            }
        });
    }

    fn log_loaded(&mut self, source: String, job_id: String, outcome: Result<String, ActionError>) {
        if let Err(e) = &outcome {
            warn!("Fetching log of job {job_id} on {source} failed: {e}");
            self.status = Some(StatusLine::error(format!(
                "Log of job {job_id} on {source} unavailable: {e}"
            )));
        }

        let View::Logs(view) = &mut self.view else {
            debug!("Dropping log of job {job_id}: log view closed");
            return;
        };
        if view.source != source || view.job_id != job_id {
            debug!("Dropping stale log of job {job_id} on {source}");
            return;
        }

        view.content = match outcome {
            Ok(text) => LogContent::Loaded(text.lines().map(str::to_string).collect()),
            Err(e) => LogContent::Failed(e.to_string()),
        };
        view.scroll = 0;
    }

    fn scroll_logs(&mut self, scroll: Scroll) {
        let page = render::log_body_height(self.height);
        let View::Logs(view) = &mut self.view else {
            return;
        };
        let max = view.line_count().saturating_sub(page);

        view.scroll = match scroll {
            Scroll::Up => view.scroll.saturating_sub(1),
            Scroll::Down => view.scroll + 1,
            Scroll::PageUp => view.scroll.saturating_sub(page),
            Scroll::PageDown => view.scroll + page,
            Scroll::Top => 0,
            Scroll::Bottom => max,
        }
        .min(max);
    }

    fn clamp_scroll(&mut self) {
        let page = render::log_body_height(self.height);
        if let View::Logs(view) = &mut self.view {
            view.scroll = view.scroll.min(view.line_count().saturating_sub(page));
        }
    }
}

fn step(position: usize, len: usize, direction: Direction) -> usize {
    match direction {
        Direction::Up => position.saturating_sub(1),
        Direction::Down => (position + 1).min(len.saturating_sub(1)),
    }
}
