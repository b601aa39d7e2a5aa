//! Terminal runtime: owns the screen and multiplexes the event feed, action results and
//! keyboard input into the dashboard loop.

use std::io::{self, Stdout, Write};

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{Event as TermEvent, EventStream};
use crossterm::style::Print;
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use futures::StreamExt;
use log::{error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{keymap, render, Dashboard, Effect, Message};
use crate::aggregator::Aggregator;

const RESULTS_CAPACITY: usize = 32;

/// Raw mode and alternate screen for as long as it lives.
struct TerminalGuard {
    out: Stdout,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut out = io::stdout();
        execute!(out, EnterAlternateScreen, Hide).context("Failed to enter alternate screen")?;
        Ok(Self { out })
    }

    fn draw(&mut self, lines: &[String]) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All))?;
        for (row, line) in lines.iter().enumerate() {
            let row = u16::try_from(row).unwrap_or(u16::MAX);
            queue!(self.out, MoveTo(0, row), Print(line))?;
        }
        self.out.flush()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(self.out, Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Runs the dashboard until the user quits, then cancels every adapter.
pub async fn run(
    mut dashboard: Dashboard,
    mut aggregator: Aggregator,
    cancel: CancellationToken,
) -> Result<()> {
    let result = match TerminalGuard::enter() {
        Ok(mut screen) => event_loop(&mut dashboard, &mut aggregator, &mut screen).await,
        Err(e) => Err(e),
    };

    info!("Shutting down");
    cancel.cancel();
    aggregator.shutdown();

    if let Err(e) = &result {
        error!("Dashboard stopped: {e:#}");
    }
    result
}

async fn event_loop(
    dashboard: &mut Dashboard,
    aggregator: &mut Aggregator,
    screen: &mut TerminalGuard,
) -> Result<()> {
    let (results_tx, mut results_rx) = mpsc::channel(RESULTS_CAPACITY);
    let mut input = EventStream::new();

    let (width, height) = terminal::size().context("Failed to read terminal size")?;
    dashboard.handle(Message::Resize { width, height });
    screen.draw(&render(dashboard))?;

    loop {
        let message = tokio::select! {
            Some(event) = aggregator.recv() => Message::Feed(event),
            Some(result) = results_rx.recv() => result,
            input_event = input.next() => match input_event {
                Some(Ok(TermEvent::Key(key))) => {
                    match keymap::command_for(key, dashboard.key_context()) {
                        Some(command) => Message::Input(command),
                        None => continue,
                    }
                }
                Some(Ok(TermEvent::Resize(width, height))) => Message::Resize { width, height },
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => return Ok(()),
            },
        };

        match dashboard.handle(message) {
            Effect::None => {}
            Effect::Quit => return Ok(()),
            Effect::Dispatch(request) => request.spawn(results_tx.clone()),
        }

        screen.draw(&render(dashboard))?;
    }
}
