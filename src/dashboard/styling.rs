use console::{style, StyledObject};

use crate::domain::Status;

/// Styling helpers for terminal output
pub fn bright_yellow(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn bright_green(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn bright_red(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).bright().red()
}

pub fn cyan(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn magenta_bold(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// One-character status marker, coloured by outcome.
pub fn status_icon(status: Status) -> StyledObject<String> {
    match status {
        Status::Success => bright_green("✔"),
        Status::Failed => bright_red("✖"),
        Status::Running => bright_yellow("↻"),
        Status::Pending => dim("•"),
        Status::Skipped => dim("-"),
        Status::Canceled => dim("⊘"),
        Status::Manual => cyan("▸"),
    }
}

pub fn status_label(status: Status) -> StyledObject<String> {
    match status {
        Status::Success => bright_green(status),
        Status::Failed => bright_red(status),
        Status::Running => bright_yellow(status),
        Status::Manual => cyan(status),
        Status::Pending | Status::Skipped | Status::Canceled => dim(status),
    }
}
