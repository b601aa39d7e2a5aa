//! Pure text rendering of the dashboard state.

use std::time::Duration;

use console::truncate_str;

use super::styling::{
    bright, bright_red, cyan, dim, magenta_bold, status_icon, status_label,
};
use super::{Dashboard, Level, LogContent, LogView, View};

/// Header plus separator above the body, status and help line below it.
const CHROME_LINES: usize = 4;

/// Number of log lines visible at a terminal height.
pub fn log_body_height(height: u16) -> usize {
    (height as usize).saturating_sub(CHROME_LINES).max(1)
}

/// Renders the full screen, one string per terminal row.
pub fn render(dashboard: &Dashboard) -> Vec<String> {
    let body_height = log_body_height(dashboard.height);

    let (header, body) = match &dashboard.view {
        View::Dashboard => (dashboard_header(dashboard), pipeline_body(dashboard, body_height)),
        View::Logs(view) => (log_header(view), log_body(view, body_height)),
    };

    let mut lines = Vec::with_capacity(body_height + CHROME_LINES);
    lines.push(header);
    lines.push(dim("─".repeat(dashboard.width as usize)).to_string());
    lines.extend(body);
    lines.resize(body_height + 2, String::new());
    lines.push(status_text(dashboard));
    lines.push(help_text(&dashboard.view));

    let width = dashboard.width as usize;
    lines
        .into_iter()
        .map(|line| truncate_str(&line, width, "…").into_owned())
        .collect()
}

fn dashboard_header(dashboard: &Dashboard) -> String {
    format!(
        "{} {}  {}",
        magenta_bold("ciwatch"),
        dim(env!("CARGO_PKG_VERSION")),
        dim(format!(
            "{} pipelines from {} sources",
            dashboard.len(),
            dashboard.registry.len()
        )),
    )
}

/// Pipeline rows with expanded stages and jobs, windowed around the focused row.
fn pipeline_body(dashboard: &Dashboard, height: usize) -> Vec<String> {
    if dashboard.is_empty() {
        return vec![dim("  Waiting for the first poll...").to_string()];
    }

    let mut rows = Vec::new();
    let mut focus_row = 0;

    for (index, key) in dashboard.order.iter().enumerate() {
        let Some(entry) = dashboard.table.get(key) else {
            continue;
        };
        let pipeline = &entry.pipeline;
        let selected = index == dashboard.cursor;
        let expanded = dashboard.expanded.contains(key);

        if selected && !dashboard.child_focus {
            focus_row = rows.len();
        }
        rows.push(format!(
            "{} {} {} {}  {}  {}  {}  {}  {}",
            marker(selected && !dashboard.child_focus),
            if expanded { "▾" } else { "▸" },
            status_icon(pipeline.status),
            bright(key),
            cyan(&pipeline.ref_),
            status_label(pipeline.status),
            pipeline.commit_message.lines().next().unwrap_or_default(),
            dim(&pipeline.author),
            dim(format!(
                "{}  {}",
                pipeline.created_at.format("%m-%d %H:%M"),
                pipeline.duration.map(format_duration).unwrap_or_default()
            )),
        ));

        if !expanded {
            continue;
        }

        let mut current_stage = None;
        for (job_index, (stage, job)) in pipeline.flattened_jobs().enumerate() {
            if current_stage != Some(stage.name.as_str()) {
                current_stage = Some(stage.name.as_str());
                rows.push(format!(
                    "      {} {}  {}",
                    status_icon(stage.status),
                    bright(&stage.name),
                    status_label(stage.status),
                ));
            }

            let focused = selected && dashboard.child_focus && job_index == dashboard.child_cursor;
            if focused {
                focus_row = rows.len();
            }
            rows.push(format!(
                "{}         {} {}  {}  {}{}",
                marker(focused),
                status_icon(job.status),
                job.name,
                status_label(job.status),
                dim(job.duration.map(format_duration).unwrap_or_default()),
                if job.allow_failure {
                    dim("  (allowed to fail)").to_string()
                } else {
                    String::new()
                },
            ));
        }
    }

    let start = (focus_row + 1).saturating_sub(height);
    rows.into_iter().skip(start).take(height).collect()
}

fn log_header(view: &LogView) -> String {
    format!(
        "{} {}  {}",
        magenta_bold("Logs"),
        bright(&view.job_name),
        dim(format!("job {} on {}", view.job_id, view.source)),
    )
}

fn log_body(view: &LogView, height: usize) -> Vec<String> {
    match &view.content {
        LogContent::Loading => vec![dim("Loading logs...").to_string()],
        LogContent::Failed(reason) => {
            vec![bright_red(format!("Failed to load log: {reason}")).to_string()]
        }
        LogContent::Loaded(lines) if lines.is_empty() => vec![dim("(empty log)").to_string()],
        LogContent::Loaded(lines) => lines.iter().skip(view.scroll).take(height).cloned().collect(),
    }
}

fn status_text(dashboard: &Dashboard) -> String {
    match &dashboard.status {
        Some(status) if status.level == Level::Error => bright_red(&status.text).to_string(),
        Some(status) => cyan(&status.text).to_string(),
        None => String::new(),
    }
}

fn help_text(view: &View) -> String {
    let help = match view {
        View::Dashboard => {
            "↑↓/jk move  ⏎/→ open  ←/Esc back  Tab focus  Space expand  r retry  c cancel  l logs  q quit"
        }
        View::Logs(_) => "↑↓/jk scroll  PgUp/PgDn page  g/G top/bottom  q/Esc close",
    };
    dim(help).to_string()
}

fn marker(focused: bool) -> String {
    if focused {
        bright("›").to_string()
    } else {
        " ".to_string()
    }
}

pub(super) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
