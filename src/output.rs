//! Terminal rendering for job listings and progress bars.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use linkdrop_core::{JobRecord, JobStatus};

const BAR_TEMPLATE: &str =
    "{msg:32!} [{bar:30.cyan/blue}] {bytes:>10}/{total_bytes:<10} {bytes_per_sec:>12}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg:32!} {bytes:>10} {bytes_per_sec:>12}";

/// Returns terminal width from COLUMNS, or 100 if unset or implausible.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 40)
        .unwrap_or(100)
}

/// Shortens `text` to `width` characters, marking the cut with an ellipsis.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    match width {
        0 => String::new(),
        1 => "…".to_string(),
        _ => {
            let mut output: String = text.chars().take(width - 1).collect();
            output.push('…');
            output
        }
    }
}

/// Short label for a job: its file name once known, else its id.
pub fn job_label(record: &JobRecord) -> String {
    record
        .file_name
        .clone()
        .unwrap_or_else(|| record.id.to_string())
}

/// One line of `list` output.
pub fn render_job_row(record: &JobRecord, width: usize) -> String {
    let detail = match record.status() {
        JobStatus::Success => record
            .saved_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        JobStatus::Failed => record.error_message.clone().unwrap_or_default(),
        _ => job_label(record),
    };
    let row = format!(
        "{}  {:<8}  {:>5.1}%  {}",
        record.id,
        record.status().as_str(),
        record.progress_percent(),
        detail
    );
    truncate_to_width(&row, width)
}

/// Creates a bar for one job; hidden when `quiet`.
pub fn job_progress_bar(record: &JobRecord, quiet: bool) -> ProgressBar {
    let bar = match record.total_bytes {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .map(|style| style.progress_chars("=> "))
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    if quiet {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
    bar.set_message(job_label(record));
    bar.set_position(record.bytes_downloaded);
    bar
}

/// Brings a bar in line with the latest snapshot.
pub fn update_progress_bar(bar: &ProgressBar, record: &JobRecord) {
    if let Some(total) = record.total_bytes
        && bar.length() != Some(total)
    {
        bar.set_length(total);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .map(|style| style.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
    }
    bar.set_message(job_label(record));
    bar.set_position(record.bytes_downloaded);
}

/// Final message for a bar once the job stopped moving.
pub fn final_message(record: &JobRecord) -> String {
    let label = job_label(record);
    match record.status() {
        JobStatus::Success => format!("{label}: done"),
        JobStatus::Failed => format!(
            "{label}: failed: {}",
            record.error_message.as_deref().unwrap_or("unknown error")
        ),
        status => format!("{label}: {status}"),
    }
}
