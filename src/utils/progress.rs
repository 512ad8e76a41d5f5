use crate::utils::format::{humanize_bytes, percentify};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;

const SPINNER_FPS: u64 = 10;

/// In-place `Downloaded 42% 1.5MB of 3.6MB` line.
pub struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{prefix}{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_prefix("Downloaded ");
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn update(&self, sent: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            sent as f64 / total as f64
        };
        self.bar.set_length(total);
        self.bar.set_position(sent);
        self.bar.set_message(format!(
            "{} {} of {}",
            percentify(fraction),
            humanize_bytes(sent),
            humanize_bytes(total)
        ));
    }

    pub fn finish(&self) {
        if self.bar.is_hidden() {
            return;
        }
        let message = format!("{} ...done!", self.bar.message());
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Runs `task` behind a `| / - \` spinner.
pub async fn with_wait_spinner<F, T>(visible: bool, task: F) -> T
where
    F: Future<Output = T>,
{
    if !visible {
        return task.await;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("|/-\\ "),
    );
    spinner.enable_steady_tick(Duration::from_millis(1000 / SPINNER_FPS));

    let output = task.await;
    spinner.finish_and_clear();
    output
}
