use crate::ui::{theme, Icons};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Per-file progress for a batch run. Hidden when stdout is not a TTY so
/// piped output stays clean.
pub struct FileProgress {
    bar: ProgressBar,
}

impl FileProgress {
    pub fn new(total: usize) -> Self {
        let bar = if console::Term::stdout().is_term() {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn file_done(&self, name: &str) {
        self.bar.set_message(name.to_string());
        self.bar.inc(1);
    }

    /// Run `f` with the bar lifted so its output prints as normal lines.
    /// With a hidden bar this just runs `f`.
    pub fn suspended<F: FnOnce()>(&self, f: F) {
        self.bar.suspend(f);
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }

    pub fn finish_with_summary(
        &self,
        duration: Duration,
        files: usize,
        checkpoints: usize,
        failures: usize,
    ) {
        self.finish_and_clear();
        println!();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success),
            format!("Complete in {}", HumanDuration(duration)).style(theme().success)
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::FILE.style(theme().count),
            files,
            Icons::BOLT.style(theme().count),
            checkpoints,
            Icons::CROSS.style(theme().count),
            failures
        );
    }
}

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_message(message.to_string());
        if console::Term::stdout().is_term() {
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        Self { pb }
    }

    pub fn finish_with_message(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}
