//! Progress spinners.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::theme::RolloutTheme;
use super::SpinnerHandle;

/// A progress spinner for a long-running step.
pub struct ProgressSpinner {
    bar: ProgressBar,
    theme: RolloutTheme,
}

impl ProgressSpinner {
    /// Create a new spinner with a message.
    pub fn new(message: &str, theme: RolloutTheme) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
        {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Self { bar, theme }
    }

    /// Create a spinner that draws nothing.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            theme: RolloutTheme::plain(),
        }
    }

    fn finish(&mut self, line: String) {
        if let Ok(style) = ProgressStyle::default_spinner().template("{msg}") {
            self.bar.set_style(style);
        }
        self.bar.finish_with_message(line);
    }
}

impl SpinnerHandle for ProgressSpinner {
    fn set_message(&mut self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    fn finish_success(&mut self, msg: &str) {
        let line = self.theme.format_success(msg);
        self.finish(line);
    }

    fn finish_error(&mut self, msg: &str) {
        let line = self.theme.format_error(msg);
        self.finish(line);
    }

    fn finish_skipped(&mut self, msg: &str) {
        let line = self.theme.format_skipped(msg);
        self.finish(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_spinner_finishes_with_message() {
        let mut spinner = ProgressSpinner::hidden();
        spinner.set_message("deploy");
        spinner.finish_success("deploy (1.2s)");
        assert!(spinner.bar.is_finished());
        assert_eq!(spinner.bar.message(), "✓ deploy (1.2s)");
    }

    #[test]
    fn spinner_finish_error_and_skipped() {
        let mut spinner = ProgressSpinner::new("setup", RolloutTheme::plain());
        spinner.finish_error("setup failed");
        assert_eq!(spinner.bar.message(), "✗ setup failed");

        let mut spinner = ProgressSpinner::hidden();
        spinner.finish_skipped("e2e-test");
        assert_eq!(spinner.bar.message(), "○ e2e-test");
    }
}
