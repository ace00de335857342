//! Mock UI implementation for testing.
//!
//! `MockUI` implements the `UserInterface` trait and captures all
//! interactions for later assertion.
//!
//! # Example
//!
//! ```
//! use rollout::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.message("Starting install");
//! ui.success("Done!");
//!
//! assert!(ui.has_message("Starting install"));
//! assert!(ui.successes().contains(&"Done!".to_string()));
//! ```

use std::sync::{Arc, Mutex};

use super::{OutputMode, SpinnerHandle, UserInterface};

/// Mock UI implementation for testing.
#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    interactive: bool,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    skipped: Vec<String>,
    headers: Vec<String>,
    hints: Vec<String>,
    spinners: Vec<Arc<Mutex<MockSpinner>>>,
}

impl MockUI {
    /// Create a new MockUI with Normal output mode.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set whether this mock behaves as interactive.
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn skipped_items(&self) -> &[String] {
        &self.skipped
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// Snapshot of every spinner started, in order.
    pub fn spinners(&self) -> Vec<MockSpinner> {
        self.spinners
            .iter()
            .map(|s| s.lock().map(|s| s.clone()).unwrap_or_default())
            .collect()
    }

    pub fn has_message(&self, msg: &str) -> bool {
        self.messages.iter().any(|m| m.contains(msg))
    }

    pub fn has_success(&self, msg: &str) -> bool {
        self.successes.iter().any(|m| m.contains(msg))
    }

    pub fn has_warning(&self, msg: &str) -> bool {
        self.warnings.iter().any(|m| m.contains(msg))
    }

    pub fn has_error(&self, msg: &str) -> bool {
        self.errors.iter().any(|m| m.contains(msg))
    }

    pub fn has_skipped(&self, msg: &str) -> bool {
        self.skipped.iter().any(|m| m.contains(msg))
    }

    pub fn has_hint(&self, msg: &str) -> bool {
        self.hints.iter().any(|m| m.contains(msg))
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn skipped(&mut self, msg: &str) {
        self.skipped.push(msg.to_string());
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        let spinner = Arc::new(Mutex::new(MockSpinner {
            messages: vec![message.to_string()],
            ..Default::default()
        }));
        self.spinners.push(Arc::clone(&spinner));
        Box::new(SharedSpinner(spinner))
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn show_hint(&mut self, hint: &str) {
        self.hints.push(hint.to_string());
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// What a mock spinner went through.
#[derive(Debug, Clone, Default)]
pub struct MockSpinner {
    messages: Vec<String>,
    finish_message: Option<String>,
    status: Option<SpinnerStatus>,
}

/// Status of a mock spinner when finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinnerStatus {
    Success,
    Error,
    Skipped,
}

impl MockSpinner {
    /// Start message followed by every update.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn finish_message(&self) -> Option<&str> {
        self.finish_message.as_deref()
    }

    pub fn status(&self) -> Option<SpinnerStatus> {
        self.status
    }
}

struct SharedSpinner(Arc<Mutex<MockSpinner>>);

impl SharedSpinner {
    fn finish(&mut self, msg: &str, status: SpinnerStatus) {
        if let Ok(mut spinner) = self.0.lock() {
            spinner.finish_message = Some(msg.to_string());
            spinner.status = Some(status);
        }
    }
}

impl SpinnerHandle for SharedSpinner {
    fn set_message(&mut self, msg: &str) {
        if let Ok(mut spinner) = self.0.lock() {
            spinner.messages.push(msg.to_string());
        }
    }

    fn finish_success(&mut self, msg: &str) {
        self.finish(msg, SpinnerStatus::Success);
    }

    fn finish_error(&mut self, msg: &str) {
        self.finish(msg, SpinnerStatus::Error);
    }

    fn finish_skipped(&mut self, msg: &str) {
        self.finish(msg, SpinnerStatus::Skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_messages_by_kind() {
        let mut ui = MockUI::new();
        ui.message("plain");
        ui.warning("careful");
        ui.error("broken");
        ui.skipped("e2e-test");
        ui.show_hint("rerun with --resume");

        assert!(ui.has_message("plain"));
        assert!(ui.has_warning("careful"));
        assert!(ui.has_error("broken"));
        assert!(ui.has_skipped("e2e"));
        assert!(ui.has_hint("--resume"));
    }

    #[test]
    fn spinner_outcome_is_recorded() {
        let mut ui = MockUI::new();
        let mut spinner = ui.start_spinner("deploy");
        spinner.set_message("deploy: helm upgrade");
        spinner.finish_error("deploy failed");

        let spinners = ui.spinners();
        assert_eq!(spinners.len(), 1);
        assert_eq!(spinners[0].messages(), &["deploy".to_string(), "deploy: helm upgrade".to_string()]);
        assert_eq!(spinners[0].status(), Some(SpinnerStatus::Error));
        assert_eq!(spinners[0].finish_message(), Some("deploy failed"));
    }

    #[test]
    fn mode_and_interactivity() {
        let mut ui = MockUI::with_mode(OutputMode::Quiet);
        assert_eq!(ui.output_mode(), OutputMode::Quiet);
        assert!(!ui.is_interactive());
        ui.set_interactive(true);
        assert!(ui.is_interactive());
    }
}
