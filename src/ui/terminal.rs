//! Terminal UI.

use console::Term;
use std::io::Write;

use super::{OutputMode, ProgressSpinner, RolloutTheme, SpinnerHandle, UserInterface};

/// Writes styled output to stdout.
///
/// Spinners are drawn only in interactive mode; otherwise each outcome is a
/// plain line, which keeps CI logs readable.
pub struct TerminalUI {
    term: Term,
    theme: RolloutTheme,
    mode: OutputMode,
    interactive: bool,
}

impl TerminalUI {
    pub fn new(mode: OutputMode, interactive: bool) -> Self {
        let term = Term::stdout();
        Self {
            interactive: interactive && term.is_term(),
            term,
            theme: RolloutTheme::detect(),
            mode,
        }
    }

    fn line(&mut self, text: &str) {
        writeln!(self.term, "{}", text).ok();
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_progress() {
            self.line(msg);
        }
    }

    fn success(&mut self, msg: &str) {
        let text = self.theme.format_success(msg);
        self.line(&text);
    }

    fn warning(&mut self, msg: &str) {
        let text = self.theme.format_warning(msg);
        self.line(&text);
    }

    fn error(&mut self, msg: &str) {
        let text = self.theme.format_error(msg);
        self.line(&text);
    }

    fn skipped(&mut self, msg: &str) {
        if self.mode.shows_progress() {
            let text = self.theme.format_skipped(msg);
            self.line(&text);
        }
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        if self.interactive && self.mode.shows_progress() {
            Box::new(ProgressSpinner::new(message, self.theme.clone()))
        } else {
            Box::new(ProgressSpinner::hidden())
        }
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_progress() {
            let text = self.theme.format_header(title);
            writeln!(self.term, "\n{}\n", text).ok();
        }
    }

    fn show_hint(&mut self, hint: &str) {
        if self.mode.shows_hints() {
            let text = self.theme.hint.apply_to(hint).to_string();
            writeln!(self.term, "  {}", text).ok();
        }
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

const CI_VARIABLES: [&str; 6] = [
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
];

/// Whether we appear to be running under a CI system.
pub fn is_ci() -> bool {
    CI_VARIABLES.iter().any(|var| std::env::var_os(var).is_some())
}

/// Create the UI for this invocation.
pub fn create_ui(interactive: bool, mode: OutputMode) -> Box<dyn UserInterface> {
    Box::new(TerminalUI::new(mode, interactive))
}
