//! Status lines for the CLI.
//!
//! Everything goes to stderr; stdout carries only rendered HTML.

use std::fmt::Display;

use console::{Term, style};

pub(crate) struct Output {
    term: Term,
}

impl Output {
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    /// `label: value` line with a dimmed label.
    pub(crate) fn field(&self, label: &str, value: impl Display) {
        self.line(format!("{}: {value}", style(label).dim()));
    }

    pub(crate) fn info(&self, msg: impl Display) {
        self.line(msg);
    }

    pub(crate) fn success(&self, msg: impl Display) {
        self.line(style(msg).green());
    }

    /// Report a failed command; multi-line errors keep their line breaks.
    pub(crate) fn failure(&self, err: &dyn std::error::Error) {
        self.line(style(format!("Error: {err}")).red());
    }

    fn line(&self, text: impl Display) {
        // A closed stderr leaves nowhere to report to.
        let _ = self.term.write_line(&text.to_string());
    }
}
