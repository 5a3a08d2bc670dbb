use std::io::IsTerminal;

use super::{Diagnostic, Severity};

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    /// Colored when stderr is a terminal and `NO_COLOR` is unset.
    pub fn for_stderr() -> Self {
        let use_color = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        AnsiRenderer { use_color }
    }

    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_yellow(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;33m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        // "error[PHL-G001]: message"
        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let head = match d.code {
            Some(code) => format!("{severity}[{code}]"),
            None => severity.to_string(),
        };
        let head = match d.severity {
            Severity::Error => self.bold_red(&head),
            Severity::Warning => self.bold_yellow(&head),
        };
        out.push_str(&format!("{}: {}\n", head, self.bold(&d.message)));

        if let Some(loc) = &d.location {
            let at = match loc.line {
                Some(line) if loc.path.is_empty() => format!("line {line}"),
                Some(line) => format!("{}:{line}", loc.path),
                None => loc.path.clone(),
            };
            out.push_str(&format!("  {} {}\n", self.cyan("-->"), at));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }

        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", self.dim("="), suggestion));
        }

        out
    }
}
