pub mod ansi;
pub mod json;
pub mod registry;

use crate::codec::CodecError;
use crate::compiler::{CompileError, GenerateError};
use crate::fault::Fault;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Where a diagnostic points: a file and, for encoded programs, a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub line: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub location: Option<Location>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            location: None,
            notes: Vec::new(),
            suggestion: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Self::error(message) }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Points at `path`, keeping a line number already attached.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let line = self.location.as_ref().and_then(|l| l.line);
        self.location = Some(Location { path: path.into(), line });
        self
    }

    fn with_line(mut self, line: usize) -> Self {
        let path = self.location.take().map(|l| l.path).unwrap_or_default();
        self.location = Some(Location { path, line: Some(line) });
        self
    }
}

// ---- From impls for the crate's error types ----

impl From<&GenerateError> for Diagnostic {
    fn from(e: &GenerateError) -> Self {
        let d = Diagnostic::error(e.to_string());
        match e {
            GenerateError::NoEnclosingLoop { .. } => d
                .with_code("PHL-G001")
                .with_suggestion("break and continue only make sense inside a loop body"),
            GenerateError::NoLabeledLoop { label, .. } => d
                .with_code("PHL-G002")
                .with_suggestion(format!("place label '{label}' immediately before the loop it names")),
            GenerateError::SystemTarget { .. } => d
                .with_code("PHL-G003")
                .with_suggestion("write to a DAT, INT, FLT or USR register instead"),
            GenerateError::UnreadableSource { .. } => d
                .with_code("PHL-G004")
                .with_suggestion("copy the status with get_result and read that register"),
            GenerateError::TypeMismatch { .. } => d.with_code("PHL-G005"),
            GenerateError::TooManyKeys { .. } => d.with_code("PHL-G006"),
            GenerateError::TitleTooLong { .. } => d.with_code("PHL-G007"),
            GenerateError::EmptyMenu => d.with_code("PHL-G008"),
            GenerateError::DuplicateLabel { .. } => d
                .with_code("PHL-G009")
                .with_suggestion("give each label construct its own name"),
        }
    }
}

impl From<&Fault> for Diagnostic {
    fn from(e: &Fault) -> Self {
        Diagnostic::error(format!("internal fault: {e}"))
            .with_code("PHL-F001")
            .with_note("this is a defect in the toolchain or a corrupt program, not a source error")
    }
}

impl From<&CodecError> for Diagnostic {
    fn from(e: &CodecError) -> Self {
        match e {
            CodecError::Decode { line, message } => {
                Diagnostic::error(message.clone()).with_code("PHL-C001").with_line(*line)
            }
            CodecError::Encode { field, message } => {
                Diagnostic::error(format!("cannot encode {field}: {message}")).with_code("PHL-C002")
            }
        }
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        match e {
            CompileError::Generate(g) => g.into(),
            CompileError::Fault(f) => f.into(),
            CompileError::Codec(c) => c.into(),
        }
    }
}
