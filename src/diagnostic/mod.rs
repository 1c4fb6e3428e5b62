pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;
use crate::machine::Evaluation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(message) }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into() });
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

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// An uncaught throw that stopped a program.
    pub fn halt(evaluation: &Evaluation) -> Self {
        let code = registry::runtime_code(evaluation.error.as_deref());
        let mut d = Diagnostic::error(format!("uncaught {}", evaluation.value)).with_code(code);
        for halt in &evaluation.halts {
            d = d.with_note(format!("actor {} halted: {}", halt.actor, halt.message));
        }
        d
    }

    /// An actor that halted while the program itself completed.
    pub fn actor_halt(halt: &crate::actor::HaltReport) -> Self {
        Diagnostic::warning(format!("actor {} halted: {}", halt.actor, halt.message))
            .with_code(registry::runtime_code(halt.name.as_deref()))
    }
}

// ---- From impls for each layer's error type ----

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        let mut d = Diagnostic::error(format!("unexpected token '{}'", e.snippet))
            .with_code(e.code())
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::generator::GenError> for Diagnostic {
    fn from(e: &crate::generator::GenError) -> Self {
        let d = Diagnostic::error(e.to_string()).with_code(e.code());
        let span = e.span();
        if span == Span::UNKNOWN { d } else { d.with_span(span, "here") }
    }
}

impl From<&crate::config::ConfigError> for Diagnostic {
    fn from(e: &crate::config::ConfigError) -> Self {
        Diagnostic::error(e.to_string()).with_code(e.code())
    }
}

impl From<&crate::Error> for Diagnostic {
    fn from(e: &crate::Error) -> Self {
        match e {
            crate::Error::Lex(e) => e.into(),
            crate::Error::Parse(e) => e.into(),
            crate::Error::Gen(e) => e.into(),
        }
    }
}
