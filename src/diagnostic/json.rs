use serde::Serialize;

use crate::ast::SourceMap;
use super::{Diagnostic, Severity};

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    message: &'a str,
    labels: Vec<JsonLabel<'a>>,
    notes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonLabel<'a> {
    start: usize,
    end: usize,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    col: Option<usize>,
}

/// One diagnostic as a single line of JSON. Labels gain `line`/`col`
/// when the diagnostic carries its source.
pub fn render(d: &Diagnostic) -> String {
    let map = d.source.as_deref().map(SourceMap::new);
    let labels = d
        .labels
        .iter()
        .map(|label| {
            let loc = map.as_ref().map(|map| map.span_start(label.span));
            JsonLabel {
                start: label.span.start,
                end: label.span.end,
                message: &label.message,
                line: loc.map(|loc| loc.line),
                col: loc.map(|loc| loc.col),
            }
        })
        .collect();
    let out = JsonDiagnostic {
        severity: match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        },
        code: d.code,
        message: &d.message,
        labels,
        notes: &d.notes,
        suggestion: d.suggestion.as_deref(),
    };
    serde_json::to_string(&out)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"diagnostic could not be serialized"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn bare_error() {
        let v = parse_json(&render(&Diagnostic::error("type mismatch")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "type mismatch");
        assert_eq!(v["labels"], serde_json::json!([]));
        assert!(v.get("code").is_none());
        assert!(v.get("suggestion").is_none());
    }

    #[test]
    fn labels_locate_against_source() {
        let d = Diagnostic::error("expected then")
            .with_code("TQ-P003")
            .with_span(Span { start: 8, end: 10 }, "here")
            .with_source("var b\nif b do skip end");
        let v = parse_json(&render(&d));
        assert_eq!(v["code"], "TQ-P003");
        assert_eq!(
            v["labels"][0],
            serde_json::json!({"start": 8, "end": 10, "message": "here", "line": 2, "col": 3})
        );
    }

    #[test]
    fn labels_without_source_have_offsets_only() {
        let d = Diagnostic::error("bad").with_span(Span { start: 5, end: 8 }, "here");
        let label = &parse_json(&render(&d))["labels"][0];
        assert_eq!(label["start"], 5);
        assert!(label.get("line").is_none() && label.get("col").is_none());
    }

    #[test]
    fn notes_suggestion_and_warning() {
        let d = Diagnostic::warning("actor 1 halted")
            .with_note("'error'#{'name': 'TellNotHandledError'}")
            .with_suggestion("add a handle tell clause");
        let v = parse_json(&render(&d));
        assert_eq!(v["severity"], "warning");
        assert_eq!(v["notes"][0], "'error'#{'name': 'TellNotHandledError'}");
        assert_eq!(v["suggestion"], "add a handle tell clause");
    }

    #[test]
    fn single_line() {
        let d = Diagnostic::error("multi\nline").with_source("a\nb");
        assert!(!render(&d).contains('\n'));
    }
}
