use crate::ast::source_map::{Location, SourceMap};
use super::{Diagnostic, Label, Severity};

#[derive(Clone, Copy)]
enum Style {
    Bold,
    Error,
    Warning,
    Gutter,
    Faint,
}

impl Style {
    fn sgr(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::Error => "1;31",
            Style::Warning => "1;33",
            Style::Gutter => "36",
            Style::Faint => "2",
        }
    }
}

/// Renders diagnostics for a terminal, rustc style.
pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, style: Style, s: &str) -> String {
        if self.use_color {
            format!("\x1b[{}m{s}\x1b[0m", style.sgr())
        } else {
            s.to_string()
        }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let accent = match d.severity {
            Severity::Error => Style::Error,
            Severity::Warning => Style::Warning,
        };
        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let heading = match d.code {
            Some(code) => format!("{severity}[{code}]"),
            None => severity.to_string(),
        };
        let mut out = format!("{}: {}\n", self.paint(accent, &heading), self.paint(Style::Bold, &d.message));

        if let Some(source) = &d.source {
            let map = SourceMap::new(source);
            for label in &d.labels {
                self.snippet(&mut out, &map, label, accent);
            }
        }
        for note in &d.notes {
            out.push_str(&format!("  {} note: {note}\n", self.paint(Style::Faint, "=")));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {suggestion}\n", self.paint(Style::Faint, "=")));
        }
        out
    }

    /// `--> line:col`, the source line, and carets under the span. Spans
    /// running past the end of their first line are cut at the line end.
    fn snippet(&self, out: &mut String, map: &SourceMap<'_>, label: &Label, accent: Style) {
        let Location { line, col } = map.span_start(label.span);
        let text = map.line_text(line);
        let width = line.to_string().len();
        let blank = " ".repeat(width);
        let bar = self.paint(Style::Gutter, "|");

        out.push_str(&format!("{blank}{} {line}:{col}\n", self.paint(Style::Gutter, "-->")));
        out.push_str(&format!("{blank} {bar}\n"));
        out.push_str(&format!("{} {bar} {text}\n", self.paint(Style::Gutter, &format!("{line:>width$}"))));

        let remaining = text.chars().count().saturating_sub(col - 1);
        let span_len = label.span.end.saturating_sub(label.span.start);
        let carets = "^".repeat(span_len.min(remaining).max(1));
        let mut marker = format!("{}{}", " ".repeat(col - 1), self.paint(accent, &carets));
        if !label.message.is_empty() {
            marker.push(' ');
            marker.push_str(&self.paint(accent, &label.message));
        }
        out.push_str(&format!("{blank} {bar} {marker}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    const SOURCE: &str = "var x = 1 + 'a'";

    fn plain() -> AnsiRenderer {
        AnsiRenderer { use_color: false }
    }

    fn type_error(start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("cannot add Int32 and Str")
            .with_code("TQ-R005")
            .with_span(Span { start, end }, "here")
            .with_source(SOURCE)
            .with_note("in actor 3")
            .with_suggestion("convert the Str first")
    }

    #[test]
    fn heading_carries_code() {
        let out = plain().render(&type_error(8, 15));
        assert!(out.starts_with("error[TQ-R005]: cannot add Int32 and Str\n"), "{out}");
    }

    #[test]
    fn snippet_points_at_span() {
        let out = plain().render(&type_error(8, 15));
        assert!(out.contains("--> 1:9"), "{out}");
        assert!(out.contains(&format!("1 | {SOURCE}")), "{out}");
        assert!(out.contains("|         ^^^^^^^ here"), "{out}");
    }

    #[test]
    fn notes_and_suggestion_follow_snippet() {
        let out = plain().render(&type_error(8, 9));
        let note = out.find("= note: in actor 3").expect("note");
        let suggestion = out.find("= suggestion: convert the Str first").expect("suggestion");
        assert!(out.find("^").unwrap() < note && note < suggestion, "{out}");
    }

    #[test]
    fn no_source_no_snippet() {
        let out = plain().render(&Diagnostic::error("something bad"));
        assert_eq!(out, "error: something bad\n");
    }

    #[test]
    fn warning_heading() {
        let out = plain().render(&Diagnostic::warning("actor 2 halted").with_code("TQ-R003"));
        assert!(out.starts_with("warning[TQ-R003]: actor 2 halted"), "{out}");
    }

    #[test]
    fn color_is_optional() {
        let d = type_error(8, 9);
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b[1;31m"));
        assert!(!plain().render(&d).contains('\x1b'));
    }

    #[test]
    fn later_line_and_clipped_carets() {
        let source = "var a = 1\nvar b = a +\nb";
        let d = Diagnostic::error("expected an expression")
            .with_span(Span { start: 18, end: 23 }, "")
            .with_source(source);
        let out = plain().render(&d);
        assert!(out.contains("--> 2:9"), "{out}");
        assert!(out.contains("2 | var b = a +"), "{out}");
        assert!(out.contains("|         ^^^\n"), "{out}");
    }
}
