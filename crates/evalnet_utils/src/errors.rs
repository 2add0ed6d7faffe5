use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

/// A single message produced by a compile backend, optionally anchored to a
/// byte range of the submitted source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    span: Option<Range<usize>>,
    message: String,
    help: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            span: None,
            message: message.into(),
            help: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, message)
    }

    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    pub fn span(&self) -> Option<Range<usize>> {
        self.span.clone()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    fn report_kind(&self) -> ReportKind<'_> {
        match self.severity {
            DiagnosticSeverity::Error => ReportKind::Error,
            DiagnosticSeverity::Warning => ReportKind::Warning,
            DiagnosticSeverity::Info => ReportKind::Advice,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{} (at {}..{})", self.message, span.start, span.end),
            None => f.write_str(&self.message),
        }
    }
}

/// Render diagnostics against the source they were produced for.
///
/// Output is plain text (no ANSI colors) so hosts can hand it back through
/// whatever channel they report errors on. Diagnostics without a span point
/// at the start of the source.
pub fn render_diagnostics(diagnostics: &[Diagnostic], source_id: &str, source: &str) -> String {
    let mut out = Vec::new();

    for diagnostic in diagnostics {
        let color = match diagnostic.severity {
            DiagnosticSeverity::Error => Color::Red,
            DiagnosticSeverity::Warning => Color::Yellow,
            DiagnosticSeverity::Info => Color::Blue,
        };

        let span = clamp(diagnostic.span().unwrap_or(0..0), source.len());
        let mut report = Report::build(diagnostic.report_kind(), source_id.to_string(), span.start)
            .with_config(Config::default().with_color(false))
            .with_message(diagnostic.message())
            .with_label(
                Label::new((source_id.to_string(), span))
                    .with_message(diagnostic.message())
                    .with_color(color),
            );

        if let Some(help) = diagnostic.help() {
            report = report.with_note(help);
        }

        let written = report
            .finish()
            .write((source_id.to_string(), Source::from(source)), &mut out);
        if written.is_err() {
            out.extend_from_slice(format!("{diagnostic}\n").as_bytes());
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn clamp(span: Range<usize>, len: usize) -> Range<usize> {
    let start = span.start.min(len);
    let end = span.end.clamp(start, len);
    start..end
}
