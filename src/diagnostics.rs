//! Error collection and rendering. Lexical, syntactic, and semantic
//! problems are all reported as [`Diagnostic`]s rather than aborting the
//! parse.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Syntax,
    Semantic,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl Diagnostic {
    pub fn syntax(message: impl Into<String>, line: u32, col: u32) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Syntax,
            message: message.into(),
            line,
            col,
        }
    }

    pub fn semantic(message: impl Into<String>, line: u32, col: u32) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Semantic,
            message: message.into(),
            line,
            col,
        }
    }

    /// Renders the diagnostic with a source excerpt and a caret pointing at
    /// the offending column.
    pub fn render(&self, source: &str) -> String {
        let excerpt = source
            .lines()
            .nth((self.line.saturating_sub(1)) as usize)
            .unwrap_or("");
        let caret_col = self.col.saturating_sub(1) as usize;
        let mut caret_line = " ".repeat(caret_col);
        caret_line.push('^');
        format!(
            "{:?} error at {}:{}: {}\n{}\n{}",
            self.kind, self.line, self.col, self.message, excerpt, caret_line
        )
    }
}

/// An ordered collection of diagnostics accumulated during parsing.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics(Vec::new())
    }

    pub fn push(&mut self, diag: Diagnostic) {
        log::debug!("{:?} at {}:{}: {}", diag.kind, diag.line, diag.col, diag.message);
        self.0.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Renders every diagnostic in source order, followed by a total count.
    pub fn render_all(&self, source: &str) -> String {
        let mut out = String::new();
        for diag in &self.0 {
            out.push_str(&diag.render(source));
            out.push_str("\n\n");
        }
        out.push_str(&format!("{} error(s)", self.0.len()));
        out
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.0 {
            writeln!(f, "{:?} at {}:{}: {}", diag.kind, diag.line, diag.col, diag.message)?;
        }
        write!(f, "{} error(s)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_points_caret_at_column() {
        let src = "CIRCUIT {\nFOO > X.I1;\n}";
        let diag = Diagnostic::semantic("unknown device 'FOO'", 2, 1);
        let rendered = diag.render(src);
        assert!(rendered.contains("FOO > X.I1;"));
        assert!(rendered.contains("^"));
    }

    #[test]
    fn empty_collector_has_no_errors() {
        let diags = Diagnostics::new();
        assert!(!diags.has_errors());
    }
}
