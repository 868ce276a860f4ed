//! Diagnostic rendering for the xcc compiler.
//!
//! The compiler is fail-fast: a single error aborts the run. Rendering takes
//! the error's span, looks the source line up in the [`SourceMap`], and prints
//! the line with a caret under the offending byte.

use crate::{CompileError, FileId, Span};
use serde::{Deserialize, Serialize};

/// A source file registered for diagnostic display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Registry of all source files seen in a compilation.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its id for use in spans.
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = self.files.len() as FileId;
        self.files.push(SourceFile { name: name.into(), text: text.into() });
        id
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }

    /// The full text of the 1-based `line` in file `id`, without the newline.
    pub fn line_text(&self, id: FileId, line: u32) -> Option<&str> {
        let file = self.get(id)?;
        file.text.lines().nth(line.saturating_sub(1) as usize)
    }

    /// Render `error` as `file:line:col: error: message`, followed by the
    /// source line and a caret when a location is available.
    pub fn render(&self, error: &CompileError) -> String {
        match error.span() {
            Some(span) => self.render_at(error, span),
            None => format!("error: {}", error),
        }
    }

    fn render_at(&self, error: &CompileError, span: Span) -> String {
        let name = self
            .get(span.file_id)
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>");
        let mut out = format!(
            "{}:{}:{}: error: {}",
            name, span.start.line, span.start.column, error
        );
        if let Some(line) = self.line_text(span.file_id, span.start.line) {
            out.push('\n');
            out.push_str(line);
            out.push('\n');
            let col = span.start.column.saturating_sub(1) as usize;
            // Tabs keep their width so the caret stays under the right byte.
            for ch in line.chars().take(col) {
                out.push(if ch == '\t' { '\t' } else { ' ' });
            }
            out.push('^');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    #[test]
    fn renders_line_and_caret() {
        let mut sources = SourceMap::new();
        let id = sources.add("t.c", "int main() { return x; }\n");
        let span = Span::single(Position::new(1, 21, 20), id);
        let err = CompileError::undeclared("x", span);
        let text = sources.render(&err);
        assert!(text.starts_with("t.c:1:21: error: `x` undeclared"));
        assert!(text.contains("int main() { return x; }"));
        let caret_line = text.lines().last().unwrap();
        assert_eq!(caret_line.len(), 21);
        assert!(caret_line.ends_with('^'));
    }

    #[test]
    fn renders_without_span() {
        let sources = SourceMap::new();
        let err = CompileError::io("cannot open file");
        assert_eq!(sources.render(&err), "error: I/O error: cannot open file");
    }
}
