//! Diagnostic accumulation and the caret-pointing source printer (§4.6, §7).
//!
//! Every phase accumulates into a `Vec<Diagnostic>` and returns a success
//! flag alongside it, replacing the source language's print-and-return-false
//! discipline (§9) with an ordinary data structure the driver can inspect,
//! format, or (in tests) assert against without parsing stderr text.

use std::fmt;

use crate::token::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
}

/// A single compiler-reported problem, attributable to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LINE {}: {}", self.location.line, self.message)
    }
}

/// Finds the line of `source` at 1-indexed `line_number` and renders it
/// followed by a caret line pointing at `column` (0-indexed), per §4.6.
pub fn render_excerpt(source: &str, line_number: i32, column: i32) -> String {
    let line_text = source
        .lines()
        .nth((line_number - 1).max(0) as usize)
        .unwrap_or("");
    let caret_column = column.max(0) as usize;
    let mut out = String::new();
    out.push_str(line_text);
    out.push('\n');
    out.push_str(&" ".repeat(caret_column));
    out.push('^');
    out
}

/// Byte offset of the first character of 1-indexed `line_number` within
/// `source`, used to turn a `SourceLocation`'s global character index into
/// the column `render_excerpt` wants.
fn line_start_offset(source: &str, line_number: i32) -> i32 {
    let mut current_line = 1i32;
    for (offset, byte) in source.bytes().enumerate() {
        if current_line == line_number {
            return offset as i32;
        }
        if byte == b'\n' {
            current_line += 1;
        }
    }
    0
}

/// Prints every diagnostic to stderr as `LINE <n>: <message>` followed by a
/// caret-pointed excerpt, in the order they were accumulated (§5 "Ordering").
pub fn print_diagnostics(source: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{}", diagnostic);
        let line_start = line_start_offset(source, diagnostic.location.line);
        let column = diagnostic.location.global_character_index - line_start;
        eprintln!("{}", render_excerpt(source, diagnostic.location.line, column));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_excerpt_points_caret_at_column() {
        let excerpt = render_excerpt("abc\ndefg\n", 2, 2);
        assert_eq!(excerpt, "defg\n  ^");
    }

    #[test]
    fn diagnostic_display_uses_line_prefix() {
        let d = Diagnostic::error(SourceLocation::new(3, 10), "Undeclared identifier 'x'");
        assert_eq!(d.to_string(), "LINE 3: Undeclared identifier 'x'");
    }

    #[test]
    fn print_diagnostics_renders_a_caret_at_the_reported_column() {
        // "x := 1;\n" is 8 bytes, so line 2 starts at global index 8; the
        // trailing ';' sits at index 17, column 9 within the line.
        let source = "x := 1;\ny := x + ;\n";
        let location = SourceLocation::new(2, 17);
        let diagnostics = vec![Diagnostic::error(location, "Expected expression")];
        assert_eq!(line_start_offset(source, location.line), 8);
        assert_eq!(
            render_excerpt(source, location.line, location.global_character_index - 8),
            "y := x + ;\n         ^"
        );
        print_diagnostics(source, &diagnostics);
    }
}
