use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported and repaired; compilation output is unaffected.
    Warning,
    Error,
}

/// A positioned problem found while compiling a unit.
///
/// `line` is 1-based and `column` a 0-based character offset within that
/// line. Problems that have no source position (configuration warnings)
/// carry `line == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub tag_name: Option<String>,
    pub line: u32,
    pub column: u32,
    pub unit: Option<String>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            tag_name: None,
            line: 0,
            column: 0,
            unit: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(message)
        }
    }

    pub fn with_tag(mut self, name: impl Into<String>) -> Self {
        self.tag_name = Some(name.into());
        self
    }

    pub fn at(mut self, (line, column): (u32, u32)) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn in_unit(mut self, unit: Option<&str>) -> Self {
        self.unit = unit.map(str::to_owned);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(unit) = &self.unit {
            write!(f, "{unit}:")?;
        }
        if self.line > 0 {
            write!(f, "{}:{}: ", self.line, self.column)?;
        } else if self.unit.is_some() {
            f.write_str(" ")?;
        }
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}: {}", self.message)?;
        if let Some(tag) = &self.tag_name {
            write!(f, " [{tag}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Maps byte offsets of a source text to line/column pairs.
///
/// `\r\n`, `\r` and `\n` each terminate a line.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut line_starts = vec![0];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                    i += 2;
                    line_starts.push(i);
                }
                b'\r' | b'\n' => {
                    i += 1;
                    line_starts.push(i);
                }
                _ => i += 1,
            }
        }
        Self { line_starts }
    }

    /// 1-based line and 0-based character column of `offset` in `source`.
    pub fn position(&self, source: &str, offset: usize) -> (u32, u32) {
        let offset = offset.min(source.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line - 1];
        let column = source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line as u32, column as u32)
    }

    /// Text of the 1-based `line`, without its terminator.
    pub fn line_text<'s>(&self, source: &'s str, line: u32) -> Option<&'s str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .copied()
            .unwrap_or(source.len());
        Some(source[start..end].trim_end_matches(['\r', '\n']))
    }
}

/// Width of the first `column` characters of `line` once tabs are expanded
/// to `tab_size` stops.
pub fn display_column(line: &str, column: u32, tab_size: usize) -> usize {
    let tab_size = tab_size.max(1);
    line.chars().take(column as usize).fold(0, |width, ch| {
        if ch == '\t' {
            width + tab_size - width % tab_size
        } else {
            width + 1
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_every_line_terminator() {
        let src = "a\r\nbc\rd\nef";
        let index = LineIndex::new(src);
        assert_eq!(index.position(src, 0), (1, 0));
        assert_eq!(index.position(src, 4), (2, 1));
        assert_eq!(index.position(src, 6), (3, 0));
        assert_eq!(index.position(src, 9), (4, 1));
        assert_eq!(index.line_text(src, 2), Some("bc"));
    }

    #[test]
    fn columns_count_characters_not_bytes() {
        let src = "ж<x>";
        let index = LineIndex::new(src);
        assert_eq!(index.position(src, "ж".len()), (1, 1));
    }

    #[test]
    fn tabs_expand_to_stops() {
        assert_eq!(display_column("\tab", 2, 4), 5);
        assert_eq!(display_column("a\tb", 2, 2), 2);
    }
}
