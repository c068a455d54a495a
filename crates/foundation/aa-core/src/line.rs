//! Raw line model.
//!
//! A `PolicyFile` keeps each line's content separate from its terminator so
//! edits never disturb line endings that were not touched.

use std::fmt;

/// Line terminator as found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Final line without a trailing newline
    None,
    Lf,
    CrLf,
}

impl Terminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminator::None => "",
            Terminator::Lf => "\n",
            Terminator::CrLf => "\r\n",
        }
    }
}

/// One line of policy text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Content without the terminator
    pub content: String,
    pub terminator: Terminator,
}

impl Line {
    pub fn new(content: impl Into<String>, terminator: Terminator) -> Self {
        Self {
            content: content.into(),
            terminator,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.content, self.terminator.as_str())
    }
}

/// Ordered lines of one policy file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFile {
    lines: Vec<Line>,
}

impl PolicyFile {
    /// Split text into lines. `parse(t).render() == t` for every input.
    pub fn parse(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut rest = text;

        while !rest.is_empty() {
            match rest.find('\n') {
                Some(idx) => {
                    let raw = &rest[..idx];
                    let line = match raw.strip_suffix('\r') {
                        Some(content) => Line::new(content, Terminator::CrLf),
                        None => Line::new(raw, Terminator::Lf),
                    };
                    lines.push(line);
                    rest = &rest[idx + 1..];
                }
                None => {
                    lines.push(Line::new(rest, Terminator::None));
                    rest = "";
                }
            }
        }

        Self { lines }
    }

    pub fn from_lines(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut [Line] {
        &mut self.lines
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Join all lines back into text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.content);
            out.push_str(line.terminator.as_str());
        }
        out
    }
}
