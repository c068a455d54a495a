//! Profile headers and their flag sets.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::grammar::{
    is_path_token, leading_whitespace, split_comment, split_words, trailing_whitespace,
};
use crate::Error;

lazy_static! {
    /// `key=value` or `key=(...)` clauses of a header, e.g. `flags=` or `xattrs=`.
    static ref CLAUSE: Regex =
        Regex::new(r"(?:^|\s)([A-Za-z_][A-Za-z0-9_.]*)\s*=\s*(\([^)]*\)|[^\s()]+)").unwrap();
}

/// Enforcement mode of a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Violations are blocked
    #[default]
    Enforce,
    /// Violations are logged only
    Complain,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Enforce => "enforce",
            Mode::Complain => "complain",
        }
    }

    pub fn opposite(&self) -> Mode {
        match self {
            Mode::Enforce => Mode::Complain,
            Mode::Complain => Mode::Enforce,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Mode::Enforce),
            "complain" => Ok(Mode::Complain),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// Ordered, duplicate-free flag tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    tokens: Vec<String>,
}

impl FlagSet {
    /// Parse the inside of `flags=(...)`; commas and whitespace both separate.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::default();
        for token in raw.split(|c: char| c == ',' || c.is_whitespace()) {
            if !token.is_empty() {
                set.insert(token);
            }
        }
        set
    }

    pub fn insert(&mut self, token: &str) -> bool {
        if self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    pub fn remove(&mut self, token: &str) {
        self.tokens.retain(|t| t != token);
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Drop the opposite mode and make sure `mode` is present.
    pub fn set_mode(&mut self, mode: Mode) {
        self.remove(mode.opposite().as_str());
        self.insert(mode.as_str());
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flags=({})", self.tokens.join(","))
    }
}

/// How a header introduces its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// `profile ...` or a bare attachment path
    Profile,
    /// `hat <name>`
    Hat,
    /// `^<name>`
    CaretHat,
}

/// Structural view of a `profile ... {` or hat header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileHeader {
    pub indent: String,
    pub kind: HeaderKind,
    pub name: Option<String>,
    pub attachment: Option<String>,
    /// Clauses other than `flags=`, kept verbatim in source order
    pub clauses: Vec<String>,
    pub flags: FlagSet,
    /// Whitespace between `{` and the comment
    pub comment_gap: String,
    pub comment: String,
}

impl ProfileHeader {
    /// Parse a header line (without its terminator).
    ///
    /// Returns `None` unless the comment-free body ends with `{` and starts
    /// with `profile`, `hat`, `^name` or a path. `key=value` clauses are
    /// lifted out first; `flags=` becomes the flag set, the rest are kept.
    pub fn parse(line: &str) -> Option<Self> {
        let (body, comment) = split_comment(line);
        let head = body.trim().strip_suffix('{')?.trim();

        let mut flags = FlagSet::default();
        let mut clauses = Vec::new();
        let mut remainder = String::new();
        let mut last = 0;
        for caps in CLAUSE.captures_iter(head) {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            remainder.push_str(&head[last..whole.start()]);
            remainder.push(' ');
            last = whole.end();

            if key == "flags" {
                let inner = value
                    .strip_prefix('(')
                    .and_then(|v| v.strip_suffix(')'))
                    .unwrap_or(value);
                flags = FlagSet::parse(inner);
            } else {
                clauses.push(whole.as_str().trim().to_string());
            }
        }
        remainder.push_str(&head[last..]);

        let words = split_words(&remainder);
        let (first, rest) = words.split_first()?;

        let (kind, name, attachment) = if let Some(hat) = first.strip_prefix('^') {
            if hat.is_empty() || !rest.is_empty() {
                return None;
            }
            (HeaderKind::CaretHat, Some(hat.to_string()), None)
        } else if *first == "hat" {
            match rest {
                [name] if !is_path_token(name) => (HeaderKind::Hat, Some(name.to_string()), None),
                _ => return None,
            }
        } else {
            let operands: &[&str] = if *first == "profile" {
                rest
            } else if is_path_token(first) {
                &words
            } else {
                return None;
            };
            let (name, attachment) = match operands {
                [only] if is_path_token(only) => (None, Some(only.to_string())),
                [only] => (Some(only.to_string()), None),
                [name, path] if !is_path_token(name) && is_path_token(path) => {
                    (Some(name.to_string()), Some(path.to_string()))
                }
                _ => return None,
            };
            (HeaderKind::Profile, name, attachment)
        };

        Some(Self {
            indent: leading_whitespace(body).to_string(),
            kind,
            name,
            attachment,
            clauses,
            flags,
            comment_gap: trailing_whitespace(body).to_string(),
            comment: comment.to_string(),
        })
    }

    /// Canonical form, e.g. `<indent>profile <name> <path> <clauses> flags=(...) {`.
    pub fn render(&self) -> String {
        let mut out = self.indent.clone();
        let name = self.name.as_deref().unwrap_or_default();
        match self.kind {
            HeaderKind::CaretHat => {
                out.push('^');
                out.push_str(name);
            }
            HeaderKind::Hat => {
                out.push_str("hat ");
                out.push_str(name);
            }
            HeaderKind::Profile => {
                out.push_str("profile");
                if let Some(name) = &self.name {
                    out.push(' ');
                    out.push_str(name);
                }
                if let Some(path) = &self.attachment {
                    out.push(' ');
                    out.push_str(path);
                }
            }
        }
        for clause in &self.clauses {
            out.push(' ');
            out.push_str(clause);
        }
        if !self.flags.is_empty() {
            out.push(' ');
            out.push_str(&self.flags.to_string());
        }
        out.push_str(" {");
        if !self.comment.is_empty() {
            out.push_str(&self.comment_gap);
            out.push_str(&self.comment);
        }
        out
    }
}
