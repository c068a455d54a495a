//! `@{exec_path}` definition injection.
//!
//! Upstream profiles often attach through `@{exec_path}` and rely on a
//! definition that lives elsewhere. When a profile uses the variable without
//! defining it, a definition is derived from the binary paths the profile
//! mentions and inserted right above the first profile header.

use std::path::Path;

use aa_core::{split_comment, Line, PolicyFile, ProfileHeader, Terminator};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::mode::profile_name_for;

pub const EXEC_PATH_VARIABLE: &str = "exec_path";
const EXEC_PATH_USAGE: &str = "@{exec_path}";

/// Directories a derived binary path may live in.
pub const EXECUTABLE_DIRS: [&str; 7] = [
    "/usr/local/bin",
    "/usr/bin",
    "/usr/sbin",
    "/bin",
    "/sbin",
    "/usr/libexec",
    "/libexec",
];

lazy_static! {
    static ref DEFINITION: Regex = Regex::new(r"^\s*@\{exec_path\}\s*\+?=(.*)$").unwrap();
    static ref CANDIDATE: Regex = Regex::new(
        r"(?:/usr/local/bin|/usr/bin|/usr/sbin|/usr/libexec|/bin|/sbin|/libexec)/[A-Za-z0-9._+\-]+"
    )
    .unwrap();
}

/// Value of an `@{exec_path}` definition line, if the line is one.
fn definition_value(content: &str) -> Option<&str> {
    let (body, _) = split_comment(content);
    DEFINITION
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Binary paths mentioned in `text`, with their byte offsets.
fn candidates(text: &str) -> Vec<(usize, &str)> {
    CANDIDATE
        .find_iter(text)
        .filter(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            let clean_start = !matches!(
                before,
                Some(c) if c.is_ascii_alphanumeric() || "_}/.-@".contains(c)
            );
            let clean_end = !matches!(after, Some(c) if "*?[{@/".contains(c));
            clean_start && clean_end
        })
        .map(|m| (m.start(), m.as_str()))
        .collect()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Names a binary of this profile could plausibly carry.
fn expected_names(text: &str, relative_path: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(name) = PolicyFile::parse(text)
        .lines()
        .iter()
        .find_map(|l| ProfileHeader::parse(&l.content))
        .and_then(|h| h.name)
    {
        names.push(name);
    }
    if let Some(file_name) = relative_path.file_name().map(|n| n.to_string_lossy().to_string()) {
        if let Some(last) = file_name.rsplit('.').next() {
            names.push(last.to_string());
        }
        names.push(profile_name_for(relative_path));
        names.push(file_name);
    }
    names.retain(|n| !n.is_empty());
    names
}

/// `usr.sbin.tor` → `/usr/sbin/tor`, when that lands in an executable dir.
fn synthesized_path(relative_path: &Path) -> Option<String> {
    let file_name = relative_path.file_name()?.to_string_lossy();
    let path = format!("/{}", file_name.replace('.', "/"));
    EXECUTABLE_DIRS
        .iter()
        .any(|dir| {
            path.strip_prefix(dir)
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        })
        .then_some(path)
}

/// Pick the binary path for `@{exec_path}`.
///
/// Precedence: basename matches the profile name, then the first candidate
/// before the first variable usage, then the first candidate anywhere, then
/// a path synthesized from the file name.
pub fn derive_exec_path(text: &str, relative_path: &Path) -> Option<String> {
    let found = candidates(text);
    let names = expected_names(text, relative_path);

    if let Some((_, path)) = found
        .iter()
        .find(|(_, p)| names.iter().any(|n| n == basename(p)))
    {
        return Some(path.to_string());
    }

    if let Some(first_use) = text.find(EXEC_PATH_USAGE) {
        if let Some((_, path)) = found.iter().find(|(offset, _)| *offset < first_use) {
            return Some(path.to_string());
        }
    }

    if let Some((_, path)) = found.first() {
        return Some(path.to_string());
    }

    synthesized_path(relative_path)
}

/// Insert an `@{exec_path}` definition when the profile uses it undefined.
///
/// Never overrides an existing definition. Leaves the text unchanged when no
/// usable path or no profile header is found.
pub fn ensure_variable(text: &str, relative_path: &Path) -> String {
    let file = PolicyFile::parse(text);

    let uses_variable = file.lines().iter().any(|l| {
        definition_value(&l.content).is_none()
            && split_comment(&l.content).0.contains(EXEC_PATH_USAGE)
    });
    if !uses_variable {
        return text.to_string();
    }

    if file
        .lines()
        .iter()
        .any(|l| definition_value(&l.content).is_some_and(|v| !v.is_empty()))
    {
        return text.to_string();
    }

    // Only empty definitions remain here
    let lines: Vec<Line> = file
        .into_lines()
        .into_iter()
        .filter(|l| definition_value(&l.content).is_none())
        .collect();
    let stripped = PolicyFile::from_lines(lines);
    let stripped_text = stripped.render();

    let Some(exec_path) = derive_exec_path(&stripped_text, relative_path) else {
        debug!(path = %relative_path.display(), "no binary path found for @{{exec_path}}");
        return text.to_string();
    };
    let Some(header_idx) = stripped
        .lines()
        .iter()
        .position(|l| ProfileHeader::parse(&l.content).is_some())
    else {
        return text.to_string();
    };

    let mut lines = stripped.into_lines();
    let terminator = match lines[header_idx].terminator {
        Terminator::None => Terminator::Lf,
        other => other,
    };
    let definition = format!("@{{{}}}={}", EXEC_PATH_VARIABLE, exec_path);
    debug!(path = %relative_path.display(), %definition, "injected variable");
    lines.insert(header_idx, Line::new(definition, terminator));

    PolicyFile::from_lines(lines).render()
}
