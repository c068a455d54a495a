//! Rule-line grammar.
//!
//! Deliberately narrow: a line is a profile header, a single-line file
//! rule, trivia, or opaque text. Nested blocks, conditionals and multi-line
//! rules are never interpreted.

use crate::header::ProfileHeader;
use crate::permission::PermissionSet;

/// Qualifiers in canonical output order.
const QUALIFIERS: [&str; 3] = ["audit", "deny", "owner"];

/// Leading keywords of rules that are not file rules.
const NON_FILE_KEYWORDS: &[&str] = &[
    "abi",
    "capability",
    "change_hat",
    "change_profile",
    "dbus",
    "include",
    "io_uring",
    "link",
    "mount",
    "mqueue",
    "network",
    "pivot_root",
    "profile",
    "ptrace",
    "remount",
    "rlimit",
    "set",
    "signal",
    "umount",
    "unix",
    "userns",
];

/// Split a line at the first `#` outside double quotes.
///
/// The comment half keeps its `#`. A backslash escapes the next character.
pub fn split_comment(line: &str) -> (&str, &str) {
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return (&line[..idx], &line[idx..]),
            _ => {}
        }
    }

    (line, "")
}

/// Take one whitespace-delimited word, treating quoted spans as part of it.
pub(crate) fn take_token(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }

    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => return Some((&text[..idx], &text[idx..])),
            _ => {}
        }
    }

    Some((text, ""))
}

/// All quote-aware words of `text`.
pub(crate) fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut rest = text;
    while let Some((word, tail)) = take_token(rest) {
        words.push(word);
        rest = tail;
    }
    words
}

/// True for `/abs/path`, `@{var}/path` and their quoted forms.
pub fn is_path_token(token: &str) -> bool {
    let inner = token.strip_prefix('"').unwrap_or(token);
    inner.starts_with('/') || inner.starts_with("@{")
}

/// A single-line file access rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRule {
    /// Lowercase, de-duplicated, canonical order
    pub qualifiers: Vec<String>,
    pub path: String,
    pub permissions: PermissionSet,
}

impl FileRule {
    pub fn qualifier_string(&self) -> String {
        self.qualifiers.join(" ")
    }

    /// Rule text without indentation or comment, e.g. `owner /tmp/x rw,`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for qualifier in &self.qualifiers {
            out.push_str(qualifier);
            out.push(' ');
        }
        out.push_str(&self.path);
        out.push(' ');
        out.push_str(&self.permissions.to_string());
        out.push(',');
        out
    }
}

/// Parse the trimmed, comment-free body of a line as a file rule.
pub fn parse_file_rule(trimmed_body: &str) -> Option<FileRule> {
    let body = trimmed_body.trim();
    if body.contains("->") {
        return None;
    }
    let clause = body.strip_suffix(',')?.trim_end();

    let mut seen = [false; QUALIFIERS.len()];
    let mut rest = clause;
    loop {
        let (word, tail) = take_token(rest)?;
        let lower = word.to_ascii_lowercase();
        if let Some(pos) = QUALIFIERS.iter().position(|q| *q == lower) {
            seen[pos] = true;
            rest = tail;
            continue;
        }
        if lower.starts_with("#include") || NON_FILE_KEYWORDS.contains(&lower.as_str()) {
            return None;
        }
        break;
    }

    let (path, tail) = take_token(rest)?;
    if !is_path_token(path) {
        return None;
    }

    let raw = tail.trim();
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || c == ',')
    {
        return None;
    }
    let permissions = PermissionSet::tokenize(raw);
    if permissions.is_empty() {
        return None;
    }

    let qualifiers = QUALIFIERS
        .iter()
        .zip(seen)
        .filter(|(_, present)| *present)
        .map(|(q, _)| q.to_string())
        .collect();

    Some(FileRule {
        qualifiers,
        path: path.to_string(),
        permissions,
    })
}

/// Identity of mergeable rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub indent: String,
    pub qualifiers: String,
    pub path: String,
}

/// A file rule together with its surrounding layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLine {
    pub indent: String,
    pub rule: FileRule,
    /// Whitespace between the rule body and the comment
    pub comment_gap: String,
    pub comment: String,
}

impl RuleLine {
    pub fn key(&self) -> MergeKey {
        MergeKey {
            indent: self.indent.clone(),
            qualifiers: self.rule.qualifier_string(),
            path: self.rule.path.clone(),
        }
    }
}

/// Outcome of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Blank or comment-only
    Trivia,
    Header(ProfileHeader),
    Rule(RuleLine),
    Opaque,
}

/// Classify one line (without its terminator).
pub fn classify_line(line: &str) -> LineKind {
    // Legacy include syntax, not a comment
    if line.trim_start().starts_with("#include") {
        return LineKind::Opaque;
    }

    let (body, comment) = split_comment(line);
    if body.trim().is_empty() {
        return LineKind::Trivia;
    }

    if let Some(header) = ProfileHeader::parse(line) {
        return LineKind::Header(header);
    }

    let indent = leading_whitespace(body);
    match parse_file_rule(body.trim()) {
        Some(rule) => LineKind::Rule(RuleLine {
            indent: indent.to_string(),
            rule,
            comment_gap: trailing_whitespace(body).to_string(),
            comment: comment.to_string(),
        }),
        None => LineKind::Opaque,
    }
}

pub(crate) fn leading_whitespace(text: &str) -> &str {
    &text[..text.len() - text.trim_start().len()]
}

pub(crate) fn trailing_whitespace(text: &str) -> &str {
    &text[text.trim_end().len()..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_comment_plain() {
        assert_eq!(split_comment("/foo r, # note"), ("/foo r, ", "# note"));
        assert_eq!(split_comment("/foo r,"), ("/foo r,", ""));
        assert_eq!(split_comment("# only"), ("", "# only"));
    }

    #[test]
    fn test_split_comment_respects_quotes() {
        assert_eq!(
            split_comment(r#""/a#b" r, # real"#),
            (r#""/a#b" r, "#, "# real")
        );
        assert_eq!(split_comment(r##""/a\"#" r,"##), (r##""/a\"#" r,"##, ""));
    }

    #[test]
    fn test_parse_simple_rule() {
        let rule = parse_file_rule("/usr/bin/foo rw,").unwrap();
        assert!(rule.qualifiers.is_empty());
        assert_eq!(rule.path, "/usr/bin/foo");
        assert_eq!(rule.permissions.to_string(), "rw");
    }

    #[test]
    fn test_parse_qualifiers_normalized() {
        let rule = parse_file_rule("Owner AUDIT @{HOME}/.cache/** rwk,").unwrap();
        assert_eq!(rule.qualifier_string(), "audit owner");
        assert_eq!(rule.path, "@{HOME}/.cache/**");
        assert_eq!(rule.render(), "audit owner @{HOME}/.cache/** rwk,");
    }

    #[test]
    fn test_parse_quoted_path() {
        let rule = parse_file_rule(r#"deny "/opt/my app/data" w,"#).unwrap();
        assert_eq!(rule.path, r#""/opt/my app/data""#);
        assert_eq!(rule.qualifier_string(), "deny");
    }

    #[test]
    fn test_parse_rejects_non_rules() {
        for body in [
            "/usr/bin/foo Px -> bar,",
            "/usr/bin/foo r",
            "include <abstractions/base>",
            "include if exists <local/foo>,",
            "capability sys_admin,",
            "deny capability sys_module,",
            "network inet stream,",
            "dbus send bus=system,",
            "owner,",
            "/usr/bin/foo,",
            "file,",
            "foo/bar r,",
            "signal (receive) peer=unconfined,",
            "/tmp/x peer=(label=foo),",
        ] {
            assert!(parse_file_rule(body).is_none(), "accepted {body:?}");
        }
    }

    #[test]
    fn test_classify_outcomes() {
        assert_eq!(classify_line(""), LineKind::Trivia);
        assert_eq!(classify_line("   # comment"), LineKind::Trivia);
        assert_eq!(classify_line("  #include <tunables/global>"), LineKind::Opaque);
        assert_eq!(classify_line("  # include is prose here"), LineKind::Trivia);
        assert!(matches!(
            classify_line("profile foo /usr/bin/foo {"),
            LineKind::Header(_)
        ));
        assert!(matches!(classify_line("  /etc/foo r,"), LineKind::Rule(_)));
        assert_eq!(classify_line("  capability chown,"), LineKind::Opaque);
        assert_eq!(classify_line("}"), LineKind::Opaque);
    }

    #[test]
    fn test_classify_rule_layout() {
        let LineKind::Rule(rule) = classify_line("\t/etc/foo r,   # why") else {
            panic!("expected rule");
        };
        assert_eq!(rule.indent, "\t");
        assert_eq!(rule.comment_gap, "   ");
        assert_eq!(rule.comment, "# why");
        assert_eq!(
            rule.key(),
            MergeKey {
                indent: "\t".into(),
                qualifiers: String::new(),
                path: "/etc/foo".into(),
            }
        );
    }

    #[test]
    fn test_split_words_quotes() {
        assert_eq!(
            split_words(r#"profile foo "/opt/a b" x"#),
            vec!["profile", "foo", r#""/opt/a b""#, "x"]
        );
    }
}
