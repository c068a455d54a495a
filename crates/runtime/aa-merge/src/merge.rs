//! Merge consecutive duplicate file rules.
//!
//! ```text
//!   /usr/bin/foo r,          ┐
//!                            │ run (same indent, qualifiers, path)
//!   # keep me                │
//!   /usr/bin/foo w,          ┘
//!   capability chown,          ends the run
//! ```
//!
//! becomes
//!
//! ```text
//!   /usr/bin/foo rw,
//!
//!   # keep me
//!   capability chown,
//! ```

use aa_core::{
    classify_line, Line, LineKind, MergeKey, PermissionSet, PolicyFile, RuleLine, Terminator,
};
use tracing::debug;

/// Rule run being accumulated.
struct PendingRun {
    key: MergeKey,
    first: RuleLine,
    first_raw: Line,
    permissions: PermissionSet,
    /// (gap, comment) of the first member that had a comment
    comment: Option<(String, String)>,
    terminator: Terminator,
    members: usize,
    gaps: Vec<Line>,
}

impl PendingRun {
    fn start(rule: RuleLine, raw: Line) -> Self {
        let comment = (!rule.comment.is_empty())
            .then(|| (rule.comment_gap.clone(), rule.comment.clone()));
        Self {
            key: rule.key(),
            permissions: rule.rule.permissions.clone(),
            terminator: raw.terminator,
            first: rule,
            first_raw: raw,
            comment,
            members: 1,
            gaps: Vec::new(),
        }
    }

    fn absorb(&mut self, rule: RuleLine) {
        self.permissions.extend(&rule.rule.permissions);
        if self.comment.is_none() && !rule.comment.is_empty() {
            self.comment = Some((rule.comment_gap, rule.comment));
        }
        self.members += 1;
    }

    fn flush(self, out: &mut Vec<Line>) {
        if self.members == 1 {
            out.push(self.first_raw);
        } else {
            let mut merged = self.first.rule;
            merged.permissions = self.permissions;
            let mut content = format!("{}{}", self.first.indent, merged.render());
            if let Some((gap, comment)) = self.comment {
                content.push_str(&gap);
                content.push_str(&comment);
            }
            debug!(path = %merged.path, members = self.members, "merged rule run");
            out.push(Line::new(content, self.terminator));
        }
        out.extend(self.gaps);
    }
}

/// Collapse every run of adjacent same-key file rules into one line.
pub fn merge_duplicates(file: &PolicyFile) -> PolicyFile {
    let mut out = Vec::with_capacity(file.len());
    let mut pending: Option<PendingRun> = None;

    for line in file.lines() {
        match classify_line(&line.content) {
            LineKind::Trivia => match pending.as_mut() {
                Some(run) => run.gaps.push(line.clone()),
                None => out.push(line.clone()),
            },
            LineKind::Rule(rule) => match pending.as_mut() {
                Some(run) if run.key == rule.key() => run.absorb(rule),
                _ => {
                    if let Some(run) = pending.take() {
                        run.flush(&mut out);
                    }
                    pending = Some(PendingRun::start(rule, line.clone()));
                }
            },
            LineKind::Header(_) | LineKind::Opaque => {
                if let Some(run) = pending.take() {
                    run.flush(&mut out);
                }
                out.push(line.clone());
            }
        }
    }

    if let Some(run) = pending.take() {
        run.flush(&mut out);
    }

    PolicyFile::from_lines(out)
}

/// Text-level convenience over [`merge_duplicates`].
pub fn merge_text(text: &str) -> String {
    merge_duplicates(&PolicyFile::parse(text)).render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_adjacent_rules() {
        let input = "  /usr/bin/foo r,\n  /usr/bin/foo w,\n";
        assert_eq!(merge_text(input), "  /usr/bin/foo rw,\n");
    }

    #[test]
    fn test_blank_gap_is_kept_once() {
        let input = "/x r,\n\n/x r,\n";
        assert_eq!(merge_text(input), "/x r,\n\n");
    }

    #[test]
    fn test_non_adjacent_duplicates_stay() {
        let input = "/a r,\n/b w,\n/a r,\n";
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_different_indent_or_qualifier_not_merged() {
        let input = "  /a r,\n    /a w,\n  owner /a w,\n  deny /a w,\n";
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_qualifier_case_and_order_merge() {
        let input = "  owner audit /a r,\n  AUDIT Owner /a k,\n";
        assert_eq!(merge_text(input), "  audit owner /a rk,\n");
    }

    #[test]
    fn test_comments_preserved() {
        let input = concat!(
            "  /etc/foo r,\n",
            "  # reason for write\n",
            "  /etc/foo w,  # needed by bar\n",
            "  /etc/foo k, # ignored duplicate comment\n",
            "}\n",
        );
        let expected = concat!(
            "  /etc/foo rwk,  # needed by bar\n",
            "  # reason for write\n",
            "}\n",
        );
        assert_eq!(merge_text(input), expected);
    }

    #[test]
    fn test_exec_tokens_kept_whole() {
        let input = "  /usr/bin/env r,\n  /usr/bin/env ix,\n  /usr/bin/env r,\n";
        assert_eq!(merge_text(input), "  /usr/bin/env rix,\n");
    }

    #[test]
    fn test_single_rule_is_verbatim() {
        let input = "  OWNER   /tmp/x   rw ,   # odd spacing\n";
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_opaque_lines_untouched() {
        let input = concat!(
            "#include <tunables/global>\n",
            "profile foo /usr/bin/foo {\n",
            "  /usr/bin/foo Px -> bar,\n",
            "  /usr/bin/foo Px -> bar,\n",
            "  capability chown,\n",
            "  capability chown,\n",
            "}\n",
        );
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_legacy_include_ends_run() {
        let input = "  /a r,\n  #include <abstractions/base>\n  /a w,\n";
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_header_ends_run() {
        let input = "/a r,\nprofile x /a {\n/a w,\n";
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let input = "/a r,\r\n/a w,";
        assert_eq!(merge_text(input), "/a rw,\r\n");

        let input = "/a r,\n/b r,";
        assert_eq!(merge_text(input), input);
    }

    #[test]
    fn test_trailing_gaps_flushed() {
        let input = "/a r,\n/a w,\n\n# end\n";
        assert_eq!(merge_text(input), "/a rw,\n\n# end\n");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "  /a r,\n\n  /a w,\n  # c\n  /a ix,\n  /b r,\n  /b r,\n}\n",
            "/a r,\n/b w,\n/a r,\n",
            "owner /a r, # x\nowner /a w,\n\n\ndeny /a w,\n",
            "profile foo {\n  /x r,\n  /x mr,\n}\n",
        ];
        for input in inputs {
            let once = merge_text(input);
            assert_eq!(merge_text(&once), once, "not idempotent for {input:?}");
        }
    }
}
