//! Enforcement-mode rewrite of profile headers.

use std::path::Path;

use aa_core::{Mode, PolicyFile, ProfileHeader};
use tracing::debug;

/// Symbolic profile name for a file: base name with `.` replaced by `_`.
pub fn profile_name_for(relative_path: &Path) -> String {
    relative_path
        .file_name()
        .map(|n| n.to_string_lossy().replace('.', "_"))
        .unwrap_or_default()
}

/// Put every profile header of `text` into `mode`.
///
/// The opposite mode is dropped, `mode` is appended when missing and the
/// header is re-rendered as `profile <name> <path> flags=(...) {`. Hats keep
/// their `^name` or `hat name` form and other clauses stay as written. The first
/// header without a symbolic name gets one derived from the file name.
/// Everything else is left byte-identical.
pub fn ensure_mode(text: &str, mode: Mode, relative_path: &Path) -> String {
    let mut file = PolicyFile::parse(text);
    let fallback_name = profile_name_for(relative_path);
    let mut first_header = true;

    for line in file.lines_mut() {
        let Some(mut header) = ProfileHeader::parse(&line.content) else {
            continue;
        };

        header.flags.set_mode(mode);
        if header.name.is_none() && first_header && !fallback_name.is_empty() {
            header.name = Some(fallback_name.clone());
        }
        first_header = false;

        let rendered = header.render();
        if rendered != line.content {
            debug!(from = %line.content, to = %rendered, "rewrote header");
            line.content = rendered;
        }
    }

    file.render()
}
