//! Permission atoms.
//!
//! `rw` is two atoms (`r`, `w`); exec-mode tokens such as `ix`, `Px` or
//! `Pix` stay whole so transitions are never split into letters.

use std::fmt;

/// Duplicate-free, first-seen ordered permission atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    atoms: Vec<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize a raw permission clause.
    pub fn tokenize(raw: &str) -> Self {
        let normalized = raw.replace(',', " ");
        let mut set = Self::new();

        for token in normalized.split_whitespace() {
            if is_exec_token(token) {
                set.insert(token);
            } else {
                for ch in token.chars() {
                    let mut buf = [0u8; 4];
                    set.insert(ch.encode_utf8(&mut buf));
                }
            }
        }

        set
    }

    /// Add an atom. Returns false if it was already present.
    pub fn insert(&mut self, atom: &str) -> bool {
        if self.contains(atom) {
            return false;
        }
        self.atoms.push(atom.to_string());
        true
    }

    pub fn contains(&self, atom: &str) -> bool {
        self.atoms.iter().any(|a| a == atom)
    }

    /// Append the atoms of `other` not already present.
    pub fn extend(&mut self, other: &PermissionSet) {
        for atom in &other.atoms {
            self.insert(atom);
        }
    }

    /// Atoms of `self` followed by the new atoms of `other`.
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        let mut merged = self.clone();
        merged.extend(other);
        merged
    }

    pub fn atoms(&self) -> &[String] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for atom in &self.atoms {
            f.write_str(atom)?;
        }
        Ok(())
    }
}

fn is_exec_token(token: &str) -> bool {
    token.chars().count() > 1 && token.to_ascii_lowercase().ends_with('x')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms(set: &PermissionSet) -> Vec<&str> {
        set.atoms().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_tokenize_letters() {
        let set = PermissionSet::tokenize("rwk");
        assert_eq!(atoms(&set), vec!["r", "w", "k"]);
    }

    #[test]
    fn test_tokenize_keeps_exec_tokens() {
        let set = PermissionSet::tokenize("r ix");
        assert_eq!(atoms(&set), vec!["r", "ix"]);

        let set = PermissionSet::tokenize("mr Pix");
        assert_eq!(atoms(&set), vec!["m", "r", "Pix"]);

        let set = PermissionSet::tokenize("PX");
        assert_eq!(atoms(&set), vec!["PX"]);
    }

    #[test]
    fn test_tokenize_single_x_is_letter() {
        let set = PermissionSet::tokenize("x");
        assert_eq!(atoms(&set), vec!["x"]);
    }

    #[test]
    fn test_tokenize_commas_and_whitespace() {
        let set = PermissionSet::tokenize(" r,\tw ,  r ");
        assert_eq!(atoms(&set), vec!["r", "w"]);
    }

    #[test]
    fn test_union_first_seen_order() {
        let a = PermissionSet::tokenize("rw");
        let b = PermissionSet::tokenize("kwr m");
        assert_eq!(atoms(&a.union(&b)), vec!["r", "w", "k", "m"]);
        assert_eq!(atoms(&b.union(&a)), vec!["k", "w", "r", "m"]);
    }

    #[test]
    fn test_union_with_self() {
        let a = PermissionSet::tokenize("mr ix");
        assert_eq!(a.union(&a), a);
    }

    #[test]
    fn test_display_concatenates() {
        let set = PermissionSet::tokenize("r w ix");
        assert_eq!(set.to_string(), "rwix");
    }
}
