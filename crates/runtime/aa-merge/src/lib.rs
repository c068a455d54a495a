//! aa-merge: duplicate file-rule merger
//!
//! Collapses adjacent file rules that share indentation, qualifiers and path
//! into one rule carrying the union of their permissions. Dry run by default;
//! writes go through [`aa_core::SafeWriter`] so every overwrite is backed up.

pub mod dedupe;
pub mod merge;

pub use dedupe::{ChangedFile, DedupeReport, DedupeRun, FileFailure};
pub use merge::{merge_duplicates, merge_text};
