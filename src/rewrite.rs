//! Source Rewriter - applies insertion edits to the original buffer
//!
//! Edits carry offsets into the ORIGINAL buffer and are applied in
//! descending offset order, so no edit ever shifts the target of another.
//! Insertions never remove or reorder existing bytes: every byte of the
//! input appears in the output, in order, with checkpoint text spliced
//! between.
//!
//! Ties (two edits at the same offset) keep their creation order, which is
//! document order. Applied back to front, the later-created edit lands
//! first in the output; for same-offset loop exits this prints the inner
//! loop's exit before the outer's, matching execution order.

use crate::{Error, Result};

/// One insertion into the original buffer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte offset into the original buffer
    pub offset: usize,
    /// Text to splice in at `offset`
    pub text: String,
}

impl Edit {
    pub fn new(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }
}

/// Apply every edit to `source`, back to front.
///
/// Offsets are validated up front: past-the-end or mid-codepoint offsets
/// mean a placement bug, and no partial output is produced for them.
pub fn apply_edits(source: &str, edits: &[Edit]) -> Result<String> {
    for edit in edits {
        if edit.offset > source.len() || !source.is_char_boundary(edit.offset) {
            return Err(Error::InvalidEdit {
                offset: edit.offset,
                len: source.len(),
            });
        }
    }

    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.offset.cmp(&a.offset));

    let added: usize = edits.iter().map(|e| e.text.len()).sum();
    let mut out = String::with_capacity(source.len() + added);
    out.push_str(source);
    for edit in sorted {
        out.insert_str(edit.offset, &edit.text);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_edits_is_identity() {
        let source = "fn main() {}\n";
        assert_eq!(apply_edits(source, &[]).unwrap(), source);
    }

    #[test]
    fn test_offsets_refer_to_original_buffer() {
        // Both offsets predate any insertion; applying low-to-high with
        // these offsets would land "Y" one byte early.
        let source = "abcdef";
        let edits = vec![Edit::new(2, "X"), Edit::new(4, "Y")];
        assert_eq!(apply_edits(source, &edits).unwrap(), "abXcdYef");
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let source = "abcdef";
        let forward = vec![Edit::new(2, "X"), Edit::new(4, "Y")];
        let backward = vec![Edit::new(4, "Y"), Edit::new(2, "X")];
        assert_eq!(
            apply_edits(source, &forward).unwrap(),
            apply_edits(source, &backward).unwrap()
        );
    }

    #[test]
    fn test_same_offset_keeps_creation_order_nesting() {
        // Two exits at one offset: the later-created (inner) edit must
        // print first, like the inner loop finishing first.
        let source = "loop-end";
        let edits = vec![Edit::new(8, "<outer>"), Edit::new(8, "<inner>")];
        assert_eq!(
            apply_edits(source, &edits).unwrap(),
            "loop-end<inner><outer>"
        );
    }

    #[test]
    fn test_every_original_byte_survives() {
        let source = "def f():\n    return 1\n";
        let edits = vec![
            Edit::new(9, "    enter()\n"),
            Edit::new(source.len(), "exit()\n"),
        ];
        let out = apply_edits(source, &edits).unwrap();
        let mut stripped = out.clone();
        stripped = stripped.replace("    enter()\n", "");
        stripped = stripped.replace("exit()\n", "");
        assert_eq!(stripped, source);
    }

    #[test]
    fn test_out_of_range_offset_is_rejected() {
        let source = "short";
        let edits = vec![Edit::new(99, "x")];
        assert!(matches!(
            apply_edits(source, &edits),
            Err(Error::InvalidEdit { offset: 99, len: 5 })
        ));
    }

    #[test]
    fn test_mid_codepoint_offset_is_rejected() {
        let source = "é"; // two bytes
        let edits = vec![Edit::new(1, "x")];
        assert!(apply_edits(source, &edits).is_err());
    }
}
