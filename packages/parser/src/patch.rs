//! Incremental text patches.
//!
//! A [`TextPatch`] is an ordered list of replacements plus the content
//! hashes of the text before and after. The hashes make patch application
//! idempotent: applying a patch to text that already carries its result is a
//! no-op, applying it to anything else than its base is a conflict.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CRC32 of a document text
pub fn content_hash(text: &str) -> u32 {
    crc32fast::hash(text.as_bytes())
}

/// Replace `removed` at `offset` with `inserted`
///
/// Offsets are relative to the text produced by the preceding edits of the
/// same patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub offset: usize,
    pub removed: String,
    pub inserted: String,
}

impl TextEdit {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            removed: String::new(),
            inserted: text.into(),
        }
    }

    /// Replace `range` of `source`
    pub fn replace(source: &str, range: std::ops::Range<usize>, text: impl Into<String>) -> Self {
        Self {
            offset: range.start,
            removed: source[range].to_string(),
            inserted: text.into(),
        }
    }

    pub fn delete(source: &str, range: std::ops::Range<usize>) -> Self {
        Self::replace(source, range, String::new())
    }

    pub fn inverted(&self) -> Self {
        Self {
            offset: self.offset,
            removed: self.inserted.clone(),
            inserted: self.removed.clone(),
        }
    }

    fn apply(&self, text: &mut String) -> Result<(), PatchError> {
        let end = self.offset + self.removed.len();
        match text.get(self.offset..end) {
            Some(current) if current == self.removed => {
                text.replace_range(self.offset..end, &self.inserted);
                Ok(())
            }
            _ => Err(PatchError::Mismatch {
                offset: self.offset,
                expected: self.removed.clone(),
            }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("Text at {offset} does not match the expected {expected:?}")]
    Mismatch { offset: usize, expected: String },

    #[error("Patch was computed against a different revision of the text")]
    Conflict,
}

/// Whether applying a patch changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPatch {
    pub edits: Vec<TextEdit>,
    pub base_hash: u32,
    pub result_hash: u32,
}

impl TextPatch {
    /// Build a patch for `base`, checking every edit against it
    pub fn build(base: &str, edits: Vec<TextEdit>) -> Result<Self, PatchError> {
        let mut result = base.to_string();
        for edit in &edits {
            edit.apply(&mut result)?;
        }

        Ok(Self {
            edits,
            base_hash: content_hash(base),
            result_hash: content_hash(&result),
        })
    }

    /// A patch that changes nothing
    pub fn empty(base: &str) -> Self {
        let hash = content_hash(base);
        Self {
            edits: Vec::new(),
            base_hash: hash,
            result_hash: hash,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply to `text` in place
    pub fn apply(&self, text: &mut String) -> Result<PatchOutcome, PatchError> {
        let current = content_hash(text);
        if current != self.base_hash {
            if current == self.result_hash {
                return Ok(PatchOutcome::AlreadyApplied);
            }
            return Err(PatchError::Conflict);
        }
        if self.is_empty() {
            return Ok(PatchOutcome::Applied);
        }

        let mut patched = text.clone();
        for edit in &self.edits {
            edit.apply(&mut patched)?;
        }
        *text = patched;
        Ok(PatchOutcome::Applied)
    }

    /// The patch that undoes this one
    pub fn inverted(&self) -> Self {
        Self {
            edits: self.edits.iter().rev().map(TextEdit::inverted).collect(),
            base_hash: self.result_hash,
            result_hash: self.base_hash,
        }
    }

    /// Apply to a copy of `base`
    pub fn apply_to(&self, base: &str) -> Result<String, PatchError> {
        let mut text = base.to_string();
        self.apply(&mut text)?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_invert() {
        let base = r#"<a><b x="1"/></a>"#;
        let patch = TextPatch::build(base, vec![TextEdit::replace(base, 9..10, "2")]).unwrap();

        let mut text = base.to_string();
        assert_eq!(patch.apply(&mut text), Ok(PatchOutcome::Applied));
        assert_eq!(text, r#"<a><b x="2"/></a>"#);

        assert_eq!(patch.inverted().apply(&mut text), Ok(PatchOutcome::Applied));
        assert_eq!(text, base);
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let base = "<a></a>";
        let patch = TextPatch::build(base, vec![TextEdit::insert(3, "<c/>")]).unwrap();

        let mut text = base.to_string();
        patch.apply(&mut text).unwrap();
        assert_eq!(patch.apply(&mut text), Ok(PatchOutcome::AlreadyApplied));
        assert_eq!(text, "<a><c/></a>");
    }

    #[test]
    fn test_conflict_on_foreign_text() {
        let patch = TextPatch::build("<a/>", vec![TextEdit::insert(2, " x=\"1\"")]).unwrap();
        let mut text = "<b/>".to_string();
        assert_eq!(patch.apply(&mut text), Err(PatchError::Conflict));
        assert_eq!(text, "<b/>");
    }

    #[test]
    fn test_multi_edit_inversion() {
        let base = "<a><b/><c/></a>";
        let edits = vec![TextEdit::delete(base, 3..7), TextEdit::insert(7, "<b/>")];
        let patch = TextPatch::build(base, edits).unwrap();

        let moved = patch.apply_to(base).unwrap();
        assert_eq!(moved, "<a><c/><b/></a>");
        assert_eq!(patch.inverted().apply_to(&moved).unwrap(), base);
    }

    #[test]
    fn test_build_rejects_stale_edit() {
        let err = TextPatch::build("<a/>", vec![TextEdit { offset: 0, removed: "<b".into(), inserted: String::new() }]);
        assert!(matches!(err, Err(PatchError::Mismatch { offset: 0, .. })));
    }
}
