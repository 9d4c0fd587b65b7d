//! Error types for the editor

use crate::bridge::BridgeError;
use crate::mutations::MutationError;
use quire_parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Edit failed: {0}")]
    EditFailed(BridgeError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Document is read-only")]
    ReadOnlyViolation,

    #[error("External change conflicts with {unsaved} unsaved edit(s)")]
    ReconciliationConflict { unsaved: usize },

    #[error("View is disposed")]
    Disposed,

    #[error("Document is busy")]
    Reentrant,
}

/// Error categories reported to view pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    EditFailed,
    ReadOnlyViolation,
    Resolution,
    ReconciliationConflict,
    Disposed,
}

impl EditorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EditorError::Parse(_) => ErrorKind::Parse,
            EditorError::EditFailed(_) | EditorError::Mutation(_) | EditorError::Reentrant => {
                ErrorKind::EditFailed
            }
            EditorError::ReadOnlyViolation => ErrorKind::ReadOnlyViolation,
            EditorError::Disposed => ErrorKind::Disposed,
            EditorError::ReconciliationConflict { .. } => ErrorKind::ReconciliationConflict,
        }
    }
}

impl From<BridgeError> for EditorError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Mutation(err) => EditorError::Mutation(err),
            other => EditorError::EditFailed(other),
        }
    }
}

pub type EditorResult<T> = Result<T, EditorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposal_has_its_own_kind() {
        assert_eq!(EditorError::Disposed.kind(), ErrorKind::Disposed);
        assert_eq!(EditorError::ReadOnlyViolation.kind(), ErrorKind::ReadOnlyViolation);
        assert_eq!(EditorError::Reentrant.kind(), ErrorKind::EditFailed);
        assert_eq!(
            EditorError::ReconciliationConflict { unsaved: 1 }.kind(),
            ErrorKind::ReconciliationConflict
        );
    }
}
