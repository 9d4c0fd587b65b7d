//! # Command Stack
//!
//! Undo/redo history of one document plus its save point.
//!
//! ## Design
//!
//! - Every executed transaction is recorded with, per step, the command, its
//!   inverse and the text patch it produced
//! - Undo replays inverses and reverted patches, redo replays both forward
//! - Executing a new transaction drops everything that could be redone
//! - The save point is a cursor position; the document is dirty whenever the
//!   cursor sits elsewhere. A save point that falls off the stack (trimmed or
//!   truncated) can never be reached again
//!
//! The stack only keeps the bookkeeping. [`crate::Document`] peeks at the
//! next transaction, replays it, and commits the cursor move only once the
//! replay succeeded.

use crate::mutations::EditCommand;
use quire_parser::TextPatch;

pub const DEFAULT_UNDO_LEVELS: usize = 100;

/// One command as it was executed
#[derive(Debug, Clone)]
pub struct AppliedStep {
    pub command: EditCommand,
    pub inverse: EditCommand,
    pub patch: TextPatch,
}

/// Steps executed, undone and redone together
#[derive(Debug, Clone)]
pub struct Transaction {
    pub description: Option<String>,
    pub steps: Vec<AppliedStep>,
}

impl Transaction {
    pub fn new(description: Option<String>, steps: Vec<AppliedStep>) -> Self {
        Self { description, steps }
    }
}

#[derive(Debug)]
pub struct CommandStack {
    entries: Vec<Transaction>,

    /// Number of entries currently applied
    cursor: usize,

    /// Cursor position of the last save, `None` once unreachable
    saved: Option<usize>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl CommandStack {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_UNDO_LEVELS)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            saved: Some(0),
            max_levels,
        }
    }

    /// Record an executed transaction
    pub fn push(&mut self, transaction: Transaction) {
        // New action invalidates the future
        self.entries.truncate(self.cursor);
        if self.saved.is_some_and(|s| s > self.cursor) {
            self.saved = None;
        }

        self.entries.push(transaction);
        self.cursor += 1;

        if self.max_levels > 0 && self.entries.len() > self.max_levels {
            self.entries.remove(0);
            self.cursor -= 1;
            self.saved = self.saved.and_then(|s| s.checked_sub(1));
        }
    }

    /// Transaction the next undo reverts
    pub fn peek_undo(&self) -> Option<&Transaction> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Transaction the next redo replays
    pub fn peek_redo(&self) -> Option<&Transaction> {
        self.entries.get(self.cursor)
    }

    pub fn commit_undo(&mut self) {
        if self.can_undo() {
            self.cursor -= 1;
        }
    }

    pub fn commit_redo(&mut self) {
        if self.can_redo() {
            self.cursor += 1;
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn undo_levels(&self) -> usize {
        self.cursor
    }

    pub fn redo_levels(&self) -> usize {
        self.entries.len() - self.cursor
    }

    pub fn is_dirty(&self) -> bool {
        self.saved != Some(self.cursor)
    }

    /// Mark the current position as matching the stored text
    pub fn mark_saved(&mut self) {
        self.saved = Some(self.cursor);
    }

    /// The stored text no longer matches any state in the history
    pub fn forget_saved(&mut self) {
        self.saved = None;
    }

    /// Transactions applied since the save point, when it is behind the cursor
    pub fn unsaved_levels(&self) -> usize {
        match self.saved {
            Some(saved) => self.cursor.abs_diff(saved),
            None => self.cursor.max(1),
        }
    }

    /// Drop all history; the current state becomes the save point
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.saved = Some(0);
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.peek_undo().and_then(|t| t.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.peek_redo().and_then(|t| t.description.as_deref())
    }
}

impl Default for CommandStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(label: &str) -> Transaction {
        let step = AppliedStep {
            command: EditCommand::set_text("n", Some(label)),
            inverse: EditCommand::set_text("n", None),
            patch: TextPatch::empty(""),
        };
        Transaction::new(Some(label.to_string()), vec![step])
    }

    #[test]
    fn test_stack_creation() {
        let stack = CommandStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
        assert!(!stack.is_dirty());
    }

    #[test]
    fn test_undo_redo_cursor() {
        let mut stack = CommandStack::new();
        stack.push(transaction("a"));
        stack.push(transaction("b"));
        assert_eq!(stack.undo_description(), Some("b"));

        stack.commit_undo();
        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.redo_levels(), 1);
        assert_eq!(stack.redo_description(), Some("b"));

        stack.commit_redo();
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut stack = CommandStack::new();
        stack.push(transaction("a"));
        stack.commit_undo();
        assert_eq!(stack.redo_levels(), 1);

        stack.push(transaction("b"));
        assert_eq!(stack.redo_levels(), 0);
        assert_eq!(stack.undo_description(), Some("b"));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut stack = CommandStack::new();
        for label in ["a", "b", "c"] {
            stack.push(transaction(label));
        }
        assert!(stack.is_dirty());

        stack.mark_saved();
        assert!(!stack.is_dirty());

        stack.commit_undo();
        assert!(stack.is_dirty());
        assert_eq!(stack.unsaved_levels(), 1);

        stack.commit_redo();
        assert!(!stack.is_dirty());
    }

    #[test]
    fn test_truncated_save_point_stays_dirty() {
        let mut stack = CommandStack::new();
        stack.push(transaction("a"));
        stack.push(transaction("b"));
        stack.mark_saved();
        stack.commit_undo();
        stack.push(transaction("c"));

        stack.commit_undo();
        assert!(stack.is_dirty());
        assert_eq!(stack.undo_levels(), 1);
    }

    #[test]
    fn test_forgotten_save_point_stays_dirty() {
        let mut stack = CommandStack::new();
        stack.push(transaction("a"));
        stack.forget_saved();

        stack.commit_undo();
        assert!(stack.is_dirty());
        stack.commit_redo();
        assert!(stack.is_dirty());

        stack.mark_saved();
        assert!(!stack.is_dirty());
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut stack = CommandStack::with_max_levels(2);
        for label in ["a", "b", "c"] {
            stack.push(transaction(label));
        }

        assert_eq!(stack.undo_levels(), 2);
        stack.commit_undo();
        stack.commit_undo();
        assert!(!stack.can_undo());
        // The initial state fell off the stack with "a"
        assert!(stack.is_dirty());
    }
}
