//! # Document Handle
//!
//! One structured document: its text, its object model, and the command
//! stack that edits both.
//!
//! ## Lifecycle
//!
//! ```text
//! Open → Parse → Execute/Undo/Redo → Save
//!   ↓      ↓            ↓              ↓
//! Text  Model    Model + TextPatch   Save point
//! ```
//!
//! A document whose text does not parse is opened in a degraded, read-only
//! state: the text is kept as is and every edit fails with
//! [`EditorError::ReadOnlyViolation`] until a reload brings parseable text.
//!
//! Every command runs in four steps: plan the patch, apply it to the model,
//! apply it to the text, re-parse and verify. A failure at any step restores
//! model and text to how they were before the transaction started.

use std::path::PathBuf;

use quire_parser::ast::{ObjectModel, TextRange};
use quire_parser::{IDGenerator, ParseError};

use crate::bridge::{DocumentBridge, DEFAULT_INDENT_UNIT};
use crate::builder::CommandBuilder;
use crate::bus::{ChangeEvent, Notification};
use crate::errors::{EditorError, EditorResult};
use crate::mutations::CompoundCommand;
use crate::undo_stack::{AppliedStep, CommandStack, Transaction, DEFAULT_UNDO_LEVELS};

/// Tunables of a document
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub undo_levels: usize,
    pub indent_unit: String,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            undo_levels: DEFAULT_UNDO_LEVELS,
            indent_unit: DEFAULT_INDENT_UNIT.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct Document {
    /// Path to source file
    pub path: PathBuf,

    /// Current version number (increments on every change of the model)
    pub version: u64,

    storage: DocumentStorage,
    stack: CommandStack,
    ids: IDGenerator,
}

/// Editing state of the text
#[derive(Debug)]
pub enum DocumentStorage {
    /// Text and model in step
    Parsed {
        bridge: DocumentBridge,
        model: ObjectModel,
    },

    /// Text that does not parse; read-only until reloaded
    Degraded {
        bridge: DocumentBridge,
        error: ParseError,
    },
}

/// Direction of a history replay
#[derive(Clone, Copy)]
enum Replay {
    Undo,
    Redo,
}

impl Document {
    pub fn from_source(path: PathBuf, source: String) -> Self {
        Self::with_options(path, source, DocumentOptions::default())
    }

    pub fn with_options(path: PathBuf, source: String, options: DocumentOptions) -> Self {
        let mut ids = IDGenerator::new(&path.to_string_lossy());
        let bridge = DocumentBridge::new(source).with_indent_unit(options.indent_unit);
        let storage = load(bridge, &mut ids);

        Self {
            path,
            version: 0,
            storage,
            stack: CommandStack::with_max_levels(options.undo_levels),
            ids,
        }
    }

    pub fn text(&self) -> &str {
        self.bridge().source()
    }

    pub fn model(&self) -> Option<&ObjectModel> {
        match &self.storage {
            DocumentStorage::Parsed { model, .. } => Some(model),
            DocumentStorage::Degraded { .. } => None,
        }
    }

    pub fn storage(&self) -> &DocumentStorage {
        &self.storage
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        match &self.storage {
            DocumentStorage::Parsed { .. } => None,
            DocumentStorage::Degraded { error, .. } => Some(error),
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.storage, DocumentStorage::Degraded { .. })
    }

    /// Builder for commands against the current model
    pub fn builder(&mut self) -> EditorResult<CommandBuilder<'_>> {
        match &self.storage {
            DocumentStorage::Parsed { model, .. } => Ok(CommandBuilder::new(model, &mut self.ids)),
            DocumentStorage::Degraded { .. } => Err(EditorError::ReadOnlyViolation),
        }
    }

    /// Execute a transaction, returning the changes it made
    ///
    /// An empty transaction changes nothing and is not recorded.
    pub fn execute(&mut self, command: impl Into<CompoundCommand>) -> EditorResult<Vec<Notification>> {
        let compound = command.into();
        let (bridge, model) = parts(&mut self.storage)?;
        if compound.is_empty() {
            return Ok(Vec::new());
        }

        let before = (model.clone(), bridge.source().to_string());
        let mut steps = Vec::with_capacity(compound.len());
        let mut notifications = Vec::with_capacity(compound.len());

        for command in &compound.commands {
            let step = bridge.plan(command, model).map_err(EditorError::from).and_then(|patch| {
                let (inverse, event) = command.apply(model)?;
                bridge.apply(&patch)?;
                bridge.sync(model)?;
                Ok((AppliedStep { command: command.clone(), inverse, patch }, event))
            });

            match step {
                Ok((step, event)) => {
                    notifications.push(notification(model, event));
                    steps.push(step);
                }
                Err(err) => {
                    tracing::warn!(command = command.name(), error = %err, "edit rolled back");
                    restore(bridge, model, before);
                    return Err(err);
                }
            }
        }

        tracing::debug!(transaction = %compound.describe(), steps = steps.len(), "executed");
        self.stack.push(Transaction::new(Some(compound.describe()), steps));
        self.version += 1;
        Ok(notifications)
    }

    /// Revert the most recent transaction; nothing happens when there is none
    pub fn undo(&mut self) -> EditorResult<Vec<Notification>> {
        let Some(transaction) = self.stack.peek_undo().cloned() else {
            return Ok(Vec::new());
        };
        let notifications = self.replay(&transaction, Replay::Undo)?;
        self.stack.commit_undo();
        Ok(notifications)
    }

    /// Re-apply the most recently undone transaction
    pub fn redo(&mut self) -> EditorResult<Vec<Notification>> {
        let Some(transaction) = self.stack.peek_redo().cloned() else {
            return Ok(Vec::new());
        };
        let notifications = self.replay(&transaction, Replay::Redo)?;
        self.stack.commit_redo();
        Ok(notifications)
    }

    /// Replay recorded steps; the text is verified once at the end
    fn replay(&mut self, transaction: &Transaction, direction: Replay) -> EditorResult<Vec<Notification>> {
        let (bridge, model) = parts(&mut self.storage)?;
        let before = (model.clone(), bridge.source().to_string());
        let mut notifications = Vec::with_capacity(transaction.steps.len());

        let ordered: Box<dyn Iterator<Item = &AppliedStep>> = match direction {
            Replay::Undo => Box::new(transaction.steps.iter().rev()),
            Replay::Redo => Box::new(transaction.steps.iter()),
        };

        let mut result = Ok(());
        for step in ordered {
            let applied = match direction {
                Replay::Undo => step.inverse.apply(model).map_err(EditorError::from).and_then(|(_, event)| {
                    bridge.revert(&step.patch)?;
                    Ok(event)
                }),
                Replay::Redo => step.command.apply(model).map_err(EditorError::from).and_then(|(_, event)| {
                    bridge.apply(&step.patch)?;
                    Ok(event)
                }),
            };
            match applied {
                Ok(event) => notifications.push(event),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        if let Err(err) = result.and_then(|()| bridge.sync(model).map_err(EditorError::from)) {
            tracing::warn!(error = %err, "history replay rolled back");
            restore(bridge, model, before);
            return Err(err);
        }

        self.version += 1;
        Ok(notifications
            .into_iter()
            .map(|event| notification(model, event))
            .collect())
    }

    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }

    /// The transaction the next undo would revert, with its text patches
    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.stack.peek_undo()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.stack.undo_description()
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.stack.redo_description()
    }

    /// Whether the text differs from the last save point
    pub fn is_dirty(&self) -> bool {
        self.stack.is_dirty()
    }

    /// Number of transactions between the save point and now
    pub fn unsaved_changes(&self) -> usize {
        if self.is_dirty() {
            self.stack.unsaved_levels()
        } else {
            0
        }
    }

    /// Record that the current text has been written out
    pub fn mark_saved(&mut self) {
        self.stack.mark_saved();
    }

    /// The stored text changed under the document; stay dirty until saved
    pub fn forget_saved(&mut self) {
        self.stack.forget_saved();
    }

    /// Replace the whole text, dropping all history
    ///
    /// The document ends up degraded when the new text does not parse.
    pub fn replace_source(&mut self, source: String) -> Result<(), ParseError> {
        let mut bridge = self.bridge().clone();
        bridge.replace_source(source);

        self.storage = load(bridge, &mut self.ids);
        self.stack.clear();
        self.version += 1;

        match self.parse_error() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Text range of an element, for reveal-in-source
    pub fn locate(&self, node_id: &str) -> Option<TextRange> {
        match &self.storage {
            DocumentStorage::Parsed { bridge, model } => bridge.locate(model, node_id),
            DocumentStorage::Degraded { .. } => None,
        }
    }

    pub fn locate_attribute(&self, node_id: &str, name: &str) -> Option<TextRange> {
        match &self.storage {
            DocumentStorage::Parsed { bridge, model } => bridge.locate_attribute(model, node_id, name),
            DocumentStorage::Degraded { .. } => None,
        }
    }

    fn bridge(&self) -> &DocumentBridge {
        match &self.storage {
            DocumentStorage::Parsed { bridge, .. } | DocumentStorage::Degraded { bridge, .. } => bridge,
        }
    }
}

fn load(bridge: DocumentBridge, ids: &mut IDGenerator) -> DocumentStorage {
    match bridge.parse(ids) {
        Ok(model) => DocumentStorage::Parsed { bridge, model },
        Err(error) => {
            tracing::warn!(%error, "document does not parse, opened read-only");
            DocumentStorage::Degraded { bridge, error }
        }
    }
}

fn parts(storage: &mut DocumentStorage) -> EditorResult<(&mut DocumentBridge, &mut ObjectModel)> {
    match storage {
        DocumentStorage::Parsed { bridge, model } => Ok((bridge, model)),
        DocumentStorage::Degraded { .. } => Err(EditorError::ReadOnlyViolation),
    }
}

fn restore(bridge: &mut DocumentBridge, model: &mut ObjectModel, before: (ObjectModel, String)) {
    let (old_model, old_text) = before;
    *model = old_model;
    bridge.replace_source(old_text);
}

/// Attach the ids of every element the event touches
fn notification(model: &ObjectModel, event: ChangeEvent) -> Notification {
    let scope = match &event {
        ChangeEvent::Added { node, .. }
        | ChangeEvent::AttributeChanged { node, .. }
        | ChangeEvent::TextChanged { node, .. } => model.ancestry(node),
        ChangeEvent::Removed { parent, node, .. } => {
            let mut scope = model.ancestry(parent);
            scope.push(node.clone());
            scope
        }
        ChangeEvent::Moved { node, old_parent, .. } => {
            let mut scope = model.ancestry(node);
            scope.extend(model.ancestry(old_parent));
            scope
        }
        ChangeEvent::Reloaded => Vec::new(),
    };
    Notification::new(event, scope)
}
