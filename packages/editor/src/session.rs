//! # Edit Session
//!
//! The editing domain of one open document, shared by every view of it.
//!
//! An EditSession owns the [`Document`] and the [`ChangeBus`], and keeps a
//! registry of the view bindings attached to it so document-wide conditions
//! (reloads, conflicts) reach all of them.
//!
//! Sessions live on the interactive thread. Methods take `&self`: listeners
//! reacting to a notification may issue further commands, which run
//! immediately and have their notifications queued behind the current one.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use quire_parser::ast::{ObjectModel, TextRange};

use crate::binding::BindingInner;
use crate::builder::CommandBuilder;
use crate::bus::{ChangeBus, ChangeEvent, ChangeListener, Notification, Subscription};
use crate::document::{Document, DocumentOptions};
use crate::errors::{EditorError, EditorResult, ErrorKind};
use crate::mutations::CompoundCommand;

pub struct EditSession {
    document: RefCell<Document>,
    bus: ChangeBus,
    bindings: RefCell<Vec<Weak<BindingInner>>>,
}

impl EditSession {
    pub fn new(document: Document) -> Rc<Self> {
        Rc::new(Self {
            document: RefCell::new(document),
            bus: ChangeBus::new(),
            bindings: RefCell::new(Vec::new()),
        })
    }

    pub fn open(path: impl Into<PathBuf>, source: impl Into<String>, options: DocumentOptions) -> Rc<Self> {
        Self::new(Document::with_options(path.into(), source.into(), options))
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Listen to model changes without a view page
    pub fn subscribe(&self, scope: Option<&str>, listener: Rc<dyn ChangeListener>) -> Subscription {
        self.bus.subscribe(scope, listener)
    }

    /// Read access to the document
    ///
    /// Fails with [`EditorError::Reentrant`] while the document is being changed.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> EditorResult<R> {
        let document = self.document.try_borrow().map_err(|_| EditorError::Reentrant)?;
        Ok(f(&document))
    }

    /// Read access to the object model, `None` while the document is degraded
    pub fn with_model<R>(&self, f: impl FnOnce(&ObjectModel) -> R) -> EditorResult<Option<R>> {
        self.read(|document| document.model().map(f))
    }

    /// Construct commands with fresh node ids
    pub fn build<R>(&self, f: impl FnOnce(&mut CommandBuilder<'_>) -> R) -> EditorResult<R> {
        let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
        let mut builder = document.builder()?;
        Ok(f(&mut builder))
    }

    pub fn execute(&self, command: impl Into<CompoundCommand>) -> EditorResult<()> {
        let notifications = {
            let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
            document.execute(command)?
        };
        self.bus.publish(notifications);
        Ok(())
    }

    /// Undo the last transaction; `false` when there was nothing to undo
    pub fn undo(&self) -> EditorResult<bool> {
        let notifications = {
            let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
            if document.is_read_only() {
                return Err(EditorError::ReadOnlyViolation);
            }
            if !document.can_undo() {
                return Ok(false);
            }
            document.undo()?
        };
        self.bus.publish(notifications);
        Ok(true)
    }

    pub fn redo(&self) -> EditorResult<bool> {
        let notifications = {
            let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
            if document.is_read_only() {
                return Err(EditorError::ReadOnlyViolation);
            }
            if !document.can_redo() {
                return Ok(false);
            }
            document.redo()?
        };
        self.bus.publish(notifications);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.read(Document::can_undo).unwrap_or(false)
    }

    pub fn can_redo(&self) -> bool {
        self.read(Document::can_redo).unwrap_or(false)
    }

    pub fn is_dirty(&self) -> bool {
        self.read(Document::is_dirty).unwrap_or(false)
    }

    pub fn is_read_only(&self) -> bool {
        self.read(Document::is_read_only).unwrap_or(false)
    }

    pub fn unsaved_changes(&self) -> usize {
        self.read(Document::unsaved_changes).unwrap_or(0)
    }

    pub fn version(&self) -> u64 {
        self.read(|document| document.version).unwrap_or(0)
    }

    pub fn path(&self) -> EditorResult<PathBuf> {
        self.read(|document| document.path.clone())
    }

    pub fn text(&self) -> EditorResult<String> {
        self.read(|document| document.text().to_string())
    }

    pub fn locate(&self, node_id: &str) -> Option<TextRange> {
        self.read(|document| document.locate(node_id)).ok().flatten()
    }

    pub fn locate_attribute(&self, node_id: &str, name: &str) -> Option<TextRange> {
        self.read(|document| document.locate_attribute(node_id, name))
            .ok()
            .flatten()
    }

    /// Mark the current state as saved, returning the text to write
    pub fn mark_saved(&self) -> EditorResult<String> {
        let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
        document.mark_saved();
        Ok(document.text().to_string())
    }

    /// Keep the edits over a foreign write: no history state matches the
    /// stored text any more, so the session stays dirty until saved
    pub fn forget_saved(&self) -> EditorResult<()> {
        let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
        document.forget_saved();
        Ok(())
    }

    /// Replace the text with what is stored now, discarding history
    ///
    /// Every listener hears [`ChangeEvent::Reloaded`]; every bound view is
    /// told to reload and re-binds to the new model. When the new text does
    /// not parse the document turns read-only and the views report it.
    pub fn reload(&self, text: String) -> EditorResult<()> {
        let result = {
            let mut document = self.document.try_borrow_mut().map_err(|_| EditorError::Reentrant)?;
            document.replace_source(text)
        };
        tracing::info!(degraded = result.is_err(), "document reloaded");

        self.bus.notify(Notification::global(ChangeEvent::Reloaded));
        for binding in self.live_bindings() {
            binding.reload_required();
        }

        result.map_err(EditorError::from)
    }

    /// Report a document-wide condition to every live view
    pub fn broadcast_error(&self, kind: ErrorKind, message: &str) {
        for binding in self.live_bindings() {
            binding.report(kind, message);
        }
    }

    /// Dispose every view bound to this session
    pub fn close(&self) {
        for binding in self.live_bindings() {
            binding.dispose();
        }
        self.bindings.borrow_mut().clear();
    }

    pub fn binding_count(&self) -> usize {
        self.live_bindings().len()
    }

    pub(crate) fn register(&self, binding: Weak<BindingInner>) {
        self.bindings.borrow_mut().push(binding);
    }

    pub(crate) fn unregister(&self, binding: &Weak<BindingInner>) {
        if let Ok(mut bindings) = self.bindings.try_borrow_mut() {
            bindings.retain(|b| !b.ptr_eq(binding) && b.strong_count() > 0);
        }
    }

    fn live_bindings(&self) -> Vec<Rc<BindingInner>> {
        let mut bindings = self.bindings.borrow_mut();
        bindings.retain(|b| b.strong_count() > 0);
        bindings
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|b| !b.is_disposed())
            .collect()
    }
}
