//! # External Change Reconciler
//!
//! Decides what happens when a document's backing resource changes behind
//! the engine's back.
//!
//! ```text
//! ResourceChange ──→ same hash as last read/write? ──yes──→ Unchanged
//!                          │ no
//!                          ↓
//!                   unsaved edits? ──no──→ reload session, invalidate
//!                          │ yes           derived data → Reloaded
//!                          ↓
//!                   broadcast conflict ──→ resolve(Reload | KeepMine)
//! ```
//!
//! Unsaved edits are never discarded without an explicit
//! [`ConflictChoice::Reload`].

use chrono::{DateTime, Utc};
use quire_common::FileSystem;
use quire_editor::{EditSession, EditorError, ErrorKind};
use quire_parser::content_hash;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use thiserror::Error;

use crate::host::{lock_stamps, EditorHost, StampTable};
use crate::scheduler::DerivedDataScheduler;

/// What a resource looked like when the engine last read or wrote it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStamp {
    pub modified: Option<DateTime<Utc>>,
    pub hash: u32,
}

impl ResourceStamp {
    /// Stamp `text`, which was just read from or written to `path`
    pub fn observe(fs: &dyn FileSystem, path: &Path, text: &str) -> io::Result<Self> {
        Ok(Self {
            modified: fs.modified(path)?.map(DateTime::<Utc>::from),
            hash: content_hash(text),
        })
    }
}

/// A resource was modified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub resource_id: PathBuf,
    pub timestamp: Option<DateTime<Utc>>,
    pub hash: u32,
}

impl ResourceChange {
    /// Describe the current state of `path`
    pub fn observe(fs: &dyn FileSystem, path: &Path) -> io::Result<Self> {
        let text = fs.read_to_string(path)?;
        let stamp = ResourceStamp::observe(fs, path, &text)?;
        Ok(Self {
            resource_id: path.to_path_buf(),
            timestamp: stamp.modified,
            hash: stamp.hash,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Content is what the engine already has
    Unchanged,
    /// No open session for the resource
    Untracked,
    Reloaded,
    /// Reloaded, but the new text does not parse; the document is read-only
    Degraded(String),
    /// Unsaved edits collide with the change; waiting for a decision
    Conflict { unsaved: usize },
    /// The change was acknowledged and the local edits kept
    KeptLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Drop the local edits and take the new content
    Reload,
    /// Keep editing; the next save overwrites the new content
    KeepMine,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error("No pending conflict for {}", .0.display())]
    NoConflict(PathBuf),

    #[error("Resource is not open: {}", .0.display())]
    Untracked(PathBuf),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

pub struct ExternalChangeReconciler {
    fs: Arc<dyn FileSystem>,
    stamps: StampTable,
    sessions: HashMap<PathBuf, Weak<EditSession>>,
    conflicts: HashMap<PathBuf, ResourceStamp>,
    scheduler: Option<DerivedDataScheduler>,
}

impl ExternalChangeReconciler {
    pub fn new(host: &EditorHost) -> Self {
        Self {
            fs: host.filesystem().clone(),
            stamps: host.stamps(),
            sessions: HashMap::new(),
            conflicts: HashMap::new(),
            scheduler: None,
        }
    }

    /// Invalidate derived data of reloaded documents in `scheduler`
    pub fn with_scheduler(mut self, scheduler: DerivedDataScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn track(&mut self, session: &Rc<EditSession>) -> ReconcileResult<()> {
        let path = session.path()?;
        self.sessions.insert(path, Rc::downgrade(session));
        Ok(())
    }

    pub fn untrack(&mut self, path: &Path) {
        self.sessions.remove(path);
        self.conflicts.remove(path);
    }

    pub fn has_conflict(&self, path: &Path) -> bool {
        self.conflicts.contains_key(path)
    }

    /// Compare `path` against its stamp without waiting for an event
    pub fn check(&mut self, path: &Path) -> ReconcileResult<Reconciliation> {
        let change = ResourceChange::observe(self.fs.as_ref(), path)?;
        self.handle(change)
    }

    pub fn handle(&mut self, change: ResourceChange) -> ReconcileResult<Reconciliation> {
        let path = change.resource_id.clone();
        let Some(session) = self.session(&path) else {
            tracing::debug!(path = %path.display(), "change to untracked resource");
            return Ok(Reconciliation::Untracked);
        };
        let Some((text, stamp)) = self.read_foreign(&change)? else {
            return Ok(Reconciliation::Unchanged);
        };

        if session.is_dirty() {
            let unsaved = session.unsaved_changes();
            if self.conflicts.get(&path).map(|s| s.hash) == Some(stamp.hash) {
                return Ok(Reconciliation::Conflict { unsaved });
            }
            self.conflicts.insert(path.clone(), stamp);
            tracing::info!(path = %path.display(), unsaved, "external change conflicts with unsaved edits");
            let conflict = EditorError::ReconciliationConflict { unsaved };
            session.broadcast_error(ErrorKind::ReconciliationConflict, &conflict.to_string());
            return Ok(Reconciliation::Conflict { unsaved });
        }

        self.conflicts.remove(&path);
        self.reload(&path, &session, text, stamp)
    }

    /// Settle a pending conflict
    pub fn resolve(&mut self, path: &Path, choice: ConflictChoice) -> ReconcileResult<Reconciliation> {
        if !self.conflicts.contains_key(path) {
            return Err(ReconcileError::NoConflict(path.to_path_buf()));
        }
        let session = self
            .session(path)
            .ok_or_else(|| ReconcileError::Untracked(path.to_path_buf()))?;

        let outcome = match choice {
            ConflictChoice::Reload => {
                let text = {
                    let _section = lock_stamps(&self.stamps);
                    self.fs.read_to_string(path)?
                };
                let stamp = ResourceStamp::observe(self.fs.as_ref(), path, &text)?;
                self.reload(path, &session, text, stamp)?
            }
            ConflictChoice::KeepMine => {
                let mut stamps = lock_stamps(&self.stamps);
                session.forget_saved()?;
                let change = ResourceChange::observe(self.fs.as_ref(), path)?;
                stamps.insert(
                    path.to_path_buf(),
                    ResourceStamp {
                        modified: change.timestamp,
                        hash: change.hash,
                    },
                );
                tracing::info!(path = %path.display(), "keeping local edits over external change");
                Reconciliation::KeptLocal
            }
        };
        self.conflicts.remove(path);
        Ok(outcome)
    }

    fn session(&mut self, path: &Path) -> Option<Rc<EditSession>> {
        let session = self.sessions.get(path)?.upgrade();
        if session.is_none() {
            self.sessions.remove(path);
        }
        session
    }

    /// Current text and stamp of the resource, unless the engine has it already
    fn read_foreign(&self, change: &ResourceChange) -> ReconcileResult<Option<(String, ResourceStamp)>> {
        let path = &change.resource_id;
        let mut stamps = lock_stamps(&self.stamps);
        let known = stamps.get(path).map(|s| s.hash);

        if known == Some(change.hash) {
            // Own write, or a touch that left the content alone
            if let Some(stamp) = stamps.get_mut(path) {
                stamp.modified = change.timestamp;
            }
            return Ok(None);
        }

        // The event may be stale; trust what is stored now
        let text = self.fs.read_to_string(path)?;
        let stamp = ResourceStamp::observe(self.fs.as_ref(), path, &text)?;
        if known == Some(stamp.hash) {
            return Ok(None);
        }
        Ok(Some((text, stamp)))
    }

    fn reload(
        &self,
        path: &Path,
        session: &EditSession,
        text: String,
        stamp: ResourceStamp,
    ) -> ReconcileResult<Reconciliation> {
        // Views re-request derived data while re-binding
        if let Some(scheduler) = &self.scheduler {
            scheduler.invalidate(path);
        }
        let outcome = match session.reload(text) {
            Ok(()) => Reconciliation::Reloaded,
            Err(EditorError::Parse(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "reloaded text does not parse");
                Reconciliation::Degraded(err.to_string())
            }
            Err(err) => return Err(err.into()),
        };
        lock_stamps(&self.stamps).insert(path.to_path_buf(), stamp);
        tracing::info!(path = %path.display(), "reloaded after external change");
        Ok(outcome)
    }
}
