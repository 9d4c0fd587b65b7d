//! Opens and saves documents through a [`FileSystem`]
//!
//! The host keeps the stamp of what it last read or wrote for every open
//! resource. The stamp table doubles as the exclusive section shared with
//! the [`ExternalChangeReconciler`](crate::ExternalChangeReconciler): a save
//! and a reconciliation of the same resource never interleave.

use quire_common::FileSystem;
use quire_editor::{EditSession, EditorError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::reconciler::ResourceStamp;

pub(crate) type StampTable = Arc<Mutex<HashMap<PathBuf, ResourceStamp>>>;

pub(crate) fn lock_stamps(stamps: &StampTable) -> MutexGuard<'_, HashMap<PathBuf, ResourceStamp>> {
    stamps.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Editor(#[from] EditorError),
}

pub type HostResult<T> = Result<T, HostError>;

pub struct EditorHost {
    fs: Arc<dyn FileSystem>,
    config: EngineConfig,
    stamps: StampTable,
}

impl EditorHost {
    pub fn new(fs: Arc<dyn FileSystem>, config: EngineConfig) -> Self {
        Self {
            fs,
            config,
            stamps: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read a document and start an editing session on it
    ///
    /// Text that does not parse still opens, read-only.
    pub fn open(&self, path: impl Into<PathBuf>) -> HostResult<Rc<EditSession>> {
        let path = path.into();
        let text = {
            let mut stamps = lock_stamps(&self.stamps);
            let text = self.fs.read_to_string(&path)?;
            stamps.insert(path.clone(), ResourceStamp::observe(self.fs.as_ref(), &path, &text)?);
            text
        };
        tracing::info!(path = %path.display(), "document opened");
        Ok(EditSession::open(path, text, self.config.document_options()))
    }

    /// Write the session's text and make it the saved baseline
    pub fn save(&self, session: &EditSession) -> HostResult<ResourceStamp> {
        if session.is_read_only() {
            return Err(EditorError::ReadOnlyViolation.into());
        }
        let path = session.path()?;
        let text = session.text()?;

        let stamp = {
            let mut stamps = lock_stamps(&self.stamps);
            self.fs.write(&path, &text)?;
            let stamp = ResourceStamp::observe(self.fs.as_ref(), &path, &text)?;
            stamps.insert(path.clone(), stamp);
            stamp
        };
        session.mark_saved()?;
        tracing::info!(path = %path.display(), "document saved");
        Ok(stamp)
    }

    /// Stamp of what the engine last read or wrote
    pub fn stamp(&self, path: &Path) -> Option<ResourceStamp> {
        lock_stamps(&self.stamps).get(path).copied()
    }

    pub(crate) fn stamps(&self) -> StampTable {
        self.stamps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_common::MockFileSystem;
    use quire_editor::EditCommand;
    use quire_parser::content_hash;

    #[test]
    fn test_open_edit_save() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/work/pom.xml", "<project><version>1</version></project>");
        let host = EditorHost::new(fs.clone(), EngineConfig::default());

        let session = host.open("/work/pom.xml").unwrap();
        let opened = host.stamp(Path::new("/work/pom.xml")).unwrap();
        assert_eq!(opened.hash, content_hash("<project><version>1</version></project>"));

        let version = session
            .with_model(|m| m.find_path(&["version"]).map(|n| n.id.clone()))
            .unwrap()
            .flatten()
            .unwrap();
        session.execute(EditCommand::set_text(&version, Some("2"))).unwrap();
        assert!(session.is_dirty());

        let saved = host.save(&session).unwrap();
        assert!(!session.is_dirty());
        assert_eq!(
            fs.contents(Path::new("/work/pom.xml")).unwrap(),
            "<project><version>2</version></project>"
        );
        assert_ne!(saved, opened);
        assert_eq!(host.stamp(Path::new("/work/pom.xml")), Some(saved));
    }

    #[test]
    fn test_degraded_document_is_not_saved() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/work/broken.xml", "<project>");
        let host = EditorHost::new(fs, EngineConfig::default());

        let session = host.open("/work/broken.xml").unwrap();
        assert!(session.is_read_only());
        assert!(matches!(
            host.save(&session),
            Err(HostError::Editor(EditorError::ReadOnlyViolation))
        ));
    }

    #[test]
    fn test_missing_file() {
        let host = EditorHost::new(Arc::new(MockFileSystem::new()), EngineConfig::default());
        assert!(matches!(host.open("/nope.xml"), Err(HostError::Io(_))));
    }
}
