use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use quire_common::RealFileSystem;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::reconciler::ResourceChange;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    CreateError(#[from] notify::Error),

    #[error("Watch error: {0}")]
    WatchError(String),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

/// Turns file system notifications into [`ResourceChange`]s
///
/// Watching a file watches its directory and filters on the file; watching
/// a directory reports every file below it.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
    target: Option<PathBuf>,
    debounce: Duration,
}

impl FileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> WatcherResult<Self> {
        let path = path.into();
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        let target = if path.is_dir() {
            watcher.watch(&path, RecursiveMode::Recursive)?;
            None
        } else {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            Some(path.file_name().map(PathBuf::from).ok_or_else(|| {
                WatcherError::WatchError(format!("not a file path: {}", path.display()))
            })?)
        };

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            target,
            debounce: Duration::from_millis(50),
        })
    }

    /// Events arriving within `debounce` of each other are coalesced
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn next_event(&self) -> Option<Event> {
        match self.receiver.recv() {
            Ok(Ok(event)) => Some(event),
            Ok(Err(err)) => {
                tracing::error!("Watch error: {}", err);
                None
            }
            Err(_) => None,
        }
    }

    pub fn try_next_event(&self) -> Option<Event> {
        match self.receiver.try_recv() {
            Ok(Ok(event)) => Some(event),
            _ => None,
        }
    }

    /// Wait up to `timeout` for modifications, then report each changed
    /// file once with its current content hash
    ///
    /// Files that vanished or cannot be read are skipped.
    pub fn next_changes(&self, timeout: Duration) -> Vec<ResourceChange> {
        let mut paths = BTreeSet::new();
        let deadline = Instant::now() + timeout;

        // First relevant event, then whatever follows within the debounce window
        let mut window_end: Option<Instant> = None;
        loop {
            let until = window_end.unwrap_or(deadline);
            let wait = until.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(wait) {
                Ok(Ok(event)) => {
                    let before = paths.len();
                    self.collect(event, &mut paths);
                    if paths.len() > before && window_end.is_none() {
                        window_end = Some(Instant::now() + self.debounce);
                    }
                }
                Ok(Err(err)) => tracing::error!("Watch error: {}", err),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if Instant::now() >= until {
                break;
            }
        }

        paths
            .into_iter()
            .filter_map(|path| ResourceChange::observe(&RealFileSystem, &path).ok())
            .collect()
    }

    fn collect(&self, event: Event, paths: &mut BTreeSet<PathBuf>) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }
        for path in event.paths {
            let wanted = match &self.target {
                Some(name) => path.file_name() == Some(name.as_os_str()),
                None => true,
            };
            if wanted && path.is_file() {
                paths.insert(path);
            }
        }
    }
}
