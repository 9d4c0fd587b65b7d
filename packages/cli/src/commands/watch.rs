use anyhow::Result;
use clap::Args;
use colored::Colorize;
use quire_common::RealFileSystem;
use quire_editor::{ChangeEvent, ErrorKind, ObjectModel, ViewBinding, ViewPage};
use quire_workspace::{EditorHost, EngineConfig, ExternalChangeReconciler, FileWatcher, Reconciliation};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::absolute;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Document to follow
    pub file: PathBuf,

    /// Stop after this many changes
    #[arg(long)]
    pub count: Option<usize>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Prints what the session tells its views
struct ConsolePage;

impl ViewPage for ConsolePage {
    fn on_bound(&self, model: &ObjectModel) {
        println!("  {} {} elements", "loaded".cyan(), model.len());
    }

    fn on_event(&self, _event: &ChangeEvent) {}

    fn on_error(&self, kind: ErrorKind, message: &str) {
        eprintln!("  {} {:?}: {}", "!".yellow(), kind, message);
    }
}

pub fn watch(args: WatchArgs, cwd: &Path) -> Result<()> {
    let config = EngineConfig::load(cwd)?;
    let path = absolute(cwd, &args.file);
    let watcher = FileWatcher::new(path.clone())?.with_debounce(config.watch_debounce());

    let host = EditorHost::new(Arc::new(RealFileSystem), config);
    let session = host.open(path.clone())?;
    let mut reconciler = ExternalChangeReconciler::new(&host);
    reconciler.track(&session)?;

    println!("👀 {} {}", "Watching".green().bold(), args.file.display());
    let binding = ViewBinding::new(&session, Rc::new(ConsolePage));
    binding.activate()?;

    let deadline = args.timeout.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut handled = 0;
    while args.count.map_or(true, |count| handled < count) && deadline.map_or(true, |d| Instant::now() < d) {
        for change in watcher.next_changes(Duration::from_secs(1)) {
            if change.resource_id.file_name() != path.file_name() {
                continue;
            }
            handled += 1;
            match reconciler.handle(change) {
                Ok(outcome) => println!("{} {}", "→".blue(), describe(&outcome)),
                Err(err) => {
                    tracing::error!(error = %err, "reconciliation failed");
                    eprintln!("{} {}", "✗".red(), err);
                }
            }
        }
    }
    Ok(())
}

fn describe(outcome: &Reconciliation) -> String {
    match outcome {
        Reconciliation::Unchanged => "unchanged".to_string(),
        Reconciliation::Untracked => "not open".to_string(),
        Reconciliation::Reloaded => "reloaded".to_string(),
        Reconciliation::Degraded(message) => format!("reloaded read-only: {}", message),
        Reconciliation::Conflict { unsaved } => format!("conflict with {} unsaved edits", unsaved),
        Reconciliation::KeptLocal => "kept local edits".to_string(),
    }
}
