pub mod check;
pub mod set;
pub mod tree;
pub mod watch;

pub use check::{check, CheckArgs};
pub use set::{set, SetArgs};
pub use tree::{tree, TreeArgs};
pub use watch::{watch, WatchArgs};

use anyhow::{anyhow, Result};
use quire_parser::ObjectModel;
use std::path::Path;

/// Resolve a `/`-separated element path below the root, e.g. `build/plugins`
pub(crate) fn node_at(model: &ObjectModel, path: &str) -> Result<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    model
        .find_path(&segments)
        .map(|node| node.id.clone())
        .ok_or_else(|| anyhow!("No element at '{}'", path))
}

/// Resolve `file` against the working directory
pub(crate) fn absolute(cwd: &Path, file: &Path) -> std::path::PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        cwd.join(file)
    }
}
