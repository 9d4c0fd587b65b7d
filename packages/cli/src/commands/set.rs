use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use quire_common::RealFileSystem;
use quire_editor::{EditCommand, EditSession};
use quire_parser::TextPatch;
use quire_workspace::{EditorHost, EngineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{absolute, node_at};

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Document to edit
    pub file: PathBuf,

    /// Element path below the root, e.g. `dependencies/dependency`
    pub node: String,

    /// Attribute name
    pub attribute: String,

    /// New value
    pub value: String,

    /// Print the patch without saving
    #[arg(long)]
    pub dry_run: bool,
}

pub fn set(args: SetArgs, cwd: &Path) -> Result<()> {
    let config = EngineConfig::load(cwd)?;
    let host = EditorHost::new(Arc::new(RealFileSystem), config);
    let session = host.open(absolute(cwd, &args.file))?;
    if session.is_read_only() {
        return Err(anyhow!("{} does not parse; fix it with `quire check` first", args.file.display()));
    }

    let node = session
        .with_model(|model| node_at(model, &args.node))?
        .ok_or_else(|| anyhow!("Document is not loaded"))??;
    let before = session.text()?;
    session.execute(EditCommand::set_attribute(node, args.attribute.as_str(), args.value.as_str()))?;

    for patch in patches(&session)? {
        print!("{}", describe(&before, &patch));
    }

    if args.dry_run {
        println!("{}", "(dry run, nothing written)".dimmed());
    } else {
        host.save(&session)?;
        println!("{} {}", "✓".green(), args.file.display());
    }
    Ok(())
}

fn patches(session: &EditSession) -> Result<Vec<TextPatch>> {
    let patches = session.read(|document| {
        document
            .last_transaction()
            .map(|transaction| transaction.steps.iter().map(|step| step.patch.clone()).collect::<Vec<_>>())
            .unwrap_or_default()
    })?;
    Ok(patches)
}

/// `line:col -removed +inserted` per edit, positions in `base`
fn describe(base: &str, patch: &TextPatch) -> String {
    let mut out = String::new();
    for edit in &patch.edits {
        let offset = edit.offset.min(base.len());
        let before = &base[..offset];
        let line = before.matches('\n').count() + 1;
        let col = offset - before.rfind('\n').map(|nl| nl + 1).unwrap_or(0) + 1;

        out.push_str(&format!("@{}:{}", line, col));
        if !edit.removed.is_empty() {
            out.push_str(&format!(" {}", format!("-{:?}", edit.removed).red()));
        }
        if !edit.inserted.is_empty() {
            out.push_str(&format!(" {}", format!("+{:?}", edit.inserted).green()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_describe_patch() {
        colored::control::set_override(false);
        let base = "<a>\n  <b x=\"1\"/>\n</a>";
        let patch = TextPatch::build(base, vec![quire_parser::TextEdit::replace(base, 12..13, "2")]).unwrap();
        assert_eq!(describe(base, &patch), "@2:9 -\"1\" +\"2\"\n");
    }

    #[test]
    fn test_set_writes_minimal_change() {
        let dir = tempfile::tempdir().unwrap();
        let source = "<project>\n  <!-- keep -->\n  <dependency scope='compile'/>\n</project>\n";
        fs::write(dir.path().join("pom.xml"), source).unwrap();

        let args = SetArgs {
            file: PathBuf::from("pom.xml"),
            node: "dependency".into(),
            attribute: "scope".into(),
            value: "test".into(),
            dry_run: false,
        };
        set(args, dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("pom.xml")).unwrap(),
            source.replace("'compile'", "'test'")
        );
    }

    #[test]
    fn test_dry_run_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();

        let args = SetArgs {
            file: PathBuf::from("pom.xml"),
            node: String::new(),
            attribute: "name".into(),
            value: "demo".into(),
            dry_run: true,
        };
        set(args, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("pom.xml")).unwrap(), "<project/>");
    }
}
