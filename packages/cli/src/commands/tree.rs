use anyhow::Result;
use clap::Args;
use colored::Colorize;
use quire_common::Visitor;
use quire_parser::{parse_with_path, Attribute, ModelNode, ObjectModel};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use super::absolute;

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Document to print
    pub file: PathBuf,

    /// Show node ids
    #[arg(long)]
    pub ids: bool,

    /// Print the model as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn tree(args: TreeArgs, cwd: &Path) -> Result<()> {
    let path = absolute(cwd, &args.file);
    let source = fs::read_to_string(&path)?;
    let model = parse_with_path(&source, &path.to_string_lossy())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&model.root)?);
    } else {
        print!("{}", render(&model, args.ids));
    }
    Ok(())
}

fn render(model: &ObjectModel, ids: bool) -> String {
    let mut printer = TreePrinter { ids, out: String::new() };
    printer.visit_model(model);
    printer.out
}

struct TreePrinter {
    ids: bool,
    out: String,
}

impl Visitor for TreePrinter {
    fn visit_node(&mut self, node: &ModelNode, depth: usize) {
        let _ = write!(self.out, "{}{}", "  ".repeat(depth), node.name.bold());
        for attr in &node.attributes {
            self.visit_attribute(node, attr, depth);
        }
        if let Some(text) = &node.text {
            let _ = write!(self.out, " {} {}", "=".dimmed(), text.green());
        }
        if self.ids {
            let _ = write!(self.out, " {}", format!("#{}", node.id).dimmed());
        }
        self.out.push('\n');

        for child in &node.children {
            self.visit_node(child, depth + 1);
        }
    }

    fn visit_attribute(&mut self, _node: &ModelNode, attr: &Attribute, _depth: usize) {
        let _ = write!(self.out, " {}={}", attr.name.cyan(), format!("{:?}", attr.value).dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_parser::parse;

    #[test]
    fn test_render_plain() {
        colored::control::set_override(false);
        let model = parse(r#"<project><dependency scope="test"><version>1.0</version></dependency></project>"#).unwrap();

        assert_eq!(
            render(&model, false),
            "project\n  dependency scope=\"test\"\n    version = 1.0\n"
        );
    }
}
