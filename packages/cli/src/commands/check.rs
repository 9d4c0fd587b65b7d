use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use quire_parser::{parse_with_path, ParseError};
use std::fs;
use std::path::{Path, PathBuf};

use super::absolute;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Documents to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Also list documents without errors
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let mut failed = 0;

    for file in &args.files {
        let path = absolute(cwd, file);
        let source = fs::read_to_string(&path)?;

        match check_source(&source, &path) {
            Ok(elements) => {
                if args.verbose {
                    println!("{} {} ({} elements)", "✓".green(), file.display(), elements);
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!("{} {}", "✗".red(), format_parse_error(file, &source, &err));
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} of {} documents failed to parse", failed, args.files.len()));
    }
    println!("{} {} documents parsed", "✓".green(), args.files.len());
    Ok(())
}

/// Number of elements in a document that parses
fn check_source(source: &str, path: &Path) -> Result<usize, ParseError> {
    let model = parse_with_path(source, &path.to_string_lossy())?;
    tracing::debug!(path = %path.display(), elements = model.len(), "document parsed");
    Ok(model.len())
}

fn format_parse_error(file: &Path, source: &str, err: &ParseError) -> String {
    let (line, col) = err.line_col(source);
    format!("{}:{}:{}: {}", file.display(), line, col, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_location() {
        let source = "<a>\n  <b>\n</a>";
        let err = check_source(source, Path::new("a.xml")).unwrap_err();
        let message = format_parse_error(Path::new("a.xml"), source, &err);
        assert!(message.starts_with("a.xml:3:"), "{}", message);
    }

    #[test]
    fn test_counts_elements() {
        assert_eq!(check_source("<a><b/><c/></a>", Path::new("a.xml")).unwrap(), 3);
    }

    #[test]
    fn test_check_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.xml"), "<a/>").unwrap();
        fs::write(dir.path().join("bad.xml"), "<a>").unwrap();

        let good = CheckArgs {
            files: vec![PathBuf::from("good.xml")],
            verbose: true,
        };
        assert!(check(good, dir.path()).is_ok());

        let both = CheckArgs {
            files: vec![PathBuf::from("good.xml"), PathBuf::from("bad.xml")],
            verbose: false,
        };
        assert!(check(both, dir.path()).is_err());
    }
}
