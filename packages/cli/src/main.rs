mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, set, tree, watch, CheckArgs, SetArgs, TreeArgs, WatchArgs};
use tracing_subscriber::EnvFilter;

/// Quire CLI - edit structured documents without losing their formatting
#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse documents and report syntax errors
    Check(CheckArgs),

    /// Print the object model of a document
    Tree(TreeArgs),

    /// Set one attribute and save the document
    Set(SetArgs),

    /// Follow external changes to a document
    Watch(WatchArgs),
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("QUIRE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| match cli.command {
            Command::Check(args) => check(args, &cwd),
            Command::Tree(args) => tree(args, &cwd),
            Command::Set(args) => set(args, &cwd),
            Command::Watch(args) => watch(args, &cwd),
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
