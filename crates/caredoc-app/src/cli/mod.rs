use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "caredoc",
    version,
    author,
    about = "OCR batch pipeline and master-record matching for care documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// OCR a document, match it against master registries and emit the
    /// outcome as JSON.
    Process(ProcessArgs),
    /// Split a document into per-page files without calling the backend.
    Split(SplitArgs),
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Input document (PDF or image).
    pub file: PathBuf,
    /// Override the configured OCR model.
    #[arg(long)]
    pub model: Option<String>,
    /// JSON file with customer master records.
    #[arg(long, value_name = "FILE")]
    pub customers: Option<PathBuf>,
    /// JSON file with office master records.
    #[arg(long, value_name = "FILE")]
    pub offices: Option<PathBuf>,
    /// JSON file with document-type master records.
    #[arg(long, value_name = "FILE")]
    pub document_types: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    /// Input document (PDF or image).
    pub file: PathBuf,
    /// Directory for the per-page files (defaults to the input's parent).
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}
