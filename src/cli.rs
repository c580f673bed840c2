use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(
    name = "tkb",
    about = "Per-account and per-model cost breakdown of LLM API usage"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Usage records: JSON array, {"usage": [...]} or JSON lines. Reads stdin when omitted or `-`
    #[arg(short, long, global = true)]
    pub input: Option<PathBuf>,

    /// Pricing table file (TOML, or JSON with a .json extension)
    #[arg(long, global = true)]
    pub pricing: Option<PathBuf>,

    /// Output format: table (default), json
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// List each account's per-model rows under the account
    #[arg(long, global = true)]
    pub breakdown: bool,

    /// Exit with an error if any record could not be priced
    #[arg(long, global = true)]
    pub strict: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Cost breakdown of the input usage (default)
    Report,
    /// Print the effective pricing table
    Pricing,
}

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    pub fn effective_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Report)
    }
}
