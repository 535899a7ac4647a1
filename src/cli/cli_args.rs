use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Weave CLI - cross-database SQL federation engine
#[derive(Parser, Debug)]
#[command(name = "weave")]
#[command(about = "Cross-database SQL federation engine")]
#[command(version = "0.1.0")]
pub struct CliArgs {
    /// Engine configuration file (JSON)
    #[arg(short, long, default_value = "weave.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a SQL query across the configured sources
    Query {
        /// SQL query to execute
        #[arg(value_name = "SQL")]
        sql: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Print engine statistics after the result
        #[arg(long)]
        stats: bool,
    },

    /// Show the execution plan without running the query
    Explain {
        /// SQL query to describe
        #[arg(value_name = "SQL")]
        sql: String,
    },

    /// List configured sources
    Sources,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    /// Formatted table output
    Table,
    /// JSON output
    Json,
    /// CSV output
    Csv,
}
