use clap::Parser;
use colored::*;
use tracing::warn;

use crate::cli::cli_args::{CliArgs, Commands};
use crate::cli::output_formatter::OutputFormatter;
use crate::engine::Engine;
use crate::utils::config::{EngineConfig, SourceConfig};

/// Entry point for the `weave` binary: parse arguments, build the engine
/// from the configuration file, run one command, print the outcome.
pub async fn run_cli() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = if args.config.exists() {
        EngineConfig::from_file(&args.config)?
    } else {
        warn!(
            path = %args.config.display(),
            "configuration file not found, starting with no sources"
        );
        EngineConfig::default()
    };
    let sources = config.sources.clone();
    let engine = Engine::new(config)?;

    match args.command {
        Commands::Query { sql, format, stats } => {
            let output = engine.execute(&sql).await?;
            println!("{}", OutputFormatter::format_result(&output, &format));
            if stats {
                let snapshot = engine.statistics();
                println!(
                    "{}",
                    format!(
                        "queries: {}, cache hits: {}, cache misses: {}, rows transferred: {}",
                        snapshot.queries_executed,
                        snapshot.cache_hits,
                        snapshot.cache_misses,
                        snapshot.total_data_transferred
                    )
                    .dimmed()
                );
            }
        }
        Commands::Explain { sql } => {
            let description = engine.explain(&sql)?;
            for (idx, step) in description.steps.iter().enumerate() {
                println!("{} {}", format!("{}.", idx + 1).bold().cyan(), step);
            }
        }
        Commands::Sources => {
            if sources.is_empty() {
                println!("{}", "No sources configured.".dimmed());
            }
            let mut names: Vec<&String> = sources.keys().collect();
            names.sort();
            for name in names {
                match &sources[name] {
                    SourceConfig::Csv { path } => {
                        println!("{} csv directory {}", name.bold().cyan(), path.display());
                        let connector =
                            crate::connectors::CsvConnector::new(name, path.clone());
                        for table in connector.list_tables() {
                            println!("  {}", table);
                        }
                    }
                    SourceConfig::Memory => {
                        println!("{} in-memory", name.bold().cyan());
                    }
                }
            }
        }
    }

    Ok(())
}
