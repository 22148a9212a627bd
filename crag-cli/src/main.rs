mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        crag_telemetry::init_json();
    } else {
        crag_telemetry::init_telemetry("crag");
    }

    let config = commands::load_config(cli.config.as_ref(), cli.data_dir)?;
    let pipeline = commands::build_pipeline(config, &cli.services, cli.command.retrieves())?;

    match cli.command {
        Command::Index { collection, paths } => commands::index(&pipeline, &collection, &paths).await,
        Command::Retrieve { collection, query, json } => {
            commands::retrieve(&pipeline, &collection, &query, json).await
        }
        Command::Chat { collection, temperature } => {
            commands::chat(pipeline, &cli.services, &collection, temperature).await
        }
    }
}
