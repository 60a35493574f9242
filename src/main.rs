pub mod classify;
pub mod config;
pub mod data;
pub mod interact;
pub mod project;
pub mod render;
pub mod server;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth map and bar chart SVGs for every attribute
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the rendered views with selection and hover endpoints
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!("Generating views with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // Load, join, then pre-render one map/chart pair per attribute.
            let inputs = data::load_inputs(&app_config)?;
            render::pregenerate_all(&inputs, &app_config)?;

            info!("Generation complete!");
        }
        Commands::Serve { config } => {
            info!("Serving views with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let inputs = data::load_inputs(&app_config)?;
            server::start_server(app_config, inputs).await?;
        }
    }

    Ok(())
}
