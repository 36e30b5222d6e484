pub mod types;
pub mod config;
pub mod error;
pub mod data;
pub mod topology;
pub mod scale;
pub mod legend;
pub mod processing;
pub mod path;
pub mod tooltip;
pub mod render;
pub mod export;
pub mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the data and write map.svg and index.html
    Render,
    /// Serve the map with hover lookups
    Serve,
    /// Write the joined counties as GeoJSON
    ExportGeojson {
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let app_config = config::AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match &cli.command {
        Commands::Render => {
            let model = data::load_model(&app_config)
                .await
                .context("Could not load map data")?;
            let commands = render::render(&model).context("Could not render map")?;

            let dir = &app_config.output.dir;
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
            let svg_path = dir.join("map.svg");
            let html_path = dir.join("index.html");
            fs::write(&svg_path, commands.to_svg())
                .with_context(|| format!("Failed to write {:?}", svg_path))?;
            fs::write(&html_path, commands.to_html())
                .with_context(|| format!("Failed to write {:?}", html_path))?;

            info!(
                counties = commands.counties.len(),
                matched = commands.stats.matched,
                missing = commands.stats.missing,
                "Wrote {:?} and {:?}",
                svg_path,
                html_path
            );
        }
        Commands::Serve => {
            server::start_server(app_config).await?;
        }
        Commands::ExportGeojson { out } => {
            let model = data::load_model(&app_config)
                .await
                .context("Could not load map data")?;
            let commands = render::render(&model).context("Could not join counties")?;
            let collection = export::joined_counties(&commands.counties);

            let out = out
                .clone()
                .unwrap_or_else(|| app_config.output.dir.join("counties.geojson"));
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            fs::write(&out, collection.to_string())
                .with_context(|| format!("Failed to write {:?}", out))?;
            info!(features = collection.features.len(), "Wrote {:?}", out);
        }
    }

    Ok(())
}
