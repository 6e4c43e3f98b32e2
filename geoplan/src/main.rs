//! geoplan: draw a study-area map and answer a buffer query from one theme file.

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use geoplan::config::MapConfig;
use geoplan::theme::{run, RunOptions};

#[derive(Parser)]
#[command(name = "geoplan")]
#[command(about = "Render a study-area map and evaluate its buffer query", long_about = None)]
struct Args {
    /// Theme configuration (TOML)
    config: PathBuf,

    /// Write the map here instead of `output.path`
    #[arg(long)]
    output: Option<PathBuf>,

    /// Only evaluate the query; write no image
    #[arg(long)]
    no_render: bool,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let config = MapConfig::from_path(&args.config)
        .with_context(|| format!("Failed to load theme {}", args.config.display()))?;
    let options = RunOptions {
        output: args.output,
        render: !args.no_render,
    };
    let report = run(&config, &options)
        .with_context(|| format!("Theme `{}` failed", config.name))?;

    print!("{}", report);
    Ok(())
}
