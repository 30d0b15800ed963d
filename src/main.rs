//! page-composer server binary.

use std::path::PathBuf;

use clap::Parser;

use page_composer::lifecycle::startup;

#[derive(Parser)]
#[command(name = "page-composer")]
#[command(about = "Routes requests to pages composed from remote datasources", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    startup::run(&cli.config, |builder| builder).await?;
    Ok(())
}
