use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::{error, info};

use gau::{init_logging, load_config, GauServer};

/// Webhook-triggered git mirroring relay
#[derive(Parser, Debug)]
#[command(name = "gau", version, about, disable_version_flag = true)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_json) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> gau::Result<()> {
    info!("Starting gau v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli.config)?;
    info!("Loaded configuration from {}", cli.config.display());

    let server = GauServer::from_config(config).await?;
    server.serve().await?;

    info!("gau stopped");
    Ok(())
}
