use anyhow::Result;
use clap::Parser;
use controlsync_cli::cli::{dispatch, init_logging, load_config, CliArgs, CliContext};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug)?;
    info!("Starting controlsync v{}", env!("CARGO_PKG_VERSION"));

    let loaded = load_config(cli.config.as_ref()).await?;
    let ctx = CliContext::new(loaded.config, loaded.path, cli.output);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
