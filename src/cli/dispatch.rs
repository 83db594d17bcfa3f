use super::apply::cmd_apply;
use super::decode::cmd_decode;
use super::env::CliArgs;
use super::info::cmd_info;
use super::submit::cmd_submit;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Apply(args) => cmd_apply(args, ctx).await,
        Commands::Submit(args) => cmd_submit(args, ctx).await,
        Commands::Decode(args) => cmd_decode(args, ctx).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
