use clap::Subcommand;

use super::apply::ApplyArgs;
use super::decode::DecodeArgs;
use super::submit::SubmitArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Apply a response envelope to an HTML page
    Apply(ApplyArgs),

    /// Send a synchronized update to a live endpoint
    Submit(SubmitArgs),

    /// Decode a codec value against the function registry
    Decode(DecodeArgs),

    /// Show build and configuration information
    Info,
}
