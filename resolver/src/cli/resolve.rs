//! resolve subcommand
//!
//! Resolves the endpoint once and prints it.

use super::{build_resolver, load_config, RemoteArgs};
use clap::Args;
use std::path::Path;

/// Arguments for the resolve subcommand
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Remote store overrides
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Join this path onto the resolved base URL
    #[arg(short, long)]
    pub path: Option<String>,
}

/// Execute the resolve command
pub async fn execute(config_path: Option<&Path>, args: &ResolveArgs) -> Result<(), anyhow::Error> {
    let config = load_config(config_path, &args.remote)?;
    let resolver = build_resolver(config, false)?;

    let url = resolver.resolve().await?;
    match &args.path {
        Some(path) => println!("{}", resolver.endpoint(path)?),
        None => println!("{}", url),
    }
    Ok(())
}
