//! show subcommand
//!
//! Prints the cached endpoint without any network activity.

use crate::cache::{FileStorage, LocalCache};
use anyhow::Context;
use clap::Args;
use endpoint_resolver_common::config::ResolverConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments for the show subcommand
#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Cache file path
    #[arg(long)]
    pub storage_path: Option<PathBuf>,
}

/// Execute the show command
pub async fn execute(config_path: Option<&Path>, args: &ShowArgs) -> Result<(), anyhow::Error> {
    let mut config = ResolverConfig::load(config_path).context("failed to load configuration")?;
    if let Some(path) = &args.storage_path {
        config.storage_path = path.clone();
    }

    let storage = FileStorage::new(config.storage_path.clone());
    let cache = LocalCache::new(Arc::new(storage), config.storage_key.clone());
    match cache.read().await? {
        Some(url) => println!("{}", url),
        None => println!(
            "No cached endpoint in {} ({})",
            config.storage_path.display(),
            config.storage_key
        ),
    }
    Ok(())
}
