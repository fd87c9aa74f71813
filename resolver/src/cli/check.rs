//! check subcommand
//!
//! Resolves the endpoint and reports whether it answers its ping path.

use super::{build_resolver, load_config, RemoteArgs};
use clap::Args;
use endpoint_resolver_common::ResolverError;
use std::path::Path;

/// Arguments for the check subcommand
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Remote store overrides
    #[command(flatten)]
    pub remote: RemoteArgs,
}

/// Execute the check command
///
/// 到達不能の場合は`ProbeFailed`を返す（致命的でないため終了コード2）。
pub async fn execute(config_path: Option<&Path>, args: &CheckArgs) -> Result<(), anyhow::Error> {
    let config = load_config(config_path, &args.remote)?;
    let resolver = build_resolver(config, false)?;

    let url = resolver.resolve().await?;
    let reachable = resolver.check_network().await;
    println!("URL\tREACHABLE");
    println!("{}\t{}", url, if reachable { "yes" } else { "no" });

    if !reachable {
        return Err(ResolverError::ProbeFailed(format!("endpoint {} is not reachable", url)).into());
    }
    Ok(())
}
