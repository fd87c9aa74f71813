//! watch subcommand
//!
//! Resolves the endpoint, then prints every change pushed by the remote
//! config store until Ctrl-C.

use super::{build_resolver, load_config, RemoteArgs};
use crate::shutdown::ShutdownController;
use clap::Args;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Arguments for the watch subcommand
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Remote store overrides
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Print changes as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Execute the watch command
pub async fn execute(config_path: Option<&Path>, args: &WatchArgs) -> Result<(), anyhow::Error> {
    let config = load_config(config_path, &args.remote)?;
    let resolver = build_resolver(config, true)?;
    let mut changes = resolver.subscribe_events();

    let url = resolver.resolve().await?;
    println!("{}", url);

    let shutdown = ShutdownController::default();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal.request_shutdown();
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            change = changes.recv() => match change {
                // 初回解決分は出力済み
                Ok(change) if change.previous.is_none() => continue,
                Ok(change) => {
                    if args.json {
                        println!("{}", serde_json::to_string(&change)?);
                    } else {
                        println!("{}", change.current.url);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped endpoint change events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    resolver.shutdown();
    Ok(())
}
