//! CLI module for endpoint-resolver
//!
//! Resolves, watches and checks the backend endpoint from the command line.

pub mod check;
pub mod resolve;
pub mod show;
pub mod watch;

use crate::resolver::Resolver;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use endpoint_resolver_common::config::ResolverConfig;
use std::path::PathBuf;

/// Dynamic endpoint resolver - discovers and tracks the backend base URL
#[derive(Parser, Debug)]
#[command(name = "endpoint-resolver")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    RESOLVER_CONFIG                 Config file path (TOML/JSON)
    RESOLVER_REMOTE_URL             Remote config store base URL
    RESOLVER_REMOTE_AUTH_TOKEN      Remote config store auth token
    RESOLVER_REMOTE_KEY             Remote config key (default: api_url)
    RESOLVER_STORAGE_PATH           Cache file path (default: endpoint-cache.json)
    RESOLVER_STORAGE_KEY            Cache slot key (default: @api_url)
    RESOLVER_FETCH_ATTEMPTS         Remote fetch attempts (default: 2)
    RESOLVER_LIVE_UPDATE_TIMEOUT_MS Live update wait (default: 10000)
    RESOLVER_LOG_LEVEL              Log level (default: info)
    RESOLVER_LOG_DIR                Daily rotated log file directory
"#)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true, env = "RESOLVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the endpoint and print it
    Resolve(resolve::ResolveArgs),
    /// Resolve, then print every endpoint change until Ctrl-C
    Watch(watch::WatchArgs),
    /// Resolve, then probe the endpoint
    Check(check::CheckArgs),
    /// Print the cached endpoint without network access
    Show(show::ShowArgs),
}

/// Overrides shared by the networked subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Remote config store base URL
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Remote config key
    #[arg(long)]
    pub remote_key: Option<String>,

    /// Cache file path
    #[arg(long)]
    pub storage_path: Option<PathBuf>,
}

impl RemoteArgs {
    /// 引数で設定を上書きする
    pub fn apply(&self, config: &mut ResolverConfig) {
        if let Some(url) = &self.remote_url {
            config.remote_url = url.clone();
        }
        if let Some(key) = &self.remote_key {
            config.remote_key = key.clone();
        }
        if let Some(path) = &self.storage_path {
            config.storage_path = path.clone();
        }
    }
}

/// 設定を読み込む（ファイル + 環境変数 + 引数）
pub fn load_config(path: Option<&std::path::Path>, args: &RemoteArgs) -> anyhow::Result<ResolverConfig> {
    let mut config = ResolverConfig::load(path).context("failed to load configuration")?;
    config.fetch_attempts = crate::config::fetch_attempts(config.fetch_attempts);
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// 設定からリゾルバーを作成
pub(crate) fn build_resolver(config: ResolverConfig, live_listener: bool) -> anyhow::Result<Resolver> {
    Resolver::builder(config)
        .live_listener(live_listener)
        .build()
        .context("failed to create resolver")
}
