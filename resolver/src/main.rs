//! endpoint-resolver entry point

use clap::Parser;
use endpoint_resolver::cli::{Cli, Commands};
use endpoint_resolver::{config, logging, ResolverError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _log_guard = match logging::init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    let config_path = cli.config.clone().or_else(config::config_path);
    let config_path = config_path.as_deref();

    let result = match &cli.command {
        Commands::Resolve(args) => endpoint_resolver::cli::resolve::execute(config_path, args).await,
        Commands::Watch(args) => endpoint_resolver::cli::watch::execute(config_path, args).await,
        Commands::Check(args) => endpoint_resolver::cli::check::execute(config_path, args).await,
        Commands::Show(args) => endpoint_resolver::cli::show::execute(config_path, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 致命的でないリゾルバーエラー（到達不能など）は2、それ以外は1
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.chain().find_map(|e| e.downcast_ref::<ResolverError>()) {
        Some(e) if !e.is_fatal() => 2,
        _ => 1,
    }
}
