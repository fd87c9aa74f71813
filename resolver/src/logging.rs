//! ログ初期化
//!
//! 標準エラー出力に加え、`RESOLVER_LOG_DIR`が設定されていれば日次ローテーションの
//! ファイルにも出力する。フィルタは`RUST_LOG`、なければ`RESOLVER_LOG_LEVEL`。

use crate::config;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログファイル名のプレフィックス
pub const LOG_FILE_PREFIX: &str = "endpoint-resolver.log";

/// ログファイルの出力先ディレクトリ
pub fn log_file_path() -> Option<PathBuf> {
    config::log_dir()
}

/// ログを初期化する
///
/// ファイル出力時は`WorkerGuard`を返す。dropするとバッファがフラッシュされるため、
/// プロセス終了まで保持すること。
pub fn init() -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config::log_level()))
        .map_err(|e| anyhow::anyhow!("invalid log filter: {}", e))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    match log_file_path() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()?;
            Ok(None)
        }
    }
}
