//! 環境変数ヘルパー
//!
//! 非推奨の変数名へのフォールバック付きで環境変数を読み込む。
//! `ResolverConfig`本体の読み込みは`endpoint_resolver_common::config`を参照。

use std::path::PathBuf;

/// ログレベル（非推奨: `LOG_LEVEL`）
pub const LOG_LEVEL_ENV: &str = "RESOLVER_LOG_LEVEL";
/// ログレベルの旧変数名
pub const LEGACY_LOG_LEVEL_ENV: &str = "LOG_LEVEL";
/// ログファイルの出力先ディレクトリ
pub const LOG_DIR_ENV: &str = "RESOLVER_LOG_DIR";
/// 設定ファイルのパス（非推奨: `API_URL_CONFIG`）
pub const CONFIG_PATH_ENV: &str = "RESOLVER_CONFIG";
/// 設定ファイルパスの旧変数名
pub const LEGACY_CONFIG_PATH_ENV: &str = "API_URL_CONFIG";
/// 単発取得の試行回数（非推奨: `API_URL_RETRIES`）
pub const FETCH_ATTEMPTS_ENV: &str = "RESOLVER_FETCH_ATTEMPTS";
/// 試行回数の旧変数名
pub const LEGACY_FETCH_ATTEMPTS_ENV: &str = "API_URL_RETRIES";

/// Get an environment variable with fallback to a deprecated name
///
/// If only the deprecated name is set, its value is returned and a
/// deprecation warning is logged.
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// ログレベル（デフォルト: info）
pub fn log_level() -> String {
    get_env_with_fallback_or(LOG_LEVEL_ENV, LEGACY_LOG_LEVEL_ENV, "info")
}

/// ログファイルの出力先（未設定ならNone）
pub fn log_dir() -> Option<PathBuf> {
    std::env::var(LOG_DIR_ENV)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

/// 単発取得の試行回数（未設定または数値でなければ`default`）
pub fn fetch_attempts(default: u32) -> u32 {
    get_env_with_fallback_parse(FETCH_ATTEMPTS_ENV, LEGACY_FETCH_ATTEMPTS_ENV, default)
}

/// 設定ファイルのパス（未設定ならNone）
pub fn config_path() -> Option<PathBuf> {
    get_env_with_fallback(CONFIG_PATH_ENV, LEGACY_CONFIG_PATH_ENV)
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}
