//! URL検証と正規化
//!
//! リゾルバーが受け入れるURLは`http`/`https`の絶対URLのみ。
//! ベースURLは末尾スラッシュを1つだけ持つ形に正規化してからパスを連結する。

use crate::error::{ResolverError, ResolverResult};
use ::url::Url;

/// 許可するスキーム
const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// 候補文字列が有効なエンドポイントURLか判定する
///
/// 前後に空白を含む文字列はパーサーが暗黙に除去してしまうため、ここで拒否する。
pub fn is_valid_url(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.trim() != candidate {
        return false;
    }

    match Url::parse(candidate) {
        Ok(parsed) => ALLOWED_SCHEMES.contains(&parsed.scheme()) && parsed.has_host(),
        Err(_) => false,
    }
}

/// 検証済みURLを返す（無効なら`InvalidUrl`）
pub fn validate_url(candidate: &str) -> ResolverResult<&str> {
    if is_valid_url(candidate) {
        Ok(candidate)
    } else {
        Err(ResolverError::InvalidUrl(candidate.to_string()))
    }
}

/// ベースURLを末尾スラッシュ1つに正規化する
pub fn normalize_base_url(url: &str) -> ResolverResult<String> {
    let url = validate_url(url)?;
    Ok(format!("{}/", url.trim_end_matches('/')))
}

/// 正規化したベースURLにパスを連結する
///
/// `join_endpoint("https://api.example.com", "/ping/")` → `https://api.example.com/ping/`
pub fn join_endpoint(base: &str, path: &str) -> ResolverResult<String> {
    let base = normalize_base_url(base)?;
    Ok(format!("{}{}", base, path.trim_start_matches('/')))
}
