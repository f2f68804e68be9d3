//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::allowlist::AllowlistStore;
use crate::issuer::SignedUrlIssuer;

/// 起動時に一度だけ読み込む設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// ファームウェアとAllowlistドキュメントを置くバケット
    pub bucket: String,
    /// Allowlistドキュメントのオブジェクトキー
    pub allowlist_object: String,
    /// 待ち受けポート
    pub port: u16,
    /// Allowlist更新間隔
    pub refresh_period: Duration,
    /// リダイレクト先URLの有効期限（秒）
    pub url_expiry_secs: u32,
    /// 停止時に処理中リクエストを待つ上限
    pub shutdown_grace: Duration,
}

impl GatewayConfig {
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_REFRESH_SECS: u64 = 300;
    pub const DEFAULT_URL_EXPIRY_SECS: u32 = 86400;
    pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 1;

    /// 環境変数から読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から読み込む。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bucket = lookup("AWS_BUCKET")
            .filter(|v| !v.is_empty())
            .context("AWS_BUCKETが未設定です")?;
        let allowlist_object = lookup("WHITELIST_NAME")
            .filter(|v| !v.is_empty())
            .context("WHITELIST_NAMEが未設定です")?;

        let port = parse_or(&lookup, "PORT", Self::DEFAULT_PORT)?;
        let refresh_secs: u64 = parse_or(&lookup, "WHITELIST_REFRESH", Self::DEFAULT_REFRESH_SECS)?;
        let url_expiry_secs = parse_or(&lookup, "URL_EXPIRY_TIME", Self::DEFAULT_URL_EXPIRY_SECS)?;
        let grace_secs: u64 = parse_or(
            &lookup,
            "SHUTDOWN_GRACE_SECS",
            Self::DEFAULT_SHUTDOWN_GRACE_SECS,
        )?;

        if refresh_secs == 0 {
            anyhow::bail!("WHITELIST_REFRESHは1以上である必要があります");
        }
        if url_expiry_secs == 0 {
            anyhow::bail!("URL_EXPIRY_TIMEは1以上である必要があります");
        }

        Ok(Self {
            bucket,
            allowlist_object,
            port,
            refresh_period: Duration::from_secs(refresh_secs),
            url_expiry_secs,
            shutdown_grace: Duration::from_secs(grace_secs),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name}の値が不正です: {raw}")),
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// バケット名
    pub bucket: String,
    /// Allowlistドキュメントのオブジェクトキー（リダイレクト対象から除外する）
    pub allowlist_object: String,
    /// リダイレクト先URLの有効期限（秒）
    pub url_expiry_secs: u32,
    /// 現在のAllowlist
    pub allowlist: Arc<AllowlistStore>,
    /// 署名付きURL発行器
    pub issuer: SignedUrlIssuer,
}

impl GatewayState {
    pub fn new(
        config: &GatewayConfig,
        allowlist: Arc<AllowlistStore>,
        issuer: SignedUrlIssuer,
    ) -> Self {
        Self {
            bucket: config.bucket.clone(),
            allowlist_object: config.allowlist_object.clone(),
            url_expiry_secs: config.url_expiry_secs,
            allowlist,
            issuer,
        }
    }
}
