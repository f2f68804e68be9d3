//! # FOTA Gateway エントリポイント
//!
//! ## 起動シーケンス
//! 1. 設定読み込み（環境変数）
//! 2. Allowlistの初回読み込みを完了まで待つ。失敗しても空のまま起動する（全拒否）
//! 3. 定期更新ループを起動
//! 4. HTTPサーバーを起動。停止要求で排出してから終了する

use std::sync::Arc;
use std::time::Duration;

use fota_gateway::allowlist::refresh::{refresh_logged, spawn_refresh_loop, stop_refresh_loop};
use fota_gateway::allowlist::{
    AllowlistSource, AllowlistStore, HttpAllowlistSource, ALLOWLIST_URL_EXPIRY_SECS,
};
use fota_gateway::config::{GatewayConfig, GatewayState};
use fota_gateway::issuer::SignedUrlIssuer;
use fota_gateway::server::{serve_with_drain, shutdown_signal};
use fota_gateway::storage::S3ObjectSigner;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::debug!(
        url_expiry_secs = config.url_expiry_secs,
        refresh_period_secs = config.refresh_period.as_secs(),
        "設定を読み込みました"
    );

    let issuer = SignedUrlIssuer::new(Arc::new(S3ObjectSigner::from_env()?));
    // 取得は署名付きURLの有効期限内に打ち切る
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(u64::from(ALLOWLIST_URL_EXPIRY_SECS)))
        .build()?;
    let source: Arc<dyn AllowlistSource> = Arc::new(HttpAllowlistSource::new(
        client,
        issuer.clone(),
        config.bucket.clone(),
        config.allowlist_object.clone(),
    ));
    let allowlist = Arc::new(AllowlistStore::new());

    // 初回は必ず1回試してから受付を始める
    if refresh_logged(&allowlist, source.as_ref()).await.is_err() {
        tracing::warn!("Allowlistが空のまま起動します。全リクエストを拒否します");
    }

    let cancel = CancellationToken::new();
    let refresh_task = spawn_refresh_loop(
        allowlist.clone(),
        source,
        config.refresh_period,
        cancel.clone(),
    );

    let state = Arc::new(GatewayState::new(&config, allowlist, issuer));
    let app = fota_gateway::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Gatewayを {} で起動します", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    serve_with_drain(listener, app, shutdown_signal(), config.shutdown_grace).await?;

    stop_refresh_loop(refresh_task, &cancel, config.shutdown_grace).await;
    Ok(())
}
