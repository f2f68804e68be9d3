//! # FOTA Gateway
//!
//! デバイスAllowlistで認可し、Blob Store上のオブジェクトへの
//! 期限付き署名付きURLにリダイレクトするゲートウェイ。
//! オブジェクト本体は中継しない。
//!
//! ## 構成
//! - [`allowlist`]: 不変スナップショットとして保持するAllowlistと定期更新ループ
//! - [`issuer`]: 署名付きURLの発行
//! - [`storage`]: Blob Storeの署名能力（S3互換実装）
//! - [`endpoints`]: 認可とリダイレクトを行うハンドラ
//! - [`server`]: 排出付きのHTTPサーバー停止
//!
//! ## API エンドポイント
//! - `GET|HEAD /{key}?imei=<id>`: 302で署名付きURLへ、または 401 / 403

pub mod allowlist;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod issuer;
pub mod server;
pub mod storage;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use axum::routing::get;

use crate::config::GatewayState;
use crate::endpoints::handle_object;

/// Gatewayのルーターを構築する。
///
/// GET/HEAD 以外のメソッドは405になる。
pub fn build_router(state: Arc<GatewayState>) -> axum::Router {
    let object = get(handle_object).head(handle_object);
    axum::Router::new()
        .route("/", object.clone())
        .route("/{*key}", object)
        .with_state(state)
}
