//! # GET|HEAD /{key}?imei=...
//!
//! デバイス識別子をAllowlistで認可し、成功したら
//! Blob Store上のオブジェクトへの署名付きURLに302でリダイレクトする。
//! オブジェクト本体は中継しない。存在確認もしない。
//!
//! ## 判定順（最初に該当したものが結果になる）
//! 1. 識別子が無い → 403
//! 2. 識別子がAllowlistに無い → 401
//! 3. オブジェクトキーがAllowlistドキュメント自体 → 403
//! 4. 署名付きURLへ302。署名に失敗したら500

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use fota_types::DEVICE_ID_PARAM;
use percent_encoding::percent_decode_str;

use crate::allowlist::AllowlistSnapshot;
use crate::config::GatewayState;
use crate::error::{AuthorizationError, GatewayError, SigningError};

/// 署名付きURLへの302リダイレクト。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRedirect {
    location: String,
}

impl SignedRedirect {
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl IntoResponse for SignedRedirect {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, self.location)]).into_response()
    }
}

/// リクエストパスからオブジェクトキーを導く。
///
/// 先頭の `/` を1つだけ取り除き、`%XX` をデコードする。
/// 大文字小文字、`.`/`..`、連続する `/` はそのまま残す。
/// デコード後にUTF-8として不正なバイトは置換文字になる。
pub fn object_key_from_path(path: &str) -> String {
    let stripped = path.strip_prefix('/').unwrap_or(path);
    percent_decode_str(stripped).decode_utf8_lossy().into_owned()
}

/// クエリから最初のデバイス識別子を取り出す。
fn device_id(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(k, _)| k == DEVICE_ID_PARAM)
        .map(|(_, v)| v.as_str())
}

/// 認可判定。成功時はリダイレクト対象のオブジェクトキーを返す。
pub fn authorize(
    snapshot: &AllowlistSnapshot,
    allowlist_object: &str,
    device_id: Option<&str>,
    path: &str,
) -> Result<String, AuthorizationError> {
    let device_id = device_id.ok_or(AuthorizationError::MissingDeviceId)?;
    if !snapshot.contains(device_id) {
        return Err(AuthorizationError::UnknownDevice(device_id.to_string()));
    }

    // Allowlistドキュメント自体は決して配布しない
    let object_key = object_key_from_path(path);
    if object_key == allowlist_object {
        return Err(AuthorizationError::ForbiddenObject(object_key));
    }
    Ok(object_key)
}

async fn redirect(
    state: &GatewayState,
    method: &Method,
    path: &str,
    device_id: Option<&str>,
) -> Result<SignedRedirect, GatewayError> {
    let snapshot = state.allowlist.current();
    let object_key = authorize(&snapshot, &state.allowlist_object, device_id, path)?;

    // ルーティングはGET/HEADのみ。それ以外が届いたら設定ミス
    if *method != Method::GET && *method != Method::HEAD {
        return Err(SigningError::UnsupportedMethod(method.to_string()).into());
    }

    let location = state
        .issuer
        .issue(
            &state.bucket,
            &object_key,
            method,
            state.url_expiry_secs,
            &Default::default(),
        )
        .await?;
    Ok(SignedRedirect { location })
}

/// GET|HEAD /{key}: 認可してから署名付きURLにリダイレクトする。
///
/// 判定結果は監査用に必ずログに残す。
pub async fn handle_object(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<SignedRedirect, GatewayError> {
    let path_qs = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    tracing::info!(method = %method, path = path_qs, "リクエスト受信");

    let result = redirect(&state, &method, uri.path(), device_id(&params)).await;
    match &result {
        Ok(ok) => tracing::info!(
            method = %method,
            path = path_qs,
            status = StatusCode::FOUND.as_u16(),
            location = ok.location(),
            "リダイレクト"
        ),
        Err(GatewayError::Authorization(e)) => tracing::info!(
            method = %method,
            path = path_qs,
            status = e.status().as_u16(),
            reason = %e,
            "拒否"
        ),
        Err(e) => tracing::error!(
            method = %method,
            path = path_qs,
            status = e.status().as_u16(),
            error = %e,
            "署名付きURLの生成に失敗"
        ),
    }
    result
}
