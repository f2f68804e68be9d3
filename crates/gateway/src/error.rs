//! # Gateway エラー型
//!
//! 失敗は3系統に分かれる。
//! - [`AuthorizationError`]: リクエスト単位で回復可能。4xxとしてクライアントに返す。
//! - [`SigningError`]: 署名付きURLの生成失敗。そのリクエストだけ5xxにする。
//! - [`RefreshError`]: Allowlist更新の失敗。ログに残すだけでクライアントには見えない。

use axum::http::StatusCode;

/// 認可判定による拒否。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// デバイス識別子がクエリに無い
    #[error("デバイス識別子がありません")]
    MissingDeviceId,
    /// Allowlistに無い識別子
    #[error("未登録のデバイスです: {0}")]
    UnknownDevice(String),
    /// Allowlistドキュメント自体へのアクセス
    #[error("このオブジェクトへのアクセスは禁止されています: {0}")]
    ForbiddenObject(String),
}

impl AuthorizationError {
    /// クライアントに返すステータス。
    pub fn status(&self) -> StatusCode {
        match self {
            AuthorizationError::MissingDeviceId | AuthorizationError::ForbiddenObject(_) => {
                StatusCode::FORBIDDEN
            }
            AuthorizationError::UnknownDevice(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

/// 署名付きURL生成の失敗。
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// GET/HEAD/PUT/POST 以外のメソッド
    #[error("未対応のHTTPメソッド: {0}")]
    UnsupportedMethod(String),
    /// 有効期限が範囲外
    #[error("署名付きURLの有効期限が範囲外です: {0}秒")]
    InvalidExpiry(u32),
    /// Blob Store側の失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
}

/// Allowlist更新の失敗。直前のスナップショットは保持される。
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Allowlist取得用URLの生成に失敗
    #[error("Allowlist取得用URLの生成に失敗: {0}")]
    Signing(#[from] SigningError),
    /// HTTP送信・受信に失敗
    #[error("Allowlistの取得に失敗: {0}")]
    Fetch(String),
    /// 2xx以外のレスポンス
    #[error("Allowlistの取得でHTTPエラー: ステータス {0}")]
    Status(u16),
    /// JSONとして不正、または形式が違う
    #[error("Allowlistのパースに失敗: {0}")]
    Parse(String),
}

/// リクエスト処理のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 認可判定による拒否
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    /// 署名付きURLの生成に失敗
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl GatewayError {
    /// クライアントに返すステータス。
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Authorization(e) => e.status(),
            GatewayError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        // 理由の詳細はログにだけ残し、クライアントには定型文を返す
        let status = self.status();
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}
