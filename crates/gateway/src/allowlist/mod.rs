//! # Allowlist ストア
//!
//! 許可デバイス識別子の集合を不変スナップショットとして保持する。
//! 更新は新しいスナップショットを作って参照を差し替えるだけで、
//! 公開済みのスナップショットを書き換えることはない。
//! 読み手は取得・パース中にブロックされず、常に完成したスナップショットを見る。
//!
//! 定期更新ループは `refresh` サブモジュールを参照。

pub mod refresh;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use fota_types::AllowlistDocument;

use crate::error::RefreshError;
use crate::issuer::SignedUrlIssuer;

/// Allowlist取得用URLの有効期限（秒）。
pub const ALLOWLIST_URL_EXPIRY_SECS: u32 = 30;

// ---------------------------------------------------------------------------
// スナップショット
// ---------------------------------------------------------------------------

/// ある時点のAllowlist。公開後は変更されない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistSnapshot {
    ids: HashSet<String>,
    generation: u64,
    refreshed_at: Option<SystemTime>,
}

impl AllowlistSnapshot {
    /// 起動直後の空スナップショット（世代0）。
    pub fn empty() -> Self {
        Self {
            ids: HashSet::new(),
            generation: 0,
            refreshed_at: None,
        }
    }

    /// 完全一致で所属を判定する。
    pub fn contains(&self, device_id: &str) -> bool {
        self.ids.contains(device_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    /// 公開ごとに1ずつ増える世代番号。
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 最後に更新に成功した時刻。未ロードならNone。
    pub fn refreshed_at(&self) -> Option<SystemTime> {
        self.refreshed_at
    }
}

// ---------------------------------------------------------------------------
// 取得元
// ---------------------------------------------------------------------------

/// Allowlistドキュメントの取得元。
#[async_trait::async_trait]
pub trait AllowlistSource: Send + Sync {
    /// 最新の識別子集合を取得する。
    async fn fetch(&self) -> Result<HashSet<String>, RefreshError>;
}

/// Blob Store上のドキュメントを署名付きURL経由で取得する。
pub struct HttpAllowlistSource {
    http_client: reqwest::Client,
    issuer: SignedUrlIssuer,
    bucket: String,
    object_name: String,
}

impl HttpAllowlistSource {
    pub fn new(
        http_client: reqwest::Client,
        issuer: SignedUrlIssuer,
        bucket: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            issuer,
            bucket: bucket.into(),
            object_name: object_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl AllowlistSource for HttpAllowlistSource {
    async fn fetch(&self) -> Result<HashSet<String>, RefreshError> {
        let url = self
            .issuer
            .issue(
                &self.bucket,
                &self.object_name,
                &axum::http::Method::GET,
                ALLOWLIST_URL_EXPIRY_SECS,
                &Default::default(),
            )
            .await?;
        tracing::debug!(url = %url, "Allowlistを取得します");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| RefreshError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::Fetch(format!("レスポンス読み取り失敗: {e}")))?;

        let document =
            AllowlistDocument::from_slice(&body).map_err(|e| RefreshError::Parse(e.to_string()))?;
        Ok(document.device_ids())
    }
}

// ---------------------------------------------------------------------------
// ストア
// ---------------------------------------------------------------------------

/// 現在のAllowlistスナップショットの保持者。
///
/// 書き手は更新処理のみ。ロックは参照の差し替えと複製の間だけ保持する。
#[derive(Debug)]
pub struct AllowlistStore {
    current: RwLock<Arc<AllowlistSnapshot>>,
}

impl Default for AllowlistStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AllowlistStore {
    /// 空のスナップショットで始める（全リクエスト拒否）。
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(AllowlistSnapshot::empty())),
        }
    }

    /// 最新のスナップショットを返す。更新中でも待たない。
    pub fn current(&self) -> Arc<AllowlistSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 識別子集合を新しいスナップショットとして公開する。
    pub fn publish(&self, ids: HashSet<String>) -> Arc<AllowlistSnapshot> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(AllowlistSnapshot {
            ids,
            generation: current.generation + 1,
            refreshed_at: Some(SystemTime::now()),
        });
        *current = next.clone();
        next
    }

    /// 取得元から1回更新する。
    ///
    /// 失敗時は現在のスナップショットに触れずにエラーを返す。
    /// 取得・パースはロックの外で行う。
    pub async fn refresh(
        &self,
        source: &dyn AllowlistSource,
    ) -> Result<Arc<AllowlistSnapshot>, RefreshError> {
        let ids = source.fetch().await?;
        Ok(self.publish(ids))
    }
}
