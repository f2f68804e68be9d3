//! # FOTA Gateway 共有型定義
//!
//! Blob Storeに置かれたAllowlistドキュメントと、
//! クライアントが提示するデバイス識別子まわりのデータ構造を提供する。
//!
//! ## ドキュメント形式
//! ```json
//! { "whitelist": [ { "imei": "<identifier>", ...無視されるフィールド... } ] }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// デバイス識別子を運ぶクエリパラメータ名。
pub const DEVICE_ID_PARAM: &str = "imei";

// ---------------------------------------------------------------------------
// Allowlistドキュメント
// ---------------------------------------------------------------------------

/// Blob Storeから取得するAllowlistドキュメント。
///
/// `whitelist` キーが欠けている、またはエントリに文字列の `imei` が無い場合は
/// デシリアライズに失敗する。未知のフィールドは無視する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistDocument {
    /// 許可されたデバイスの一覧
    pub whitelist: Vec<AllowlistEntry>,
}

/// Allowlistの1エントリ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    /// デバイス識別子。大文字小文字を区別し、正規化しない。
    pub imei: String,
}

impl AllowlistDocument {
    /// JSONバイト列からパースする。
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// 重複を除いた識別子集合を返す。
    pub fn device_ids(&self) -> HashSet<String> {
        self.whitelist.iter().map(|e| e.imei.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
