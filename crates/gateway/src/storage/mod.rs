//! # Blob Store 署名インターフェース
//!
//! 「{bucket, key, method} に対する期限付き署名付きURLを発行する」能力だけを
//! 抽象化する。オブジェクトの中身には一切触れない。
//! S3互換ストレージ実装は `s3` サブモジュールを参照。

pub mod s3;

pub use s3::S3ObjectSigner;

use std::collections::BTreeMap;

use axum::http::Method;

use crate::error::SigningError;

/// 署名付きURLが与える権限の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// GET / HEAD
    Read,
    /// PUT / POST
    Write,
}

impl Capability {
    /// HTTPメソッドに対応する権限を返す。それ以外のメソッドは設定ミスとして扱う。
    pub fn for_method(method: &Method) -> Result<Self, SigningError> {
        match *method {
            Method::GET | Method::HEAD => Ok(Capability::Read),
            Method::PUT | Method::POST => Ok(Capability::Write),
            _ => Err(SigningError::UnsupportedMethod(method.to_string())),
        }
    }
}

/// 1回の署名要求。リクエストごとに組み立て、署名後は捨てる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlRequest {
    /// バケット名
    pub bucket: String,
    /// オブジェクトキー
    pub key: String,
    /// 署名対象のHTTPメソッド
    pub method: Method,
    /// メソッドから導いた権限。署名器はメソッドと一致しない要求を拒否する
    pub capability: Capability,
    /// 有効期限（秒）
    pub expires_in_secs: u32,
    /// 署名対象に含める追加のストアパラメータ
    pub extra_params: BTreeMap<String, String>,
}

/// 署名付きURLを発行するBlob Storeの抽象インターフェース。
///
/// 実装は呼び出しごとに新しく署名すること。過去に発行したURLを使い回してはならない。
#[async_trait::async_trait]
pub trait ObjectSigner: Send + Sync {
    /// `request` に対する署名付きURLを生成する。
    async fn presign(&self, request: &SignedUrlRequest) -> Result<String, SigningError>;
}
