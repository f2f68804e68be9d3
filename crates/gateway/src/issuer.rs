//! # 署名付きURL発行
//!
//! Blob Storeの署名能力を包み、(bucket, key, method, 有効期限) から
//! 期限付き・メソッド限定のURLを作る。状態は持たず、毎回新しく署名する。

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;

use crate::error::SigningError;
use crate::storage::{Capability, ObjectSigner, SignedUrlRequest};

/// 署名付きURLの発行器。
#[derive(Clone)]
pub struct SignedUrlIssuer {
    signer: Arc<dyn ObjectSigner>,
}

impl SignedUrlIssuer {
    pub fn new(signer: Arc<dyn ObjectSigner>) -> Self {
        Self { signer }
    }

    /// 署名付きURLを発行する。
    ///
    /// GET/HEAD は読み取り、PUT/POST は書き込み権限に対応する。
    /// それ以外のメソッドは [`SigningError::UnsupportedMethod`] で即座に失敗する。
    pub async fn issue(
        &self,
        bucket: &str,
        key: &str,
        method: &Method,
        expires_in_secs: u32,
        extra_params: &BTreeMap<String, String>,
    ) -> Result<String, SigningError> {
        let capability = Capability::for_method(method)?;
        let request = SignedUrlRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            method: method.clone(),
            capability,
            expires_in_secs,
            extra_params: extra_params.clone(),
        };

        tracing::debug!(
            bucket,
            key,
            method = %method,
            expires_in_secs,
            "署名付きURLを生成します"
        );
        self.signer.presign(&request).await
    }
}
