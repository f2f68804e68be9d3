//! # S3互換ストレージ署名実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIに対して
//! Signature V4 のクエリ文字列署名でURLを発行する。
//!
//! HTTPメソッドそのものが署名対象に入るため、GET用に発行したURLを
//! HEADやPUTに流用することはできない。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::{Capability, ObjectSigner, SignedUrlRequest};
use crate::error::SigningError;

type HmacSha256 = Hmac<Sha256>;

/// S3が受け付ける `X-Amz-Expires` の上限（7日）。
pub const MAX_EXPIRY_SECS: u32 = 604_800;

/// 署名に使う認証情報。
#[derive(Clone)]
pub struct S3Credentials {
    /// アクセスキーID
    pub access_key: String,
    /// シークレットアクセスキー
    pub secret_key: String,
    /// 一時認証情報のセッショントークン
    pub session_token: Option<String>,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// S3互換ストレージ向けの署名付きURL発行器。
#[derive(Debug, Clone)]
pub struct S3ObjectSigner {
    /// "https" または "http"
    scheme: String,
    /// ホスト（ポート含む）
    authority: String,
    region: String,
    credentials: S3Credentials,
    /// trueならパス形式（`host/bucket/key`）、falseなら仮想ホスト形式（`bucket.host/key`）
    path_style: bool,
}

impl S3ObjectSigner {
    /// エンドポイントURL（`scheme://host[:port]`）から構築する。
    pub fn new(
        endpoint: &str,
        region: impl Into<String>,
        credentials: S3Credentials,
        path_style: bool,
    ) -> anyhow::Result<Self> {
        let (scheme, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| anyhow::anyhow!("S3エンドポイントにスキームがありません: {endpoint}"))?;
        if scheme != "http" && scheme != "https" {
            anyhow::bail!("S3エンドポイントのスキームが不正です: {endpoint}");
        }
        let authority = rest.trim_end_matches('/');
        if authority.is_empty() || authority.contains('/') {
            anyhow::bail!("S3エンドポイントはホスト部のみ指定できます: {endpoint}");
        }

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            region: region.into(),
            credentials,
            path_style,
        })
    }

    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から構築する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let endpoint = lookup("S3_ENDPOINT");
        let region = lookup("S3_REGION").unwrap_or_else(|| {
            endpoint
                .as_deref()
                .and_then(detect_region)
                .unwrap_or_else(|| "us-east-1".to_string())
        });
        let endpoint = endpoint.unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));

        let access_key = lookup("S3_ACCESS_KEY")
            .or_else(|| lookup("AWS_ACCESS_KEY_ID"))
            .ok_or_else(|| anyhow::anyhow!("S3_ACCESS_KEY（またはAWS_ACCESS_KEY_ID）が未設定です"))?;
        let secret_key = lookup("S3_SECRET_KEY")
            .or_else(|| lookup("AWS_SECRET_ACCESS_KEY"))
            .ok_or_else(|| {
                anyhow::anyhow!("S3_SECRET_KEY（またはAWS_SECRET_ACCESS_KEY）が未設定です")
            })?;
        let session_token = lookup("AWS_SESSION_TOKEN");

        let path_style = match lookup("S3_PATH_STYLE").as_deref() {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => anyhow::bail!("S3_PATH_STYLEの値が不正です: {other}"),
        };

        tracing::info!(
            s3_endpoint = %endpoint,
            s3_region = %region,
            path_style,
            "S3署名設定を読み込みました"
        );

        Self::new(
            &endpoint,
            region,
            S3Credentials {
                access_key,
                secret_key,
                session_token,
            },
            path_style,
        )
    }

    /// 指定時刻で署名する。
    pub fn presign_at(
        &self,
        request: &SignedUrlRequest,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        if request.expires_in_secs == 0 || request.expires_in_secs > MAX_EXPIRY_SECS {
            return Err(SigningError::InvalidExpiry(request.expires_in_secs));
        }
        if request.bucket.is_empty() {
            return Err(SigningError::Storage("バケット名が空です".to_string()));
        }
        // 空キーはバケット一覧（ListObjects）への署名になる
        if request.key.is_empty() {
            return Err(SigningError::Storage("オブジェクトキーが空です".to_string()));
        }
        if Capability::for_method(&request.method)? != request.capability {
            return Err(SigningError::Storage(format!(
                "{} に {:?} 権限は付与できません",
                request.method, request.capability
            )));
        }

        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.region);

        let encoded_key = encode_key(&request.key);
        let (host, canonical_uri) = if self.path_style {
            (
                self.authority.clone(),
                format!("/{}/{encoded_key}", uri_encode(&request.bucket)),
            )
        } else {
            (
                format!("{}.{}", request.bucket, self.authority),
                format!("/{encoded_key}"),
            )
        };

        // 追加パラメータを先に入れ、X-Amz-* で上書きされるようにする
        let mut query: BTreeMap<String, String> = request
            .extra_params
            .iter()
            .map(|(k, v)| (uri_encode(k), uri_encode(v)))
            .collect();
        query.insert(
            "X-Amz-Algorithm".to_string(),
            "AWS4-HMAC-SHA256".to_string(),
        );
        query.insert(
            "X-Amz-Credential".to_string(),
            uri_encode(&format!("{}/{scope}", self.credentials.access_key)),
        );
        query.insert("X-Amz-Date".to_string(), amz_date.clone());
        query.insert(
            "X-Amz-Expires".to_string(),
            request.expires_in_secs.to_string(),
        );
        query.insert("X-Amz-SignedHeaders".to_string(), "host".to_string());
        if let Some(token) = &self.credentials.session_token {
            query.insert("X-Amz-Security-Token".to_string(), uri_encode(token));
        }
        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD",
            method = request.method.as_str(),
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key =
            derive_signing_key(&self.credentials.secret_key, &date, &self.region)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        Ok(format!(
            "{}://{host}{canonical_uri}?{canonical_query}&X-Amz-Signature={signature}",
            self.scheme
        ))
    }
}

#[async_trait::async_trait]
impl ObjectSigner for S3ObjectSigner {
    async fn presign(&self, request: &SignedUrlRequest) -> Result<String, SigningError> {
        self.presign_at(request, Utc::now())
    }
}

/// AWSエンドポイント（s3.REGION.amazonaws.com）からリージョンを取り出す。
fn detect_region(endpoint: &str) -> Option<String> {
    let start = endpoint.find("s3.")?;
    let rest = &endpoint[start + 3..];
    let end = rest.find(".amazonaws.com")?;
    let region = &rest[..end];
    (!region.is_empty()).then(|| region.to_string())
}

/// RFC 3986 の非予約文字以外をパーセントエンコードする。
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// キーをセグメントごとにエンコードする（`/` は残す）。
fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn derive_signing_key(secret: &str, date: &str, region: &str) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SigningError::Storage(format!("HMAC鍵の初期化に失敗: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
