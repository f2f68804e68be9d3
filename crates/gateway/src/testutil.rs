//! # テスト用共通ヘルパー
//!
//! モック署名器、スクリプト化したAllowlist取得元、モックBlob Storeサーバー。

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::allowlist::{AllowlistSource, AllowlistStore, HttpAllowlistSource};
use crate::config::GatewayState;
use crate::error::{RefreshError, SigningError};
use crate::issuer::SignedUrlIssuer;
use crate::storage::{ObjectSigner, S3ObjectSigner, SignedUrlRequest};

pub fn ids(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// 受け取った要求を記録し、毎回異なるダミーURLを返す署名器。
#[derive(Default)]
pub struct MockObjectSigner {
    requests: Mutex<Vec<SignedUrlRequest>>,
    counter: AtomicU64,
    fail: bool,
}

impl MockObjectSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常にStorageエラーを返す署名器。
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<SignedUrlRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ObjectSigner for MockObjectSigner {
    async fn presign(&self, request: &SignedUrlRequest) -> Result<String, SigningError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(SigningError::Storage("mock storage unavailable".to_string()));
        }
        let nonce = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "mock://{}/{}?method={}&expires={}&nonce={nonce}",
            request.bucket, request.key, request.method, request.expires_in_secs
        ))
    }
}

/// 用意した結果を順に返す取得元。尽きたらFetchエラー。
pub struct StaticSource {
    results: Mutex<VecDeque<Result<HashSet<String>, RefreshError>>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(results: Vec<Result<HashSet<String>, RefreshError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AllowlistSource for StaticSource {
    async fn fetch(&self) -> Result<HashSet<String>, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RefreshError::Fetch("no scripted result".to_string())))
    }
}

/// `release` されるまで取得を終えない取得元。
pub struct GatedSource {
    ids: HashSet<String>,
    started: Notify,
    release: Notify,
}

impl GatedSource {
    pub fn new(ids: HashSet<String>) -> Self {
        Self {
            ids,
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub async fn started(&self) {
        self.started.notified().await
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait::async_trait]
impl AllowlistSource for GatedSource {
    async fn fetch(&self) -> Result<HashSet<String>, RefreshError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.ids.clone())
    }
}

/// テスト用の認証情報でローカルのモックストレージに向けた署名器。
pub fn local_signer(port: u16) -> S3ObjectSigner {
    S3ObjectSigner::new(
        &format!("http://127.0.0.1:{port}"),
        "us-east-1",
        crate::storage::s3::S3Credentials {
            access_key: "test-access".to_string(),
            secret_key: "test-secret".to_string(),
            session_token: None,
        },
        true,
    )
    .unwrap()
}

pub fn http_source(port: u16, bucket: &str, object_name: &str) -> HttpAllowlistSource {
    HttpAllowlistSource::new(
        reqwest::Client::new(),
        SignedUrlIssuer::new(Arc::new(local_signer(port))),
        bucket,
        object_name,
    )
}

/// モックストレージを起動する。各エントリは (パス, ステータス, 本文)。
pub async fn start_mock_storage(routes: Vec<(&'static str, u16, Vec<u8>)>) -> u16 {
    use axum::http::StatusCode;
    use axum::routing::get;

    let mut app = axum::Router::new();
    for (path, status, body) in routes {
        let status = StatusCode::from_u16(status).unwrap();
        app = app.route(
            path,
            get(move || {
                let body = body.clone();
                async move { (status, body) }
            }),
        );
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}

/// テスト用GatewayStateを構築するヘルパー
pub fn test_state(
    allowlist: Arc<AllowlistStore>,
    signer: Arc<dyn ObjectSigner>,
) -> Arc<GatewayState> {
    Arc::new(GatewayState {
        bucket: "fota-images".to_string(),
        allowlist_object: "whitelist.json".to_string(),
        url_expiry_secs: 86400,
        allowlist,
        issuer: SignedUrlIssuer::new(signer),
    })
}
