//! # HTTPサーバー起動・停止
//!
//! 停止要求を受けたら新規接続の受付をやめ、処理中のリクエストを
//! 上限時間まで待ってから終了する。上限を過ぎたら打ち切る。

use std::future::{Future, IntoFuture};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// `shutdown` が完了するまで `app` を提供し、その後 `grace` を上限に排出する。
pub async fn serve_with_drain<F>(
    listener: TcpListener,
    app: axum::Router,
    shutdown: F,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let drain = CancellationToken::new();
    let server = axum::serve(listener, app).with_graceful_shutdown(drain.clone().cancelled_owned());
    let mut task = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut task => {
            return result.map_err(std::io::Error::other)?;
        }
        _ = shutdown => {}
    }

    tracing::info!(
        grace_ms = grace.as_millis() as u64,
        "停止要求を受信。処理中のリクエストを待ちます"
    );
    drain.cancel();

    match tokio::time::timeout(grace, &mut task).await {
        Ok(result) => {
            result.map_err(std::io::Error::other)??;
            tracing::info!("サーバーを停止しました");
            Ok(())
        }
        Err(_) => {
            tracing::warn!("排出の待ち時間を超えたため残りの接続を打ち切ります");
            task.abort();
            Ok(())
        }
    }
}

/// SIGINT（Ctrl-C）またはSIGTERMを待つ。
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-Cハンドラの登録に失敗");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERMハンドラの登録に失敗");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
