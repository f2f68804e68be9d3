//! # Allowlist 定期更新
//!
//! `sleep(period) → 更新 → 繰り返し` の協調ループ。
//! 待ち時間は前回の試行が終わった時点から数えるため、失敗が続いても
//! 更新が詰まることはない（失敗処理にかかった分だけ周期がずれる）。
//! キャンセルは待機中にだけ観測し、開始した更新は最後まで走らせる。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{AllowlistSnapshot, AllowlistSource, AllowlistStore};
use crate::error::RefreshError;

/// 1回更新し、結果をログに残す。失敗してもスナップショットはそのまま。
pub async fn refresh_logged(
    store: &AllowlistStore,
    source: &dyn AllowlistSource,
) -> Result<Arc<AllowlistSnapshot>, RefreshError> {
    tracing::info!("Allowlistを読み込み中...");
    match store.refresh(source).await {
        Ok(snapshot) => {
            tracing::info!(
                entries = snapshot.len(),
                generation = snapshot.generation(),
                "Allowlistを更新しました"
            );
            Ok(snapshot)
        }
        Err(e) => {
            let kept = store.current();
            tracing::error!(
                error = %e,
                kept_entries = kept.len(),
                kept_generation = kept.generation(),
                "Allowlistの更新に失敗。直前の内容を保持します"
            );
            Err(e)
        }
    }
}

/// 定期更新ループ本体。`cancel` が発火するまで戻らない。
pub async fn run_refresh_loop(
    store: Arc<AllowlistStore>,
    source: Arc<dyn AllowlistSource>,
    period: Duration,
    cancel: CancellationToken,
) {
    loop {
        tracing::info!(period_secs = period.as_secs(), "次のAllowlist更新まで待機します");
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Allowlist更新ループを停止します");
                break;
            }
            _ = tokio::time::sleep(period) => {}
        }
        // 結果はログ済み。次の周期へ進む
        let _ = refresh_logged(&store, source.as_ref()).await;
    }
}

/// 定期更新ループを別タスクとして起動する。
pub fn spawn_refresh_loop(
    store: Arc<AllowlistStore>,
    source: Arc<dyn AllowlistSource>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_refresh_loop(store, source, period, cancel))
}

/// ループに停止を要求し、最大 `grace` だけ終了を待つ。
///
/// 更新の途中ならその完了を待つが、期限を過ぎたらタスクを中断する。
/// 期限内に終了したら true を返す。
pub async fn stop_refresh_loop(
    mut handle: JoinHandle<()>,
    cancel: &CancellationToken,
    grace: Duration,
) -> bool {
    cancel.cancel();
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Allowlist更新ループが異常終了しました");
            true
        }
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "Allowlist更新が期限内に終わらないため中断します"
            );
            handle.abort();
            false
        }
    }
}
