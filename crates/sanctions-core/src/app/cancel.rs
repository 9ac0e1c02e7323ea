//! Cancel - 処理の協調的な中断
//!
//! # 学習ポイント
//! - `watch::channel(bool)` でワーカー全体に停止要求を配る
//! - 実行中のバッチは止めない（新しいバッチを取らないだけ）

use tokio::sync::watch;

/// 停止要求を出す側
///
/// drop しても停止要求にはならない（明示的に `request()` を呼ぶ）。
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// 停止要求を受ける側（ワーカーごとに clone する）
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn request(&self) {
        // 受信側がいなくても構わない
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// 停止要求が来ない signal
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // 送信側を drop しても最後の値（false）は読める
        drop(tx);
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// 停止要求が来るまで待つ（送信側が消えたら永遠に待つ）
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn request_is_visible_to_every_signal() {
        let (handle, signal) = CancelHandle::new();
        let late = handle.signal();
        assert!(!signal.is_requested());
        handle.request();
        assert!(signal.is_requested());
        assert!(late.is_requested());
    }

    #[tokio::test]
    async fn requested_resolves_after_request() {
        let (handle, mut signal) = CancelHandle::new();
        let waiter = tokio::spawn(async move { signal.requested().await });
        handle.request();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn never_signal_stays_quiet() {
        let mut signal = CancelSignal::never();
        assert!(!signal.is_requested());
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.requested()).await;
        assert!(waited.is_err());
    }
}
