//! ProgressSink port - 進捗通知
//!
//! どのワーカーからでも同時に呼ばれる。エンジン側では直列化しないので、
//! UI スレッドへの受け渡しは実装側の責任。

use tokio::sync::mpsc;

/// ProgressSink は人間向けの進捗メッセージを受け取る
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);
}

/// クロージャをそのまま使える
impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// チャネル経由で UI 側に渡す
///
/// 受信側が閉じていたら黙って捨てる（進捗は処理結果に影響しない）。
impl ProgressSink for mpsc::UnboundedSender<String> {
    fn report(&self, message: &str) {
        let _ = self.send(message.to_string());
    }
}

/// 何もしない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _message: &str) {}
}
