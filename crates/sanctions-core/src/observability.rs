//! Observability - tracing の初期化
//!
//! `RUST_LOG` があればそれを優先し、無ければ `default_level` を使う。

use tracing_subscriber::EnvFilter;

/// 二重に呼ばれても失敗しない（2 回目以降は何もしない）
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("debug");
        init_tracing("info");
        tracing::info!("still alive");
    }
}
