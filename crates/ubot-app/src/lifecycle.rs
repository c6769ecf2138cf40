//! 캡처 종료 조건.
//!
//! Ctrl+C 또는 실행 시간 만료 중 먼저 오는 쪽을 기다린다.

use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// 캡처가 끝난 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    Elapsed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "Ctrl+C"),
            Self::Elapsed => write!(f, "실행 시간 만료"),
        }
    }
}

/// 종료 조건 대기. `limit`이 없으면 Ctrl+C까지
pub async fn wait_for_stop(limit: Option<Duration>) -> StopReason {
    let reason = tokio::select! {
        _ = interrupted() => StopReason::Interrupted,
        _ = elapsed(limit) => StopReason::Elapsed,
    };
    info!("캡처 종료: {reason}");
    reason
}

/// 핸들러 등록에 실패하면 영원히 대기
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C 핸들러 등록 실패: {e}");
        std::future::pending::<()>().await;
    }
}

async fn elapsed(limit: Option<Duration>) {
    match limit {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
