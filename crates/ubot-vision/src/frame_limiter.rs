//! 프레임 속도 제한기.
//!
//! 한 주기의 시작 시각을 기록하고, 주기(1/fps)에 못 미친 시간만큼 잠든다.
//! 주기를 넘긴 경우 따라잡기 없이 즉시 반환한다.

use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FrameLimiter {
    period: Duration,
    started_at: Option<Instant>,
}

impl FrameLimiter {
    /// `fps`는 최소 1로 보정
    pub fn new(fps: u32) -> Self {
        Self::with_period(Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1))))
    }

    /// 주기 직접 지정
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            started_at: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 주기 시작
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// 마지막 `start()` 이후 경과 시간. 시작 전이면 `None`
    pub fn runtime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// 남은 주기만큼 대기
    pub fn stop_and_delay(&mut self) {
        if let Some(remaining) = self
            .runtime()
            .and_then(|elapsed| self.period.checked_sub(elapsed))
        {
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
    }
}
