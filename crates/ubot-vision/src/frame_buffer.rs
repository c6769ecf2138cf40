//! 프레임 버퍼.
//!
//! 최신순으로 최대 N개의 프레임을 보관한다. 쓰기는 그래버 하나만 하고,
//! 읽기는 봇/모니터 등 여러 스레드가 `Arc<FrameBuffer>`를 공유해서 한다.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ubot_core::error::CoreError;

use crate::frame::Frame;

/// 최신순 고정 용량 프레임 버퍼
#[derive(Debug)]
pub struct FrameBuffer {
    capacity: usize,
    frames: Mutex<VecDeque<Arc<Frame>>>,
    available: Condvar,
}

impl FrameBuffer {
    /// 용량 지정 생성 (0이면 `CoreError::Validation`)
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::validation(
                "frame_buffer.capacity",
                "1 이상이어야 함",
            ));
        }
        Ok(Self {
            capacity,
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 맨 앞에 추가, 가득 차 있으면 가장 오래된 프레임 제거
    pub fn add_frame(&self, frame: Arc<Frame>) {
        {
            let mut frames = self.frames.lock();
            if frames.len() == self.capacity {
                frames.pop_back();
            }
            frames.push_front(frame);
        }
        self.available.notify_all();
    }

    /// 최신 프레임 (프레임이 생길 때까지 대기)
    pub fn latest_frame(&self) -> Arc<Frame> {
        let mut frames = self.frames.lock();
        loop {
            if let Some(frame) = frames.front() {
                return Arc::clone(frame);
            }
            self.available.wait(&mut frames);
        }
    }

    /// 최신 프레임 (최대 `timeout` 대기, 시간 초과 시 `None`)
    pub fn latest_frame_timeout(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock();
        loop {
            if let Some(frame) = frames.front() {
                return Some(Arc::clone(frame));
            }
            if self.available.wait_until(&mut frames, deadline).timed_out() {
                return frames.front().cloned();
            }
        }
    }

    /// 최신 프레임 (대기 없음)
    pub fn newest_frame(&self) -> Option<Arc<Frame>> {
        self.frames.lock().front().cloned()
    }

    /// 두 번째로 최신인 프레임
    pub fn previous_frame(&self) -> Option<Arc<Frame>> {
        self.frames.lock().get(1).cloned()
    }

    /// 최신순 스냅샷
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.frames.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// 모든 프레임 제거
    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}
