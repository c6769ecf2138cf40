//! 유한 용량 랑데부 채널.
//!
//! `send`는 자리가 날 때까지 기다렸다가 넣고, 넣은 결과 채널이 가득 찼으면
//! 수신자가 하나를 꺼낼 때까지 한 번 더 기다린다. 용량 1이면 매 전송이
//! 수신과 맞물린다. 생산자/소비자 각 하나를 전제로 한다.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use ubot_core::error::CoreError;

/// 기본 용량
pub const DEFAULT_CAPACITY: usize = 1;

/// 닫힌 채널에 보내려던 항목을 돌려준다
pub struct ChannelClosed<T>(pub T);

impl<T> ChannelClosed<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for ChannelClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelClosed(..)")
    }
}

impl<T> fmt::Display for ChannelClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("채널이 닫힘")
    }
}

impl<T> std::error::Error for ChannelClosed<T> {}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    /// 누적 수신 횟수 (drain 신호 판별용)
    received: u64,
}

/// 생산자/소비자 신호용 유한 채널
pub struct Channel<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    drained: Condvar,
}

impl<T> Channel<T> {
    /// 용량 `capacity` 채널 생성 (0이면 `CoreError::Validation`)
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::validation("capacity", "채널 용량은 1 이상이어야 함"));
        }
        Ok(Self::build(capacity))
    }

    fn build(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                received: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 항목 전송
    ///
    /// 넣은 뒤 채널이 가득 찼다면 수신자가 하나 꺼낼 때까지 대기한다.
    /// 닫혀 있으면(또는 대기 중 닫히면) 항목을 그대로 돌려준다.
    pub fn send(&self, item: T) -> Result<(), ChannelClosed<T>> {
        let mut state = self.state.lock();

        while state.queue.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(ChannelClosed(item));
        }

        state.queue.push_back(item);
        self.not_empty.notify_one();

        if state.queue.len() >= self.capacity {
            let seen = state.received;
            while state.received == seen && !state.closed {
                self.drained.wait(&mut state);
            }
        }
        Ok(())
    }

    /// 항목 수신 (대기)
    ///
    /// 닫힌 뒤에도 남은 항목은 모두 꺼낼 수 있고, 비면 `None`.
    pub fn receive(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.pop(&mut state) {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// 최대 `timeout`까지 대기하며 수신
    pub fn receive_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.pop(&mut state) {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return self.pop(&mut state);
            }
        }
    }

    /// 대기 없이 수신
    pub fn try_receive(&self) -> Option<T> {
        let mut state = self.state.lock();
        self.pop(&mut state)
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 채널 닫기. 대기 중인 모든 송수신자를 깨운다
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.drained.notify_all();
    }

    fn pop(&self, state: &mut State<T>) -> Option<T> {
        let item = state.queue.pop_front()?;
        state.received += 1;
        self.not_full.notify_one();
        self.drained.notify_all();
        Some(item)
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::build(DEFAULT_CAPACITY)
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Channel")
            .field("capacity", &self.capacity)
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}
