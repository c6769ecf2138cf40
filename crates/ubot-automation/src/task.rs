//! 이름 붙은 백그라운드 태스크.
//!
//! 태스크마다 OS 스레드(태스크 이름) 하나, 협조적 정지 토큰, 전용 채널을 가진다.
//! 강제 종료는 없다. 본문이 토큰을 확인해 스스로 빠져나와야 한다.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use ubot_core::error::CoreError;

use crate::channel::Channel;
use crate::error::AutomationError;

/// 태스크 채널로 주고받는 메시지
pub type TaskMessage = Value;

type TaskBody = Box<dyn FnOnce(TaskContext) -> Result<(), AutomationError> + Send + 'static>;

// ============================================================
// StopToken / TaskContext
// ============================================================

/// 협조적 정지 토큰
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 태스크 본문에 전달되는 문맥
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub name: String,
    pub token: StopToken,
    pub channel: Arc<Channel<TaskMessage>>,
}

impl TaskContext {
    /// 정지 요청 전까지 `true`
    pub fn alive(&self) -> bool {
        !self.token.is_stopped()
    }
}

/// 태스크 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Alive,
    Stopped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => f.write_str("alive"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

// ============================================================
// Task
// ============================================================

/// 백그라운드 태스크
pub struct Task {
    name: String,
    token: StopToken,
    channel: Arc<Channel<TaskMessage>>,
    body: Mutex<Option<TaskBody>>,
    handle: Mutex<Option<JoinHandle<Result<(), AutomationError>>>>,
    finished: Arc<AtomicBool>,
}

/// 본문이 반환하거나 패닉으로 풀릴 때 종료 표시
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Task {
    fn new(name: String, body: TaskBody) -> Self {
        Self {
            name,
            token: StopToken::new(),
            channel: Arc::new(Channel::default()),
            body: Mutex::new(Some(body)),
            handle: Mutex::new(None),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &StopToken {
        &self.token
    }

    pub fn channel(&self) -> &Arc<Channel<TaskMessage>> {
        &self.channel
    }

    /// 태스크 이름으로 스레드 생성 후 본문 실행
    pub fn start(&self) -> Result<(), AutomationError> {
        let body = self
            .body
            .lock()
            .take()
            .ok_or_else(|| AutomationError::TaskAlreadyStarted(self.name.clone()))?;

        let context = TaskContext {
            name: self.name.clone(),
            token: self.token.clone(),
            channel: Arc::clone(&self.channel),
        };

        let finished = FinishGuard(Arc::clone(&self.finished));
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _finished = finished;
                body(context)
            })
            .map_err(|e| CoreError::Internal(format!("태스크 스레드 생성 실패: {e}")))?;

        *self.handle.lock() = Some(handle);
        info!(task = %self.name, "태스크 시작");
        Ok(())
    }

    /// 정지 요청 (토큰 설정 + 채널 닫기로 대기 중인 본문을 깨움)
    pub fn stop(&self) {
        debug!(task = %self.name, "태스크 정지 요청");
        self.token.stop();
        self.channel.close();
    }

    /// 본문 종료까지 대기하고 결과 반환
    ///
    /// 시작하지 않았거나 이미 합류했으면 즉시 `Ok`.
    pub fn join(&self) -> Result<(), AutomationError> {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| AutomationError::TaskPanicked(self.name.clone()))?,
            None => Ok(()),
        }
    }

    pub fn alive(&self) -> bool {
        !self.token.is_stopped()
    }

    pub fn state(&self) -> TaskState {
        if self.alive() {
            TaskState::Alive
        } else {
            TaskState::Stopped
        }
    }

    /// 시작된 본문이 끝났는지 (합류 이후에도 유지)
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// 시작했고 아직 실행 중인지
    pub fn is_running(&self) -> bool {
        self.body.lock().is_none() && !self.is_finished()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================
// TaskManager
// ============================================================

static GLOBAL: Lazy<TaskManager> = Lazy::new(TaskManager::new);

/// 이름 기반 태스크 레지스트리
#[derive(Default)]
pub struct TaskManager {
    tasks: Mutex<HashMap<String, Arc<Task>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 프로세스 전역 인스턴스
    pub fn global() -> &'static TaskManager {
        &GLOBAL
    }

    /// 태스크 등록 (시작하지 않음)
    ///
    /// 같은 이름이 이미 등록돼 있으면 (종료된 태스크 포함) `TaskConflict`.
    /// 이름은 `remove_task` 또는 `stop_task(name, true)`로 비운다.
    pub fn create_task<F>(&self, name: impl Into<String>, target: F) -> Result<Arc<Task>, AutomationError>
    where
        F: FnOnce(TaskContext) -> Result<(), AutomationError> + Send + 'static,
    {
        let name = name.into();
        let mut tasks = self.tasks.lock();

        if tasks.contains_key(&name) {
            return Err(AutomationError::TaskConflict(name));
        }

        let task = Arc::new(Task::new(name.clone(), Box::new(target)));
        tasks.insert(name, Arc::clone(&task));
        Ok(task)
    }

    pub fn get_task(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.lock().get(name).cloned()
    }

    /// 호출한 스레드 이름에 해당하는 태스크
    pub fn current_task(&self) -> Option<Arc<Task>> {
        let current = thread::current();
        current.name().and_then(|name| self.get_task(name))
    }

    /// 정지 요청. `join`이면 종료를 기다린 뒤 등록 해제하고 본문 결과를 반환
    pub fn stop_task(&self, name: &str, join: bool) -> Result<(), AutomationError> {
        let task = self
            .get_task(name)
            .ok_or_else(|| AutomationError::TaskNotFound(name.to_string()))?;

        task.stop();
        if !join {
            return Ok(());
        }

        let result = task.join();
        self.remove_task(name);
        info!(task = name, "태스크 종료");
        result
    }

    /// 등록 해제 (스레드는 건드리지 않음)
    pub fn remove_task(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.lock().remove(name)
    }

    /// 등록된 태스크 이름 (정렬)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}
