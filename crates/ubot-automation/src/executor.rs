//! 스텝 실행기.
//!
//! 이름 붙은 스텝 목록을 순서대로 실행하며, 각 핸들러가 돌려준 [`Jump`]로
//! 다음 위치를 정한다. 뒤로 점프해 생기는 루프는 의도된 동작이다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bot::Bot;
use crate::error::AutomationError;

// ============================================================
// Jump
// ============================================================

/// 다음 실행 위치
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Jump {
    /// 다음 스텝
    #[default]
    Next,
    /// 인덱스로 이동 (범위 밖이면 양 끝으로 보정)
    Index(i64),
    /// 이름으로 이동 (첫 번째 일치)
    Step(String),
    /// 첫 스텝
    Begin,
    /// 마지막 스텝
    Final,
    /// 실행 종료
    End,
}

impl From<&str> for Jump {
    fn from(value: &str) -> Self {
        match value {
            "" => Self::Next,
            "begin" => Self::Begin,
            "final" => Self::Final,
            "end" => Self::End,
            name => Self::Step(name.to_string()),
        }
    }
}

impl From<String> for Jump {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<i64> for Jump {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

// ============================================================
// DataHub
// ============================================================

/// 한 번의 실행 동안 모든 스텝이 공유하는 데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataHub(HashMap<String, Value>);

impl DataHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 값을 `T`로 역직렬화 (없거나 형식이 다르면 `None`)
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> HashMap<String, Value> {
        self.0
    }
}

impl From<HashMap<String, Value>> for DataHub {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================
// Step
// ============================================================

/// 핸들러에 전달되는 실행 문맥
pub struct StepContext<'a> {
    pub bot: &'a Bot,
    pub hub: &'a mut DataHub,
    /// 직전에 실행된 스텝 이름 (건너뛴 스텝은 제외)
    pub previous_step: Option<&'a str>,
    pub args: &'a [Value],
    pub kwargs: &'a Map<String, Value>,
}

impl StepContext<'_> {
    /// 위치 인자 `index`를 `T`로 변환
    pub fn arg<T: serde::de::DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.args
            .get(index)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// 키워드 인자 `key`를 `T`로 변환
    pub fn kwarg<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.kwargs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// 스텝 핸들러
pub type StepHandler =
    Arc<dyn Fn(&mut StepContext<'_>) -> Result<Jump, AutomationError> + Send + Sync>;

/// 스크립트 한 단계
#[derive(Clone)]
pub struct Step {
    name: String,
    handler: Option<StepHandler>,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
}

impl Step {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut StepContext<'_>) -> Result<Jump, AutomationError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Some(Arc::new(handler)),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// 핸들러 없는 스텝 (실행 시 건너뜀)
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("handler", &self.handler.is_some())
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

// ============================================================
// StepExecutor
// ============================================================

/// 점프 가능한 스크립트 실행기
pub struct StepExecutor<'s> {
    steps: &'s [Step],
}

impl<'s> StepExecutor<'s> {
    pub fn new(steps: &'s [Step]) -> Self {
        Self { steps }
    }

    /// `start`부터 실행. 커서가 끝에 닿으면 허브를 반환한다
    ///
    /// 핸들러 에러는 즉시 `StepFailed`로 전파된다.
    pub fn run(&self, bot: &Bot, start: Jump, hub: Option<DataHub>) -> Result<DataHub, AutomationError> {
        let mut hub = hub.unwrap_or_default();
        let mut index = self.resolve(&start)?.unwrap_or(0);
        let mut previous: Option<String> = None;

        while index < self.steps.len() {
            let step = &self.steps[index];

            let Some(handler) = step.handler.as_ref() else {
                debug!(step = %step.name, index, "스텝 건너뜀 (핸들러 없음)");
                index += 1;
                continue;
            };

            debug!(step = %step.name, index, "스텝 실행");
            let jump = {
                let mut ctx = StepContext {
                    bot,
                    hub: &mut hub,
                    previous_step: previous.as_deref(),
                    args: &step.args,
                    kwargs: &step.kwargs,
                };
                handler(&mut ctx).map_err(|e| AutomationError::StepFailed {
                    step: step.name.clone(),
                    source: Box::new(e),
                })?
            };

            index = match self.resolve(&jump)? {
                Some(next) => next,
                None => index + 1,
            };
            previous = Some(step.name.clone());
        }

        Ok(hub)
    }

    /// 점프 대상을 인덱스로 변환 (`Next`는 `None`)
    pub fn resolve(&self, jump: &Jump) -> Result<Option<usize>, AutomationError> {
        let len = self.steps.len();
        let last = len.saturating_sub(1);

        let index = match jump {
            Jump::Next => return Ok(None),
            Jump::Index(i) => usize::try_from(*i).unwrap_or(0).min(last),
            Jump::Begin => 0,
            Jump::Final => last,
            Jump::End => len,
            Jump::Step(name) => {
                let mut found = self
                    .steps
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.name == *name)
                    .map(|(i, _)| i);
                let first = found
                    .next()
                    .ok_or_else(|| AutomationError::StepNotFound(name.clone()))?;
                if found.next().is_some() {
                    warn!("스텝 이름 중복: '{name}' — 첫 번째 스텝으로 이동");
                }
                first
            }
        };
        Ok(Some(index))
    }
}
