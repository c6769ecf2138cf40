//! 자동화 레이어 에러 타입.

use thiserror::Error;
use ubot_core::error::CoreError;

use crate::channel::ChannelClosed;

/// 자동화 에러
#[derive(Debug, Error)]
pub enum AutomationError {
    /// 코어 레이어 에러 (설정, 캡처, 입력, 이미지)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// 점프 대상 스텝 없음
    #[error("스텝 '{0}' 미발견")]
    StepNotFound(String),

    /// 스텝 핸들러 실패 (실행 중단)
    #[error("스텝 '{step}' 실패: {source}")]
    StepFailed {
        /// 실패한 스텝 이름
        step: String,
        /// 핸들러가 반환한 에러
        #[source]
        source: Box<AutomationError>,
    },

    /// 화면에서 스프라이트를 찾지 못함
    #[error("스프라이트 '{0}'가 화면에 없음")]
    SpriteNotFound(String),

    /// 같은 이름의 살아있는 태스크가 이미 등록됨
    #[error("태스크 '{0}' 이미 등록됨")]
    TaskConflict(String),

    /// 태스크 미발견
    #[error("태스크 '{0}' 미발견")]
    TaskNotFound(String),

    /// 이미 시작된 태스크를 다시 시작
    #[error("태스크 '{0}' 이미 시작됨")]
    TaskAlreadyStarted(String),

    /// 태스크 본문 패닉
    #[error("태스크 '{0}' 패닉")]
    TaskPanicked(String),

    /// 닫힌 채널에 전송
    #[error("채널이 닫힘")]
    ChannelClosed,

    /// 스크립트가 직접 발생시킨 에러
    #[error("스크립트 에러: {0}")]
    Script(String),
}

impl AutomationError {
    /// 스크립트 에러 생성 헬퍼
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }
}

impl<T> From<ChannelClosed<T>> for AutomationError {
    fn from(_: ChannelClosed<T>) -> Self {
        Self::ChannelClosed
    }
}
