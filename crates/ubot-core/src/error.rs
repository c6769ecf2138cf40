//! UBOT 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 자체 에러 타입에서 `#[from] CoreError`로 래핑한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 설정, 유효성 검증, 디바이스 I/O, 이미지 처리 등 도메인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 — {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Sprite", "Step")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 이미지 디코딩/변환 실패
    #[error("이미지 에러: {0}")]
    Image(String),

    /// 스크린 캡처 실패
    #[error("캡처 에러: {0}")]
    Capture(String),

    /// 입력 이벤트 전송 실패
    #[error("입력 에러: {0}")]
    Input(String),

    /// 디바이스 브리지 명령 실패
    #[error("디바이스 에러: {0}")]
    Device(String),

    /// 연결된 디바이스 없음
    #[error("연결된 디바이스를 찾을 수 없음")]
    DeviceNotFound,

    /// 디바이스가 여러 대인데 시리얼 미지정
    #[error("디바이스가 여러 대 연결됨 — 시리얼을 지정해야 함")]
    DeviceNotProvided,

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 필드 유효성 에러 생성 헬퍼
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 리소스 미발견 에러 생성 헬퍼
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_contains_field() {
        let err = CoreError::validation("frame_buffer.capacity", "1 이상이어야 함");
        let msg = err.to_string();
        assert!(msg.contains("frame_buffer.capacity"));
        assert!(msg.contains("1 이상"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "dump");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
