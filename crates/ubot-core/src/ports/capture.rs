//! 스크린 캡처 포트.
//!
//! 구현: `ubot-automation::adb::AdbClient`

use crate::error::CoreError;

/// 디바이스 화면 캡처 인터페이스
///
/// 프레임 그래버 워커 스레드에서 호출되므로 `Send + Sync`.
pub trait ScreenCapturer: Send + Sync {
    /// 현재 화면을 인코딩된 이미지 바이트(PNG 등)로 반환
    fn screencap(&self) -> Result<Vec<u8>, CoreError>;

    /// 디바이스 화면 크기 (너비, 높이)
    fn screensize(&self) -> Result<(u32, u32), CoreError>;

    /// 디바이스 셸 명령 실행 후 표준 출력 반환
    fn shell(&self, command: &str) -> Result<String, CoreError>;
}
