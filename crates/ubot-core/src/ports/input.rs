//! 입력 컨트롤러 포트.
//!
//! 디바이스에 탭/스와이프/텍스트/키 이벤트를 보내는 인터페이스를 정의한다.

use crate::error::CoreError;

/// 터치/키 이벤트 시뮬레이션 인터페이스
///
/// 구현체: `AdbClient` (실제 입력), `NoOpInputController` (로그만)
pub trait InputController: Send + Sync {
    /// 단일 탭
    fn tap(&self, x: i32, y: i32) -> Result<(), CoreError>;

    /// 스와이프 (`duration_ms` 동안 이동)
    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64)
        -> Result<(), CoreError>;

    /// 텍스트 입력
    fn text(&self, text: &str) -> Result<(), CoreError>;

    /// 키 이벤트 (Android keycode)
    fn key_event(&self, code: u32, longpress: bool) -> Result<(), CoreError>;

    /// 플랫폼 이름 (예: "adb", "noop")
    fn platform(&self) -> &str;
}
