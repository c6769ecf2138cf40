//! UBOT 도메인 모델.
//!
//! 화면 좌표계의 값 타입과 탐지 결과 중복 제거 로직을 정의한다.

pub mod dedup;
pub mod geometry;
