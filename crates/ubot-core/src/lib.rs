//! # ubot-core
//!
//! UBOT 도메인 모델, 포트(trait) 정의, 에러 타입.
//! 모든 크레이트가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`] — 좌표/영역 값 타입과 근접 좌표 중복 제거
//! - [`ports`] — 디바이스 캡처/입력 포트 인터페이스
//! - [`error`] — 핵심 에러 타입 (thiserror)
//! - [`config`] — 애플리케이션 설정 구조체
//! - [`config_manager`] — 설정 파일 로드 (config crate)

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;
