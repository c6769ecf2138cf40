//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! 어댑터 crate가 이 trait들을 구현하며, `ubot-app`에서 `Arc<dyn T>`로 와이어링한다.
//!
//! 프레임 그래버와 태스크가 OS 스레드에서 돌기 때문에 포트는 동기 trait이다.

pub mod capture;
pub mod input;
