//! # ubot-vision
//!
//! 화면 인식 크레이트.
//! 프레임 캡처 파이프라인(그래버 → 버퍼), NCC 템플릿 매칭, 멀티 스케일 스프라이트 탐색,
//! 스프라이트 제작 유틸리티와 숫자 OCR을 담당한다.

pub mod frame;
pub mod frame_buffer;
pub mod frame_limiter;
pub mod grabber;
pub mod image;
pub mod locator;
pub mod matching;
pub mod ocr;
pub mod sprite;
pub mod utilities;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use frame_limiter::FrameLimiter;
pub use grabber::{CaptureMode, FrameGrabber};
pub use image::{Image, ImageMode};
pub use locator::{Detection, LocateOptions, Matches, SpriteLocator};
pub use sprite::Sprite;
