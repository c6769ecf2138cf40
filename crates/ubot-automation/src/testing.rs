//! 단위 테스트용 목(mock) 장치.

use image::{DynamicImage, GrayImage, Luma};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use ubot_core::config::AppConfig;
use ubot_core::error::CoreError;
use ubot_core::ports::capture::ScreenCapturer;
use ubot_core::ports::input::InputController;

use crate::adb::NoOpInputController;
use crate::bot::Bot;
use crate::package::SpriteRegistry;

/// 해시 노이즈 그레이스케일 PNG
pub(crate) fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| {
        let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77) ^ 0x1234_5678;
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        Luma([(h >> 24) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// 항상 같은 PNG를 돌려주는 캡처기
pub(crate) struct StaticCapturer {
    png: Vec<u8>,
}

impl StaticCapturer {
    pub(crate) fn new(png: Vec<u8>) -> Self {
        Self { png }
    }
}

impl ScreenCapturer for StaticCapturer {
    fn screencap(&self) -> Result<Vec<u8>, CoreError> {
        Ok(self.png.clone())
    }

    fn screensize(&self) -> Result<(u32, u32), CoreError> {
        Ok((0, 0))
    }

    fn shell(&self, _command: &str) -> Result<String, CoreError> {
        Ok(String::new())
    }
}

/// 입력을 기록하는 컨트롤러
#[derive(Default)]
pub(crate) struct RecordingInput {
    taps: Mutex<Vec<(i32, i32)>>,
    swipes: Mutex<Vec<(i32, i32, i32, i32, u64)>>,
    texts: Mutex<Vec<String>>,
    keys: Mutex<Vec<(u32, bool)>>,
}

impl RecordingInput {
    pub(crate) fn taps(&self) -> Vec<(i32, i32)> {
        self.taps.lock().clone()
    }

    pub(crate) fn swipes(&self) -> Vec<(i32, i32, i32, i32, u64)> {
        self.swipes.lock().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub(crate) fn keys(&self) -> Vec<(u32, bool)> {
        self.keys.lock().clone()
    }
}

impl InputController for RecordingInput {
    fn tap(&self, x: i32, y: i32) -> Result<(), CoreError> {
        self.taps.lock().push((x, y));
        Ok(())
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> Result<(), CoreError> {
        self.swipes.lock().push((x1, y1, x2, y2, duration_ms));
        Ok(())
    }

    fn text(&self, text: &str) -> Result<(), CoreError> {
        self.texts.lock().push(text.to_string());
        Ok(())
    }

    fn key_event(&self, code: u32, longpress: bool) -> Result<(), CoreError> {
        self.keys.lock().push((code, longpress));
        Ok(())
    }

    fn platform(&self) -> &str {
        "recording"
    }
}

/// 노이즈 화면 + NoOp 입력 봇
pub(crate) fn test_bot() -> Bot {
    test_bot_with(
        Arc::new(StaticCapturer::new(noise_png(32, 24))),
        Arc::new(NoOpInputController),
        SpriteRegistry::new(),
    )
}

pub(crate) fn test_bot_with(
    capturer: Arc<dyn ScreenCapturer>,
    input: Arc<dyn InputController>,
    sprites: SpriteRegistry,
) -> Bot {
    Bot::new(AppConfig::default(), capturer, input, Arc::new(sprites)).unwrap()
}
