//! 패키지 경계.
//!
//! 사용자 자동화 패키지는 [`Package`]를 구현하고, 실행 시 [`Toolkit`]으로
//! 봇 생성과 비전 유틸리티에 접근한다. 스프라이트는 디렉토리에서 일괄 등록한다.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ubot_core::config::AppConfig;
use ubot_core::error::CoreError;
use ubot_core::models::dedup::filter_similar_coords;
use ubot_core::models::geometry::Region;
use ubot_core::ports::capture::ScreenCapturer;
use ubot_core::ports::input::InputController;
use ubot_vision::image::Image;
use ubot_vision::locator::SpriteLocator;
use ubot_vision::ocr;
use ubot_vision::sprite::Sprite;
use ubot_vision::utilities::{self, collect_pngs};

use crate::bot::Bot;
use crate::error::AutomationError;
use crate::executor::DataHub;

// ============================================================
// SpriteRegistry
// ============================================================

/// 이름 → 스프라이트
#[derive(Debug, Clone, Default)]
pub struct SpriteRegistry {
    sprites: BTreeMap<String, Sprite>,
}

impl SpriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dir` 아래 모든 PNG를 재귀 등록
    ///
    /// 이름은 `dir` 기준 상대 경로를 소문자로, `/` 구분, 확장자 없이 만든다
    /// (`Buttons/OK.png` → `buttons/ok`). 소문자화 후 겹치는 이름은 먼저 찾은 쪽을 유지한다.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        collect_pngs(dir, &mut paths)?;
        paths.sort();

        let mut registry = Self::new();
        for path in &paths {
            let name = sprite_name(dir, path)?;
            if registry.contains(&name) {
                warn!("스프라이트 이름 중복 '{name}' — {} 무시", path.display());
                continue;
            }
            debug!("스프라이트 등록: {name}");
            registry.insert(Sprite::from_path(path, Some(&name))?);
        }

        info!("스프라이트 {}개 등록 ({})", registry.len(), dir.display());
        Ok(registry)
    }

    /// 등록 (같은 이름이면 교체하고 이전 값 반환)
    pub fn insert(&mut self, sprite: Sprite) -> Option<Sprite> {
        self.sprites.insert(sprite.name().to_string(), sprite)
    }

    pub fn get(&self, name: &str) -> Option<&Sprite> {
        self.sprites.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sprites.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sprites.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

fn sprite_name(root: &Path, path: &Path) -> Result<String, CoreError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| CoreError::Internal(format!("{}: {e}", path.display())))?
        .with_extension("");

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

// ============================================================
// Toolkit
// ============================================================

/// 패키지에 제공되는 도구 모음
#[derive(Clone)]
pub struct Toolkit {
    config: AppConfig,
    capturer: Arc<dyn ScreenCapturer>,
    input: Arc<dyn InputController>,
    sprites: Arc<SpriteRegistry>,
    locator: SpriteLocator,
}

impl Toolkit {
    pub fn new(
        config: AppConfig,
        capturer: Arc<dyn ScreenCapturer>,
        input: Arc<dyn InputController>,
        sprites: SpriteRegistry,
    ) -> Self {
        let locator = SpriteLocator::from_config(&config.locator);
        Self {
            config,
            capturer,
            input,
            sprites: Arc::new(sprites),
            locator,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sprites(&self) -> &SpriteRegistry {
        &self.sprites
    }

    pub fn locator(&self) -> &SpriteLocator {
        &self.locator
    }

    /// 같은 장치/스프라이트를 공유하는 새 봇
    pub fn create_bot(&self) -> Result<Bot, AutomationError> {
        Bot::new(
            self.config.clone(),
            Arc::clone(&self.capturer),
            Arc::clone(&self.input),
            Arc::clone(&self.sprites),
        )
    }

    /// 숫자 OCR
    pub fn detect_numbers(
        &self,
        image: &Image,
        fonts: &[Image],
        max_digits: usize,
    ) -> Result<Option<u64>, CoreError> {
        ocr::detect_numbers(image, fonts, max_digits)
    }

    /// 가까운 영역 묶기
    pub fn filter_similar_coords(&self, coords: &[Region], distance: f64) -> Vec<Region> {
        filter_similar_coords(coords, distance)
    }

    pub fn isolate_sprite(&self, images: &[Image]) -> Result<Image, CoreError> {
        utilities::isolate_sprite(images)
    }

    pub fn draw_rectangle(&self, image: &Image, region: &Region) -> Image {
        utilities::draw_rectangle(image, region, utilities::DEFAULT_RECT_COLOR)
    }
}

// ============================================================
// Package
// ============================================================

/// 자동화 패키지
pub trait Package: Send {
    fn name(&self) -> &str;

    /// 실행 전 허브 준비
    fn init(&mut self, _hub: &mut DataHub) -> Result<(), AutomationError> {
        Ok(())
    }

    fn start(&mut self, hub: &mut DataHub, toolkit: &Toolkit) -> Result<(), AutomationError>;
}

/// `init` → `start` 순서로 패키지 실행 후 허브 반환
pub fn run_package(
    package: &mut dyn Package,
    toolkit: &Toolkit,
    hub: Option<DataHub>,
) -> Result<DataHub, AutomationError> {
    let mut hub = hub.unwrap_or_default();
    info!(package = package.name(), "패키지 실행");
    package.init(&mut hub)?;
    package.start(&mut hub, toolkit)?;
    Ok(hub)
}
