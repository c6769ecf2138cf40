//! 스프라이트 탐색기.
//!
//! 멀티 스케일 NCC 템플릿 매칭 + 근접 탐지 중복 제거.
//!
//! 1. 스케일 피라미드: `scale`부터 1.0까지 균등 10단계 (같은 크기 단계는 건너뜀)
//! 2. 단계별 점수 평면 계산
//! 3. best-match면 전역 최대, 아니면 임계값 이상 전부를 후보로
//! 4. 모든 단계의 후보를 모아 한 번에 중복 제거

use serde::Serialize;
use tracing::debug;
use ubot_core::config::LocatorConfig;
use ubot_core::error::CoreError;
use ubot_core::models::dedup::filter_similar_by;
use ubot_core::models::geometry::Region;

use crate::image::{Image, ImageMode};
use crate::matching::match_template;
use crate::sprite::Sprite;

/// 피라미드 단계 수
const PYRAMID_LEVELS: usize = 10;

/// best-match 모드 기본 중복 제거 거리 (px)
pub const DEFAULT_BEST_MATCH_DEDUP_PX: f64 = 10.0;

/// 전체 탐색 모드 기본 중복 제거 거리 (px)
pub const DEFAULT_SCAN_DEDUP_PX: f64 = 40.0;

/// 탐지 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    /// 프레임 좌표계 영역
    pub region: Region,
    /// NCC 점수 [-1, 1]
    pub score: f32,
}

impl Detection {
    fn translate(self, dx: i32, dy: i32) -> Self {
        Self {
            region: self.region.translate(dx, dy),
            score: self.score,
        }
    }
}

/// 탐색 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Matches {
    /// best-match 모드 결과 (없으면 `None`)
    Best(Option<Detection>),
    /// 전체 탐색 결과
    All(Vec<Detection>),
}

impl Matches {
    /// 최고 점수 탐지
    pub fn best(&self) -> Option<&Detection> {
        match self {
            Self::Best(best) => best.as_ref(),
            Self::All(all) => all
                .iter()
                .fold(None, |acc: Option<&Detection>, d| match acc {
                    Some(a) if a.score >= d.score => Some(a),
                    _ => Some(d),
                }),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Best(best) => best.is_none(),
            Self::All(all) => all.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Best(best) => usize::from(best.is_some()),
            Self::All(all) => all.len(),
        }
    }

    pub fn into_vec(self) -> Vec<Detection> {
        match self {
            Self::Best(best) => best.into_iter().collect(),
            Self::All(all) => all,
        }
    }

    fn translate(self, dx: i32, dy: i32) -> Self {
        match self {
            Self::Best(best) => Self::Best(best.map(|d| d.translate(dx, dy))),
            Self::All(all) => Self::All(all.into_iter().map(|d| d.translate(dx, dy)).collect()),
        }
    }
}

/// 탐색 옵션 (빌더)
#[derive(Debug, Clone, PartialEq)]
pub struct LocateOptions {
    pub mode: ImageMode,
    /// 피라미드 최소 배율 (0, 1]
    pub scale: Option<f32>,
    pub best_match: bool,
    /// 최소 점수. 전체 탐색에서 `None`이면 단계별 최고 점수
    pub threshold: Option<f32>,
    /// 중복 제거 거리. `None`이면 모드별 기본값
    pub dedup_distance: Option<f64>,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            mode: ImageMode::Original,
            scale: None,
            best_match: true,
            threshold: None,
            dedup_distance: None,
        }
    }
}

impl LocateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: ImageMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn best_match(mut self, best_match: bool) -> Self {
        self.best_match = best_match;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn dedup_distance(mut self, distance: f64) -> Self {
        self.dedup_distance = Some(distance);
        self
    }
}

/// 상태 없는 매칭 엔진 (중복 제거 기본값만 보관)
#[derive(Debug, Clone)]
pub struct SpriteLocator {
    best_match_dedup_px: f64,
    scan_dedup_px: f64,
}

impl Default for SpriteLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpriteLocator {
    pub fn new() -> Self {
        Self {
            best_match_dedup_px: DEFAULT_BEST_MATCH_DEDUP_PX,
            scan_dedup_px: DEFAULT_SCAN_DEDUP_PX,
        }
    }

    pub fn from_config(config: &LocatorConfig) -> Self {
        Self {
            best_match_dedup_px: config.best_match_dedup_px,
            scan_dedup_px: config.scan_dedup_px,
        }
    }

    /// 프레임에서 스프라이트 탐색
    ///
    /// 맞는 피라미드 단계가 하나도 없으면(스프라이트가 프레임보다 큼) `CoreError::Validation`.
    /// 후보가 없으면 `Best(None)` / `All(vec![])`.
    pub fn locate<I>(&self, sprite: &Sprite, frame: &I, options: &LocateOptions) -> Result<Matches, CoreError>
    where
        I: AsRef<Image> + ?Sized,
    {
        let target = frame.as_ref().variant(options.mode);
        let (fw, fh) = target.dimensions();
        let factors = pyramid(options.scale)?;

        let mut candidates: Vec<Detection> = Vec::new();
        let mut last_size: Option<(u32, u32)> = None;
        let mut fitted = 0usize;

        for factor in factors {
            let template = sprite.image().scale(factor)?.variant(options.mode);
            let (tw, th) = template.dimensions();

            if last_size == Some((tw, th)) {
                continue;
            }
            last_size = Some((tw, th));
            if tw > fw || th > fh {
                continue;
            }
            fitted += 1;

            let map = match_template(&target, &template)?;
            let level = |x: u32, y: u32, score: f32| Detection {
                region: Region::new(x as i32, y as i32, tw as i32, th as i32),
                score,
            };

            if options.best_match {
                if let Some((x, y, score)) = map.max() {
                    if options.threshold.map_or(true, |t| score >= t) {
                        candidates.push(level(x, y, score));
                    }
                }
            } else {
                let threshold = match options.threshold {
                    Some(t) => t,
                    None => match map.max() {
                        Some((_, _, max)) => max,
                        None => continue,
                    },
                };
                candidates.extend(map.above(threshold).into_iter().map(|(x, y, s)| level(x, y, s)));
            }
        }

        if fitted == 0 {
            return Err(CoreError::validation(
                "sprite",
                format!(
                    "'{}' {}x{}가 프레임 {fw}x{fh}보다 큼",
                    sprite.name(),
                    sprite.dimensions().0,
                    sprite.dimensions().1
                ),
            ));
        }

        let distance = options.dedup_distance.unwrap_or(if options.best_match {
            self.best_match_dedup_px
        } else {
            self.scan_dedup_px
        });
        let pooled = candidates.len();
        let survivors = filter_similar_by(candidates, distance, |d| d.region);

        debug!(
            sprite = sprite.name(),
            pooled,
            kept = survivors.len(),
            "스프라이트 탐색 완료"
        );

        if options.best_match {
            let best = survivors.into_iter().fold(None, |acc: Option<Detection>, d| match acc {
                Some(a) if a.score >= d.score => Some(a),
                _ => Some(d),
            });
            Ok(Matches::Best(best))
        } else {
            Ok(Matches::All(survivors))
        }
    }

    /// 프레임의 `region` 안에서 탐색
    ///
    /// `global`이면 결과를 프레임 좌표로 되돌린다.
    pub fn locate_in_region<I>(
        &self,
        sprite: &Sprite,
        frame: &I,
        region: &Region,
        options: &LocateOptions,
        global: bool,
    ) -> Result<Matches, CoreError>
    where
        I: AsRef<Image> + ?Sized,
    {
        let image = frame.as_ref();
        let bounds = Region::new(0, 0, image.width() as i32, image.height() as i32);
        let clipped = region.intersect(&bounds).ok_or_else(|| {
            CoreError::validation("region", format!("{region} — 프레임 범위 밖"))
        })?;

        let crop = image.extract_region(&clipped)?;
        let matches = self.locate(sprite, &crop, options)?;

        Ok(if global {
            matches.translate(clipped.x, clipped.y)
        } else {
            matches
        })
    }
}

/// 스케일 피라미드 배율 (오름차순, 마지막은 1.0)
fn pyramid(scale: Option<f32>) -> Result<Vec<f32>, CoreError> {
    let Some(min) = scale else {
        return Ok(vec![1.0]);
    };
    if !(min > 0.0 && min <= 1.0) {
        return Err(CoreError::validation(
            "scale",
            format!("{min} — (0, 1] 범위여야 함"),
        ));
    }

    let step = (1.0 - min) / (PYRAMID_LEVELS - 1) as f32;
    Ok((0..PYRAMID_LEVELS)
        .map(|i| {
            if i == PYRAMID_LEVELS - 1 {
                1.0
            } else {
                min + step * i as f32
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops, DynamicImage, GrayImage, Luma};

    /// 정수 해시 노이즈 (이동한 창끼리는 상관이 거의 없음)
    fn noise(x: u32, y: u32, seed: u32) -> u8 {
        let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77) ^ seed;
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        (h & 0xFF) as u8
    }

    fn textured(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([noise(x, y, 7)]))
    }

    fn frame_with_sprite() -> (Image, Sprite) {
        let frame = textured(80, 60);
        let sprite = imageops::crop_imm(&frame, 30, 20, 12, 10).to_image();
        (
            Image::new(DynamicImage::ImageLuma8(frame)),
            Sprite::new("target", Image::new(DynamicImage::ImageLuma8(sprite))),
        )
    }

    #[test]
    fn best_match_finds_exact_subimage() {
        let (frame, sprite) = frame_with_sprite();
        let locator = SpriteLocator::new();

        let matches = locator.locate(&sprite, &frame, &LocateOptions::new()).unwrap();
        let best = *matches.best().unwrap();
        assert_eq!(best.region, Region::new(30, 20, 12, 10));
        assert!((best.score - 1.0).abs() < 1e-3);
    }

    #[test]
    fn threshold_filters_best_match() {
        let (frame, _) = frame_with_sprite();
        // 무작위에 가까운 다른 패턴
        let other = GrayImage::from_fn(12, 10, |x, y| Luma([noise(x, y, 99)]));
        let sprite = Sprite::new("other", Image::new(DynamicImage::ImageLuma8(other)));

        let matches = SpriteLocator::new()
            .locate(&sprite, &frame, &LocateOptions::new().threshold(0.99))
            .unwrap();
        assert_eq!(matches, Matches::Best(None));
    }

    #[test]
    fn all_matches_without_threshold_uses_level_max() {
        let (frame, sprite) = frame_with_sprite();
        let matches = SpriteLocator::new()
            .locate(&sprite, &frame, &LocateOptions::new().best_match(false))
            .unwrap();
        let all = matches.into_vec();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].region.to_location(), (30, 20).into());
    }

    #[test]
    fn all_matches_dedups_repeated_sprite() {
        // 같은 스프라이트를 두 곳에 배치
        let patch = textured(10, 10);
        let mut frame = GrayImage::from_pixel(100, 40, Luma([0]));
        imageops::replace(&mut frame, &patch, 5, 5);
        imageops::replace(&mut frame, &patch, 70, 20);

        let sprite = Sprite::new("patch", Image::new(DynamicImage::ImageLuma8(patch)));
        let matches = SpriteLocator::new()
            .locate(
                &sprite,
                &Image::new(DynamicImage::ImageLuma8(frame)),
                &LocateOptions::new().best_match(false).threshold(0.9),
            )
            .unwrap();

        let mut locations: Vec<_> = matches
            .into_vec()
            .iter()
            .map(|d| (d.region.x, d.region.y))
            .collect();
        locations.sort();
        assert_eq!(locations, vec![(5, 5), (70, 20)]);
    }

    #[test]
    fn threshold_mode_finds_edge_rich_sprite() {
        // 검은 배경 위 잡음 패치: 임계값 변환 후에도 윤곽이 남음
        let patch = textured(16, 14);
        let mut frame = GrayImage::from_pixel(70, 50, Luma([0]));
        imageops::replace(&mut frame, &patch, 37, 22);
        let frame = Image::new(DynamicImage::ImageLuma8(frame));
        let sprite = Sprite::new("edges", Image::new(DynamicImage::ImageLuma8(patch)));

        let edges = frame.threshold().data().to_luma8();
        assert!(edges.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(edges.pixels().any(|p| p[0] == 255));

        let matches = SpriteLocator::new()
            .locate(
                &sprite,
                &frame,
                &LocateOptions::new().mode(ImageMode::Threshold).threshold(0.5),
            )
            .unwrap();
        let best = *matches.best().expect("임계값 모드에서도 찾아야 함");
        assert_eq!(best.region, Region::new(37, 22, 16, 14));
        assert!(best.score <= 1.0 + 1e-4);
    }

    #[test]
    fn pyramid_levels_are_ascending_and_end_at_one() {
        let levels = pyramid(Some(0.5)).unwrap();
        assert_eq!(levels.len(), 10);
        assert!((levels[0] - 0.5).abs() < 1e-6);
        assert_eq!(levels[9], 1.0);
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
        assert!(pyramid(Some(0.0)).is_err());
        assert!(pyramid(Some(1.5)).is_err());
    }

    #[test]
    fn pyramid_search_finds_downscaled_sprite() {
        // 프레임에는 0.8배로 축소된 스프라이트가 있음
        let sprite = Sprite::new("patch", Image::new(DynamicImage::ImageLuma8(textured(20, 20))));
        let small = sprite.image().scale(0.8).unwrap();
        assert_eq!(small.dimensions(), (16, 16));

        let mut frame = GrayImage::from_fn(90, 70, |x, y| Luma([noise(x, y, 3)]));
        let small_luma = small.data().to_luma8();
        imageops::replace(&mut frame, &small_luma, 40, 25);

        let matches = SpriteLocator::new()
            .locate(
                &sprite,
                &Image::new(DynamicImage::ImageLuma8(frame)),
                &LocateOptions::new().scale(0.8),
            )
            .unwrap();

        let best = matches.best().unwrap();
        assert_eq!(best.region, Region::new(40, 25, 16, 16));
        assert!((best.score - 1.0).abs() < 1e-3);
    }

    #[test]
    fn sprite_larger_than_frame_is_rejected() {
        let frame = Image::from_luma(5, 5, vec![0; 25]).unwrap();
        let sprite = Sprite::new("big", Image::new(DynamicImage::ImageLuma8(textured(8, 8))));
        let result = SpriteLocator::new().locate(&sprite, &frame, &LocateOptions::new());
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn locate_in_region_translates_to_global() {
        let (frame, sprite) = frame_with_sprite();
        let locator = SpriteLocator::new();
        let region = Region::new(20, 10, 40, 30);

        let global = locator
            .locate_in_region(&sprite, &frame, &region, &LocateOptions::new(), true)
            .unwrap();
        assert_eq!(global.best().unwrap().region, Region::new(30, 20, 12, 10));

        let local = locator
            .locate_in_region(&sprite, &frame, &region, &LocateOptions::new(), false)
            .unwrap();
        assert_eq!(local.best().unwrap().region, Region::new(10, 10, 12, 10));
    }
}
