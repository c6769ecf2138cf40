//! 이미지 + 파생 이미지 캐시.
//!
//! 원본 픽셀은 `Arc`로 공유되며 절대 변경되지 않는다.
//! 그레이스케일/임계값/리사이즈 파생 이미지는 정규화된 키
//! (`grayscale`, `threshold`, `resize-{w}x{h}`)로 LRU 캐시에 보관한다.
//! 복제본은 픽셀 데이터와 캐시를 모두 공유한다.

use fast_image_resize::{images::Image as FirImage, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GrayImage, RgbaImage};
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use ubot_core::error::CoreError;
use ubot_core::models::geometry::Region;

/// 이미지당 파생 캐시 최대 크기
const VARIANT_CACHE_CAPACITY: usize = 32;

/// 임계값 변환 기준 (gray - erode 결과)
const THRESHOLD_LEVEL: u8 = 50;

/// 매칭에 사용할 이미지 변형
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImageMode {
    /// 원본 그대로
    #[default]
    Original,
    /// 그레이스케일
    Grayscale,
    /// 윤곽선 강조 이진화
    Threshold,
}

impl FromStr for ImageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "grayscale" | "gray" => Ok(Self::Grayscale),
            "threshold" => Ok(Self::Threshold),
            other => Err(format!("알 수 없는 이미지 모드: {other}")),
        }
    }
}

/// 공유 불변 이미지
#[derive(Clone)]
pub struct Image {
    data: Arc<DynamicImage>,
    variants: Arc<Mutex<LruCache<String, Image>>>,
}

impl Image {
    /// 새 이미지 생성
    pub fn new(data: DynamicImage) -> Self {
        Self {
            data: Arc::new(data),
            variants: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(VARIANT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    /// 8비트 그레이스케일 원시 버퍼에서 생성
    pub fn from_luma(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CoreError> {
        let buffer = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
            CoreError::Image(format!("그레이스케일 버퍼 크기 불일치: {width}x{height}"))
        })?;
        Ok(Self::new(DynamicImage::ImageLuma8(buffer)))
    }

    /// 인코딩된 이미지 바이트(PNG 등) 디코딩
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let data = image::load_from_memory(bytes)
            .map_err(|e| CoreError::Image(format!("이미지 디코딩 실패: {e}")))?;
        Ok(Self::new(data))
    }

    /// 파일에서 로드
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let data = image::open(path)
            .map_err(|e| CoreError::Image(format!("이미지 로드 실패: {}: {e}", path.display())))?;
        Ok(Self::new(data))
    }

    /// 원본 픽셀 데이터
    pub fn data(&self) -> &DynamicImage {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.data.width()
    }

    pub fn height(&self) -> u32 {
        self.data.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// 단일 채널(8비트) 여부
    pub fn is_grayscale(&self) -> bool {
        matches!(*self.data, DynamicImage::ImageLuma8(_))
    }

    /// 같은 픽셀 버퍼를 공유하는지
    pub fn shares_data(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// 캐시된 파생 이미지 수
    pub fn cached_variant_count(&self) -> usize {
        self.variants.lock().len()
    }

    /// 그레이스케일 변형. 단일 채널 이미지는 자기 자신
    pub fn grayscale(&self) -> Image {
        if self.is_grayscale() {
            // 자기 자신을 캐시에 넣으면 Arc 순환이 생긴다
            return self.clone();
        }
        self.cached_infallible("grayscale", || {
            Image::new(DynamicImage::ImageLuma8(self.data.to_luma8()))
        })
    }

    /// `gray - erode3x3(gray)` 후 이진화 (> 50 → 255)
    pub fn threshold(&self) -> Image {
        self.cached_infallible("threshold", || {
            let gray = self.grayscale();
            let luma = gray.data.to_luma8();
            Image::new(DynamicImage::ImageLuma8(edge_threshold(&luma)))
        })
    }

    /// 모드별 변형
    pub fn variant(&self, mode: ImageMode) -> Image {
        match mode {
            ImageMode::Original => self.clone(),
            ImageMode::Grayscale => self.grayscale(),
            ImageMode::Threshold => self.threshold(),
        }
    }

    /// 리사이즈. 한 변만 주어지면 종횡비 유지
    pub fn resize(&self, width: Option<u32>, height: Option<u32>) -> Result<Image, CoreError> {
        let (src_w, src_h) = self.dimensions();
        let (dst_w, dst_h) = match (width, height) {
            (None, None) => return Ok(self.clone()),
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, aspect_side(src_h, w, src_w)),
            (None, Some(h)) => (aspect_side(src_w, h, src_h), h),
        };

        if dst_w == 0 || dst_h == 0 {
            return Err(CoreError::validation(
                "resize",
                format!("목표 크기 0: {dst_w}x{dst_h}"),
            ));
        }
        if (dst_w, dst_h) == (src_w, src_h) {
            return Ok(self.clone());
        }

        self.cached(&format!("resize-{dst_w}x{dst_h}"), || {
            let resized = resize_dynamic(&self.data, dst_w, dst_h)?;
            debug!("이미지 리사이즈: {}x{} → {}x{}", src_w, src_h, dst_w, dst_h);
            Ok(Image::new(resized))
        })
    }

    /// 배율 리사이즈: `(max(1, ⌊w·f⌋), max(1, ⌊h·f⌋))`
    pub fn scale(&self, factor: f32) -> Result<Image, CoreError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CoreError::validation("scale", format!("{factor} — 양수여야 함")));
        }
        let (w, h) = self.dimensions();
        let scaled = |side: u32| ((side as f64 * f64::from(factor)).floor() as u32).max(1);
        self.resize(Some(scaled(w)), Some(scaled(h)))
    }

    /// 영역 잘라내기 (이미지 경계로 클램프)
    pub fn extract_region(&self, region: &Region) -> Result<Image, CoreError> {
        let bounds = Region::new(0, 0, self.width() as i32, self.height() as i32);
        let clipped = region.intersect(&bounds).ok_or_else(|| {
            CoreError::validation(
                "region",
                format!("{region} — 이미지 {}x{} 범위 밖", self.width(), self.height()),
            )
        })?;

        Ok(Image::new(self.data.crop_imm(
            clipped.x as u32,
            clipped.y as u32,
            clipped.width as u32,
            clipped.height as u32,
        )))
    }

    /// 파일 저장 (형식은 확장자로 결정)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        self.data
            .save(path)
            .map_err(|e| CoreError::Image(format!("이미지 저장 실패: {}: {e}", path.display())))
    }

    /// 캐시 조회 → 없으면 생성 후 저장
    fn cached<F>(&self, key: &str, build: F) -> Result<Image, CoreError>
    where
        F: FnOnce() -> Result<Image, CoreError>,
    {
        if let Some(hit) = self.variants.lock().get(key) {
            return Ok(hit.clone());
        }
        // 생성은 락 밖에서
        let built = build()?;
        self.variants.lock().put(key.to_string(), built.clone());
        Ok(built)
    }

    fn cached_infallible<F>(&self, key: &str, build: F) -> Image
    where
        F: FnOnce() -> Image,
    {
        if let Some(hit) = self.variants.lock().get(key) {
            return hit.clone();
        }
        let built = build();
        self.variants.lock().put(key.to_string(), built.clone());
        built
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color", &self.data.color())
            .finish()
    }
}

impl AsRef<Image> for Image {
    fn as_ref(&self) -> &Image {
        self
    }
}

impl From<DynamicImage> for Image {
    fn from(data: DynamicImage) -> Self {
        Self::new(data)
    }
}

/// 종횡비 유지 변 길이 (버림, 최소 1)
fn aspect_side(other_src: u32, target: u32, src: u32) -> u32 {
    if src == 0 {
        return 0;
    }
    ((u64::from(other_src) * u64::from(target)) / u64::from(src)).max(1) as u32
}

/// fast_image_resize 바이리니어 리사이즈
///
/// 그레이스케일은 U8, 그 외는 RGBA(U8x4)로 처리한다.
fn resize_dynamic(image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, CoreError> {
    let (src_w, src_h) = (image.width(), image.height());
    if src_w == 0 || src_h == 0 {
        return Err(CoreError::Image("소스 이미지 크기 0".to_string()));
    }

    let (raw, pixel_type) = match image {
        DynamicImage::ImageLuma8(buf) => (buf.as_raw().clone(), PixelType::U8),
        other => (other.to_rgba8().into_raw(), PixelType::U8x4),
    };

    let src_image = FirImage::from_vec_u8(src_w, src_h, raw, pixel_type)
        .map_err(|e| CoreError::Image(format!("소스 이미지 생성 실패: {e}")))?;
    let mut dst_image = FirImage::new(width, height, pixel_type);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| CoreError::Image(format!("리사이즈 실패: {e}")))?;

    let raw_bytes = dst_image.into_vec();
    let result = match pixel_type {
        PixelType::U8 => GrayImage::from_raw(width, height, raw_bytes).map(DynamicImage::ImageLuma8),
        _ => RgbaImage::from_raw(width, height, raw_bytes).map(DynamicImage::ImageRgba8),
    };
    result.ok_or_else(|| CoreError::Image("결과 이미지 생성 실패".to_string()))
}

/// 3x3 침식 후 차분 이진화
///
/// 경계 밖 이웃은 무시한다 (침식 최소값에 영향 없음).
fn edge_threshold(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let src = gray.as_raw();
    let mut out = vec![0u8; src.len()];

    for y in 0..hu {
        let y0 = y.saturating_sub(1);
        let y1 = (y + 1).min(hu - 1);
        for x in 0..wu {
            let x0 = x.saturating_sub(1);
            let x1 = (x + 1).min(wu - 1);

            let mut min = u8::MAX;
            for ny in y0..=y1 {
                let row = &src[ny * wu + x0..=ny * wu + x1];
                if let Some(&m) = row.iter().min() {
                    min = min.min(m);
                }
            }

            let diff = src[y * wu + x] - min;
            out[y * wu + x] = if diff > THRESHOLD_LEVEL { 255 } else { 0 };
        }
    }

    GrayImage::from_raw(w, h, out).unwrap_or_else(|| GrayImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    fn make_rgba(w: u32, h: u32, color: [u8; 4]) -> Image {
        Image::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(color))))
    }

    #[test]
    fn grayscale_is_cached() {
        let image = make_rgba(20, 10, [200, 100, 50, 255]);
        let first = image.grayscale();
        let second = image.grayscale();

        assert!(first.is_grayscale());
        assert!(first.shares_data(&second));
        assert_eq!(image.cached_variant_count(), 1);
    }

    #[test]
    fn grayscale_of_gray_is_self() {
        let gray = Image::from_luma(4, 4, vec![10; 16]).unwrap();
        assert!(gray.grayscale().shares_data(&gray));
        assert_eq!(gray.cached_variant_count(), 0);
    }

    #[test]
    fn clones_share_cache() {
        let image = make_rgba(8, 8, [1, 2, 3, 255]);
        let clone = image.clone();
        let _ = image.grayscale();
        assert_eq!(clone.cached_variant_count(), 1);
    }

    #[test]
    fn resize_preserves_aspect_ratio() {
        let image = make_rgba(200, 100, [0, 0, 0, 255]);
        let resized = image.resize(Some(50), None).unwrap();
        assert_eq!(resized.dimensions(), (50, 25));

        let resized = image.resize(None, Some(10)).unwrap();
        assert_eq!(resized.dimensions(), (20, 10));

        // 같은 요청은 캐시 히트
        let again = image.resize(Some(50), Some(25)).unwrap();
        assert!(again.shares_data(&image.resize(Some(50), None).unwrap()));
    }

    #[test]
    fn scale_floors_with_minimum_one() {
        let image = Image::from_luma(15, 3, vec![0; 45]).unwrap();
        assert_eq!(image.scale(0.5).unwrap().dimensions(), (7, 1));
        assert_eq!(image.scale(0.01).unwrap().dimensions(), (1, 1));
        assert!(image.scale(0.0).is_err());
    }

    #[test]
    fn threshold_marks_edges() {
        // 검은 배경 위 흰 사각형
        let mut buf = GrayImage::from_pixel(10, 10, Luma([0]));
        for y in 3..7 {
            for x in 3..7 {
                buf.put_pixel(x, y, Luma([255]));
            }
        }
        let image = Image::new(DynamicImage::ImageLuma8(buf));
        let edges = image.threshold();
        let edges = edges.data().as_luma8().unwrap();

        // 사각형 테두리는 255, 내부와 배경은 0
        assert_eq!(edges.get_pixel(3, 3)[0], 255);
        assert_eq!(edges.get_pixel(5, 5)[0], 0);
        assert_eq!(edges.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn extract_region_is_clamped() {
        let image = make_rgba(10, 10, [9, 9, 9, 255]);
        let crop = image.extract_region(&Region::new(5, 5, 20, 20)).unwrap();
        assert_eq!(crop.dimensions(), (5, 5));
        assert!(image.extract_region(&Region::new(50, 50, 5, 5)).is_err());
    }

    #[test]
    fn save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        let image = make_rgba(6, 4, [10, 20, 30, 255]);
        image.save(&path).unwrap();

        let loaded = Image::open(&path).unwrap();
        assert_eq!(loaded.dimensions(), (6, 4));
    }

    #[test]
    fn image_mode_from_str() {
        assert_eq!("Threshold".parse::<ImageMode>().unwrap(), ImageMode::Threshold);
        assert_eq!("gray".parse::<ImageMode>().unwrap(), ImageMode::Grayscale);
        assert!("blur".parse::<ImageMode>().is_err());
    }
}
