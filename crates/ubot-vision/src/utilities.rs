//! 스프라이트 제작/디버깅용 이미지 유틸리티.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use ubot_core::error::CoreError;
use ubot_core::models::geometry::Region;

use crate::image::Image;

/// 기본 사각형 색 (빨강)
pub const DEFAULT_RECT_COLOR: [u8; 3] = [255, 0, 0];

/// 같은 크기 이미지들을 겹쳐, 첫 이미지와 파랑/초록 채널이 다른 픽셀을 투명하게 만든다
///
/// 배경이 바뀌는 여러 캡처에서 고정된 스프라이트만 남길 때 사용.
pub fn isolate_sprite(images: &[Image]) -> Result<Image, CoreError> {
    let (first, rest) = images
        .split_first()
        .ok_or_else(|| CoreError::validation("images", "이미지가 하나도 없음"))?;

    let mut result: RgbaImage = first.data().to_rgba8();
    for pixel in result.pixels_mut() {
        pixel[3] = 255;
    }
    let reference = first.data().to_rgba8();

    for (i, image) in rest.iter().enumerate() {
        if image.dimensions() != first.dimensions() {
            return Err(CoreError::validation(
                "images",
                format!(
                    "{}번째 이미지 크기 {:?} ≠ {:?}",
                    i + 2,
                    image.dimensions(),
                    first.dimensions()
                ),
            ));
        }
        let rgba = image.data().to_rgba8();
        for ((out, base), px) in result.pixels_mut().zip(reference.pixels()).zip(rgba.pixels()) {
            // 파랑(2), 초록(1) 채널 비교
            if px[2] != base[2] || px[1] != base[1] {
                out[3] = 0;
            }
        }
    }

    Ok(Image::new(DynamicImage::ImageRgba8(result)))
}

/// 디렉토리(하위 포함)의 모든 PNG로 [`isolate_sprite`] 실행
pub fn isolate_sprite_dir(dir: impl AsRef<Path>) -> Result<Image, CoreError> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    collect_pngs(dir, &mut paths)?;
    paths.sort();

    if paths.is_empty() {
        return Err(CoreError::not_found("PNG", dir.display().to_string()));
    }
    info!("스프라이트 분리: {}개 이미지 ({})", paths.len(), dir.display());

    let images = paths
        .iter()
        .map(Image::open)
        .collect::<Result<Vec<_>, _>>()?;
    isolate_sprite(&images)
}

/// `dir` 아래 `*.png` 경로 재귀 수집
pub fn collect_pngs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CoreError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_pngs(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        {
            debug!("PNG 발견: {}", path.display());
            out.push(path);
        }
    }
    Ok(())
}

/// 두께 2px 사각형을 그린 RGBA 복사본
pub fn draw_rectangle(image: &Image, region: &Region, color: [u8; 3]) -> Image {
    let mut canvas = image.data().to_rgba8();
    let color = Rgba([color[0], color[1], color[2], 255]);

    for inset in 0..2 {
        let (w, h) = (region.width - 2 * inset, region.height - 2 * inset);
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(region.x + inset, region.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(&mut canvas, rect, color);
    }

    Image::new(DynamicImage::ImageRgba8(canvas))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid(w: u32, h: u32, color: [u8; 3]) -> Image {
        Image::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb(color))))
    }

    #[test]
    fn isolate_marks_changed_pixels_transparent() {
        let a = solid(4, 4, [10, 20, 30]);
        let mut b_buf = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        b_buf.put_pixel(1, 1, image::Rgb([10, 99, 30]));
        // 빨강만 다르면 유지
        b_buf.put_pixel(2, 2, image::Rgb([200, 20, 30]));
        let b = Image::new(DynamicImage::ImageRgb8(b_buf));

        let isolated = isolate_sprite(&[a, b]).unwrap();
        let rgba = isolated.data().as_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(1, 1)[3], 0);
        assert_eq!(rgba.get_pixel(2, 2)[3], 255);
        assert_eq!(rgba.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn isolate_rejects_mismatched_sizes() {
        let result = isolate_sprite(&[solid(4, 4, [0, 0, 0]), solid(5, 4, [0, 0, 0])]);
        assert!(matches!(result, Err(CoreError::Validation { .. })));
        assert!(isolate_sprite(&[]).is_err());
    }

    #[test]
    fn isolate_dir_walks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        solid(3, 3, [1, 2, 3]).save(dir.path().join("a.png")).unwrap();
        solid(3, 3, [1, 9, 3]).save(dir.path().join("nested/b.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let isolated = isolate_sprite_dir(dir.path()).unwrap();
        let rgba = isolated.data().as_rgba8().unwrap();
        assert!(rgba.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn draw_rectangle_outlines_region() {
        let image = solid(20, 20, [0, 0, 0]);
        let drawn = draw_rectangle(&image, &Region::new(5, 5, 10, 10), DEFAULT_RECT_COLOR);
        let rgba = drawn.data().as_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(5, 5).0, [255, 0, 0, 255]);
        assert_eq!(rgba.get_pixel(6, 6).0, [255, 0, 0, 255]);
        assert_eq!(rgba.get_pixel(10, 10).0, [0, 0, 0, 255]);
        // 원본은 그대로
        assert!(image.data().as_rgb8().is_some());
    }
}
