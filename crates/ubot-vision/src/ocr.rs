//! 숫자 OCR.
//!
//! 3배 업스케일 → Otsu 이진화 → 외곽 윤곽선(좌→우) → 글자별 폰트 NCC 최댓값.
//! `fonts[i]`가 숫자 `i`의 템플릿이다.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use tracing::debug;
use ubot_core::error::CoreError;

use crate::image::Image;
use crate::matching::match_template;

/// 업스케일 배율
const UPSCALE: u32 = 3;

/// 패딩 목표 크기 (폰트 템플릿 기준)
const GLYPH_WIDTH: u32 = 50;
const GLYPH_HEIGHT: u32 = 94;
const GLYPH_MARGIN: u32 = 5;

/// 글자 경계 상자
#[derive(Debug, Clone, Copy)]
struct GlyphBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// 이미지 속 숫자 인식
///
/// 윤곽선이 없으면 `None`, `max_digits`보다 많으면 `Some(0)`.
pub fn detect_numbers(image: &Image, fonts: &[Image], max_digits: usize) -> Result<Option<u64>, CoreError> {
    if fonts.is_empty() {
        return Err(CoreError::validation("fonts", "숫자 폰트가 비어 있음"));
    }

    let gray = image.data().to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Ok(None);
    }
    let upscaled = imageops::resize(&gray, w * UPSCALE, h * UPSCALE, FilterType::CatmullRom);
    let binary = binarize(&upscaled, otsu_level(&upscaled));

    let mut glyphs: Vec<GlyphBox> = find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| bounding_box(&c.points))
        .collect();
    glyphs.sort_by_key(|g| g.x);

    if glyphs.is_empty() {
        return Ok(None);
    }
    if glyphs.len() > max_digits {
        debug!("윤곽선 {}개 > 최대 {max_digits}자리", glyphs.len());
        return Ok(Some(0));
    }

    let mut value: u64 = 0;
    for glyph in &glyphs {
        let padded = Image::new(DynamicImage::ImageLuma8(pad_glyph(&binary, glyph)));
        let digit = best_font(&padded, fonts)?;
        value = value.saturating_mul(10).saturating_add(digit as u64);
    }

    debug!("숫자 인식: {value} ({}자리)", glyphs.len());
    Ok(Some(value))
}

fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    out
}

fn bounding_box(points: &[imageproc::point::Point<i32>]) -> Option<GlyphBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(GlyphBox {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// 글자 영역을 잘라 폰트 크기 근처까지 검은 여백으로 감싼다
fn pad_glyph(binary: &GrayImage, glyph: &GlyphBox) -> GrayImage {
    let roi = imageops::crop_imm(binary, glyph.x, glyph.y, glyph.width, glyph.height).to_image();
    let pad_x = (glyph.width.abs_diff(GLYPH_WIDTH) + 1) / 2 + GLYPH_MARGIN;
    let pad_y = (glyph.height.abs_diff(GLYPH_HEIGHT) + 1) / 2 + GLYPH_MARGIN;

    let mut canvas = GrayImage::from_pixel(glyph.width + 2 * pad_x, glyph.height + 2 * pad_y, Luma([0]));
    imageops::replace(&mut canvas, &roi, i64::from(pad_x), i64::from(pad_y));
    canvas
}

/// 최고 점수 폰트 인덱스 (동점이면 앞 인덱스)
fn best_font(glyph: &Image, fonts: &[Image]) -> Result<usize, CoreError> {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (digit, font) in fonts.iter().enumerate() {
        let (gw, gh) = glyph.dimensions();
        let (fw, fh) = font.dimensions();
        let font = font.grayscale();

        let map = if fw <= gw && fh <= gh {
            match_template(glyph, &font)?
        } else if gw <= fw && gh <= fh {
            match_template(&font, glyph)?
        } else {
            continue;
        };

        if let Some((_, _, score)) = map.max() {
            if score > best.1 {
                best = (digit, score);
            }
        }
    }
    Ok(best.0)
}
