//! 정규화 상호상관(TM_CCOEFF_NORMED) 템플릿 매칭.
//!
//! 창(window) 합/제곱합은 채널별 적분 영상으로 O(1)에 구하고,
//! 교차항 `Σ T·I`만 정수 내적으로 직접 계산한다. 출력 행 단위로 rayon 병렬 처리.
//!
//! 점수 = `(n·ΣTI − Σ_c ΣT_c·ΣI_c) / sqrt(varT · varI)` (n 배율 정수 연산).
//! 분산이 0인 창이나 템플릿은 0점.

use image::DynamicImage;
use rayon::prelude::*;
use std::borrow::Cow;
use ubot_core::error::CoreError;

use crate::image::Image;

/// 점수 평면 — 크기 `(W−w+1) × (H−h+1)`, 행 우선
#[derive(Debug, Clone)]
pub struct ScoreMap {
    width: u32,
    height: u32,
    scores: Vec<f32>,
}

impl ScoreMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (x, y) 위치 점수
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.scores
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// 전역 최대 (동점이면 행 우선 첫 위치)
    pub fn max(&self) -> Option<(u32, u32, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in self.scores.iter().enumerate() {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        best.map(|(i, score)| self.position(i, score))
    }

    /// `score >= threshold`인 모든 위치 (행 우선)
    pub fn above(&self, threshold: f32) -> Vec<(u32, u32, f32)> {
        self.scores
            .iter()
            .enumerate()
            .filter(|(_, &s)| s >= threshold)
            .map(|(i, &s)| self.position(i, s))
            .collect()
    }

    fn position(&self, index: usize, score: f32) -> (u32, u32, f32) {
        let w = self.width as usize;
        ((index % w) as u32, (index / w) as u32, score)
    }
}

/// 두 이미지를 같은 채널 레이아웃으로 펼친 원시 버퍼
///
/// 한쪽이라도 그레이스케일이면 둘 다 그레이스케일, 아니면 RGB.
fn common_layout<'a>(image: &'a DynamicImage, template: &'a DynamicImage) -> (Cow<'a, [u8]>, Cow<'a, [u8]>, usize) {
    let luma = matches!(image, DynamicImage::ImageLuma8(_))
        || matches!(template, DynamicImage::ImageLuma8(_));

    if luma {
        (luma_raw(image), luma_raw(template), 1)
    } else {
        (rgb_raw(image), rgb_raw(template), 3)
    }
}

fn luma_raw(image: &DynamicImage) -> Cow<'_, [u8]> {
    match image {
        DynamicImage::ImageLuma8(buf) => Cow::Borrowed(buf.as_raw().as_slice()),
        other => Cow::Owned(other.to_luma8().into_raw()),
    }
}

fn rgb_raw(image: &DynamicImage) -> Cow<'_, [u8]> {
    match image {
        DynamicImage::ImageRgb8(buf) => Cow::Borrowed(buf.as_raw().as_slice()),
        other => Cow::Owned(other.to_rgb8().into_raw()),
    }
}

/// 채널별 (합, 제곱합) 적분 영상
struct Integral {
    stride: usize,
    channels: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl Integral {
    fn new(raw: &[u8], width: usize, height: usize, channels: usize) -> Self {
        let stride = width + 1;
        let len = stride * (height + 1) * channels;
        let mut sum = vec![0u64; len];
        let mut sq = vec![0u64; len];

        for y in 0..height {
            let mut row_sum = vec![0u64; channels];
            let mut row_sq = vec![0u64; channels];
            for x in 0..width {
                let px = (y * width + x) * channels;
                let below = ((y + 1) * stride + x + 1) * channels;
                let above = (y * stride + x + 1) * channels;
                for c in 0..channels {
                    let v = u64::from(raw[px + c]);
                    row_sum[c] += v;
                    row_sq[c] += v * v;
                    sum[below + c] = sum[above + c] + row_sum[c];
                    sq[below + c] = sq[above + c] + row_sq[c];
                }
            }
        }

        Self {
            stride,
            channels,
            sum,
            sq,
        }
    }

    /// (x, y)부터 w×h 사각형의 채널 c 합/제곱합
    #[inline]
    fn rect(&self, x: usize, y: usize, w: usize, h: usize, c: usize) -> (u64, u64) {
        let idx = |xx: usize, yy: usize| (yy * self.stride + xx) * self.channels + c;
        let (a, b, d, e) = (idx(x, y), idx(x + w, y), idx(x, y + h), idx(x + w, y + h));
        (
            self.sum[e] + self.sum[a] - self.sum[b] - self.sum[d],
            self.sq[e] + self.sq[a] - self.sq[b] - self.sq[d],
        )
    }
}

/// 템플릿 매칭 (TM_CCOEFF_NORMED)
///
/// 템플릿이 이미지보다 크거나 비어 있으면 `CoreError::Validation`.
pub fn match_template(image: &Image, template: &Image) -> Result<ScoreMap, CoreError> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();

    if tw == 0 || th == 0 || iw == 0 || ih == 0 {
        return Err(CoreError::validation("template", "빈 이미지"));
    }
    if tw > iw || th > ih {
        return Err(CoreError::validation(
            "template",
            format!("템플릿 {tw}x{th}가 이미지 {iw}x{ih}보다 큼"),
        ));
    }

    let (img_raw, tpl_raw, channels) = common_layout(image.data(), template.data());
    let (iw, ih, tw, th) = (iw as usize, ih as usize, tw as usize, th as usize);
    let n = (tw * th) as i128;

    // 템플릿 통계 (채널별 합, n 배율 분산 합)
    let mut t_sum = vec![0i128; channels];
    let mut t_sq = 0i128;
    for (i, &v) in tpl_raw.iter().enumerate() {
        let v = i128::from(v);
        t_sum[i % channels] += v;
        t_sq += v * v;
    }
    let t_var = n * t_sq - t_sum.iter().map(|s| s * s).sum::<i128>();

    let out_w = iw - tw + 1;
    let out_h = ih - th + 1;
    let mut scores = vec![0f32; out_w * out_h];

    if t_var <= 0 {
        // 단색 템플릿: 모든 위치 0점
        return Ok(ScoreMap {
            width: out_w as u32,
            height: out_h as u32,
            scores,
        });
    }

    let integral = Integral::new(&img_raw, iw, ih, channels);
    let row_len = tw * channels;
    let t_var_f = t_var as f64;

    scores
        .par_chunks_mut(out_w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut i_sq = 0i128;
                let mut cross_means = 0i128;
                let mut i_sum_sq = 0i128;
                for (c, &ts) in t_sum.iter().enumerate() {
                    let (s, q) = integral.rect(x, y, tw, th, c);
                    let s = i128::from(s);
                    i_sq += i128::from(q);
                    i_sum_sq += s * s;
                    cross_means += ts * s;
                }
                let i_var = n * i_sq - i_sum_sq;
                if i_var <= 0 {
                    *out = 0.0;
                    continue;
                }

                let mut dot = 0u64;
                for ty in 0..th {
                    let start = ((y + ty) * iw + x) * channels;
                    let window = &img_raw[start..start + row_len];
                    let tpl = &tpl_raw[ty * row_len..(ty + 1) * row_len];
                    dot += window
                        .iter()
                        .zip(tpl)
                        .map(|(&a, &b)| u32::from(a) * u32::from(b))
                        .map(u64::from)
                        .sum::<u64>();
                }

                let numerator = n * i128::from(dot) - cross_means;
                let denom = (t_var_f * i_var as f64).sqrt();
                *out = if denom > 0.0 {
                    (numerator as f64 / denom).clamp(-1.0, 1.0) as f32
                } else {
                    0.0
                };
            }
        });

    Ok(ScoreMap {
        width: out_w as u32,
        height: out_h as u32,
        scores,
    })
}
