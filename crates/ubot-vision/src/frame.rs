//! 캡처 프레임.
//!
//! 생성 시 한 번만 직전 프레임과의 유사도를 계산하며, 직전 프레임은 보관하지 않는다.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::image::Image;
use crate::matching::match_template;

/// 프로세스 전역 캡처 순번
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// 불변 캡처 프레임
#[derive(Debug, Clone)]
pub struct Frame {
    image: Image,
    sequence: u64,
    timestamp: DateTime<Utc>,
    similarity: Option<f32>,
}

impl Frame {
    /// 새 프레임 생성 (직전 프레임 대비 유사도 계산)
    pub fn new(image: Image, previous: Option<&Frame>) -> Self {
        let similarity = previous.and_then(|prev| similarity(&image, &prev.image));
        Self::with_similarity(image, similarity)
    }

    /// 유사도를 직접 지정해 생성
    pub fn with_similarity(image: Image, similarity: Option<f32>) -> Self {
        Self {
            image,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            similarity,
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// 단조 증가 캡처 순번
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 직전 프레임 대비 유사도 [0, 1]
    pub fn similarity(&self) -> Option<f32> {
        self.similarity
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl AsRef<Image> for Frame {
    fn as_ref(&self) -> &Image {
        &self.image
    }
}

/// 직전 프레임을 템플릿으로 한 최대 NCC 점수. 음의 상관은 0으로 자름
///
/// 직전 프레임이 더 크면 `None`.
fn similarity(current: &Image, previous: &Image) -> Option<f32> {
    let (cw, ch) = current.dimensions();
    let (pw, ph) = previous.dimensions();
    if pw > cw || ph > ch {
        return None;
    }

    match match_template(&current.grayscale(), &previous.grayscale()) {
        Ok(map) => map.max().map(|(_, _, score)| score.clamp(0.0, 1.0)),
        Err(e) => {
            debug!("프레임 유사도 계산 실패: {e}");
            None
        }
    }
}
