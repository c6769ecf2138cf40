//! 스프라이트 — 이름이 붙은 참조 이미지.

use std::path::Path;
use ubot_core::error::CoreError;

use crate::image::Image;

/// 프레임에서 찾을 이름 붙은 템플릿
#[derive(Debug, Clone)]
pub struct Sprite {
    name: String,
    image: Image,
}

impl Sprite {
    pub fn new(name: impl Into<String>, image: Image) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// 파일에서 로드. 이름 미지정 시 파일 이름
    pub fn from_path(path: impl AsRef<Path>, name: Option<&str>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let name = match name {
            Some(n) => n.to_string(),
            None => path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };
        Ok(Self::new(name, Image::open(path)?))
    }

    /// 인코딩된 버퍼에서 로드
    pub fn from_buffer(bytes: &[u8], name: impl Into<String>) -> Result<Self, CoreError> {
        Ok(Self::new(name, Image::from_bytes(bytes)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 리사이즈된 새 스프라이트 (기본 이름 `{name}-resized`)
    pub fn resized(
        &self,
        new_name: Option<&str>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<Sprite, CoreError> {
        let name = new_name.map_or_else(|| format!("{}-resized", self.name), str::to_string);
        Ok(Sprite::new(name, self.image.resize(width, height)?))
    }

    /// 픽셀을 복사한 독립 스프라이트 (기본 이름 `{name}-copy`)
    pub fn copy(&self, new_name: Option<&str>) -> Sprite {
        let name = new_name.map_or_else(|| format!("{}-copy", self.name), str::to_string);
        Sprite::new(name, Image::new(self.image.data().clone()))
    }
}

impl AsRef<Image> for Sprite {
    fn as_ref(&self) -> &Image {
        &self.image
    }
}
