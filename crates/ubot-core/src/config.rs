//! 애플리케이션 설정 구조체.
//!
//! 에뮬레이터 연결, 프레임 버퍼/그래버, 스프라이트 탐색, 업데이트 채널 설정을 정의한다.
//! `config` crate를 통해 INI/TOML/JSON 파일과 환경변수에서 로드 (see [`crate::config_manager`]).
//!
//! INI 파일의 `[Emulator] Host=...` 표기를 그대로 받을 수 있도록 필드마다 alias를 둔다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 에뮬레이터(ADB) 연결 설정
    #[serde(default, alias = "Emulator")]
    pub emulator: EmulatorConfig,
    /// 프레임 버퍼 설정
    #[serde(default, alias = "FrameBuffer", alias = "framebuffer")]
    pub frame_buffer: FrameBufferConfig,
    /// 프레임 그래버 설정
    #[serde(default, alias = "Grabber")]
    pub grabber: GrabberConfig,
    /// 스프라이트 탐색 설정
    #[serde(default, alias = "Locator")]
    pub locator: LocatorConfig,
    /// 업데이트 설정
    #[serde(default, alias = "Updates")]
    pub updates: UpdatesConfig,
}

// ============================================================
// 에뮬레이터 설정
// ============================================================

/// 에뮬레이터 연결 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// ADB 서버 호스트
    #[serde(default = "default_host", alias = "Host")]
    pub host: String,
    /// ADB 서버 포트
    #[serde(default = "default_port", alias = "Port")]
    pub port: u16,
    /// 디바이스 시리얼 (여러 대 연결 시 필수)
    #[serde(default, alias = "Serial")]
    pub serial: Option<String>,
    /// 화면 크기 ("1280x720")
    #[serde(default = "default_screen_size", alias = "ScreenSize", alias = "screensize")]
    pub screen_size: String,
    /// 공유 폴더 ("device_dir, host_dir"). 지정 시 공유 폴더 캡처 모드
    #[serde(default, alias = "SharedFolders", alias = "sharedfolders")]
    pub shared_folders: Option<String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            serial: None,
            screen_size: default_screen_size(),
            shared_folders: None,
        }
    }
}

/// 디바이스/호스트 공유 폴더 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFolders {
    /// 디바이스 측 경로 (screencap 덤프 위치)
    pub device_dir: String,
    /// 호스트 측 경로 (같은 폴더의 마운트 지점)
    pub host_dir: String,
}

impl EmulatorConfig {
    /// `screen_size` 파싱 → (너비, 높이)
    pub fn screen_dimensions(&self) -> Result<(u32, u32), CoreError> {
        let invalid = || {
            CoreError::validation(
                "emulator.screen_size",
                format!("'{}' 형식 오류 (예: 1280x720)", self.screen_size),
            )
        };

        let (w, h) = self
            .screen_size
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok((width, height))
    }

    /// `shared_folders` 파싱. 미설정 또는 빈 문자열이면 `None`
    pub fn shared_folders(&self) -> Result<Option<SharedFolders>, CoreError> {
        let Some(raw) = self.shared_folders.as_deref() else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [device, host] if !device.is_empty() && !host.is_empty() => Ok(Some(SharedFolders {
                device_dir: device.trim_end_matches('/').to_string(),
                host_dir: host.trim_end_matches(['/', '\\']).to_string(),
            })),
            _ => Err(CoreError::validation(
                "emulator.shared_folders",
                format!("'{raw}' — \"device_dir, host_dir\" 형식이어야 함"),
            )),
        }
    }
}

// ============================================================
// 프레임 파이프라인 설정
// ============================================================

/// 프레임 버퍼 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameBufferConfig {
    /// 보관할 최대 프레임 수
    #[serde(default = "default_buffer_capacity", alias = "Capacity")]
    pub capacity: usize,
}

impl Default for FrameBufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
        }
    }
}

/// 프레임 그래버 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrabberConfig {
    /// 목표 캡처 FPS
    #[serde(default = "default_fps", alias = "Fps", alias = "FPS")]
    pub fps: u32,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

// ============================================================
// 스프라이트 탐색 설정
// ============================================================

/// 스프라이트 탐색 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// `tap_sprite` 기본 유사도 임계값
    #[serde(
        default = "default_similarity",
        alias = "DefaultSimilarity",
        alias = "defaultsimilarity"
    )]
    pub default_similarity: f32,
    /// best-match 모드 중복 제거 거리 (px)
    #[serde(
        default = "default_best_match_dedup_px",
        alias = "BestMatchDedupPx",
        alias = "bestmatchdeduppx"
    )]
    pub best_match_dedup_px: f64,
    /// 전체 탐색 모드 중복 제거 거리 (px)
    #[serde(
        default = "default_scan_dedup_px",
        alias = "ScanDedupPx",
        alias = "scandeduppx"
    )]
    pub scan_dedup_px: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            default_similarity: default_similarity(),
            best_match_dedup_px: default_best_match_dedup_px(),
            scan_dedup_px: default_scan_dedup_px(),
        }
    }
}

// ============================================================
// 업데이트 설정
// ============================================================

/// 업데이트 채널
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateChannel {
    /// 정식 릴리즈
    #[default]
    #[serde(alias = "release")]
    Release,
    /// 개발 빌드
    #[serde(alias = "development")]
    Development,
}

/// 업데이트 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatesConfig {
    /// 업데이트 확인 활성화
    #[serde(default = "default_true", alias = "Enabled")]
    pub enabled: bool,
    /// 업데이트 채널
    #[serde(default, alias = "Channel")]
    pub channel: UpdateChannel,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: UpdateChannel::Release,
        }
    }
}

// ============================================================
// AppConfig impl
// ============================================================

impl AppConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self {
            emulator: EmulatorConfig::default(),
            frame_buffer: FrameBufferConfig::default(),
            grabber: GrabberConfig::default(),
            locator: LocatorConfig::default(),
            updates: UpdatesConfig::default(),
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.emulator.host.trim().is_empty() {
            return Err(CoreError::validation("emulator.host", "비어 있을 수 없음"));
        }
        if self.emulator.port == 0 {
            return Err(CoreError::validation("emulator.port", "0은 허용되지 않음"));
        }
        self.emulator.screen_dimensions()?;
        self.emulator.shared_folders()?;

        if self.frame_buffer.capacity == 0 {
            return Err(CoreError::validation(
                "frame_buffer.capacity",
                "1 이상이어야 함",
            ));
        }
        if self.grabber.fps == 0 {
            return Err(CoreError::validation("grabber.fps", "1 이상이어야 함"));
        }
        if !(-1.0..=1.0).contains(&self.locator.default_similarity) {
            return Err(CoreError::validation(
                "locator.default_similarity",
                format!("{} — [-1, 1] 범위여야 함", self.locator.default_similarity),
            ));
        }
        if self.locator.best_match_dedup_px < 0.0 || self.locator.scan_dedup_px < 0.0 {
            return Err(CoreError::validation(
                "locator.*_dedup_px",
                "음수일 수 없음",
            ));
        }
        Ok(())
    }

    /// 그래버 프레임 간격 (1 / fps)
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.grabber.fps.max(1)))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5037
}
fn default_screen_size() -> String {
    "1280x720".to_string()
}
fn default_buffer_capacity() -> usize {
    5
}
fn default_fps() -> u32 {
    30
}
fn default_similarity() -> f32 {
    0.8
}
fn default_best_match_dedup_px() -> f64 {
    10.0
}
fn default_scan_dedup_px() -> f64 {
    40.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.emulator.screen_dimensions().unwrap(), (1280, 720));
        assert_eq!(config.updates.channel, UpdateChannel::Release);
    }

    #[test]
    fn frame_interval_from_fps() {
        let mut config = AppConfig::default_config();
        config.grabber.fps = 20;
        assert_eq!(config.frame_interval(), Duration::from_millis(50));
    }

    #[test]
    fn shared_folders_parsing() {
        let mut emulator = EmulatorConfig::default();
        assert_eq!(emulator.shared_folders().unwrap(), None);

        emulator.shared_folders = Some("/sdcard/Pictures/, /home/me/shared".to_string());
        let folders = emulator.shared_folders().unwrap().unwrap();
        assert_eq!(folders.device_dir, "/sdcard/Pictures");
        assert_eq!(folders.host_dir, "/home/me/shared");

        emulator.shared_folders = Some("only-one".to_string());
        assert!(emulator.shared_folders().is_err());
    }

    #[test]
    fn invalid_screen_size_rejected() {
        let mut config = AppConfig::default_config();
        config.emulator.screen_size = "1280*720".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Validation { ref field, .. }) if field == "emulator.screen_size"
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = AppConfig::default_config();
        config.frame_buffer.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserialize_with_ini_spelling() {
        let json = r#"{
            "Emulator": { "Host": "10.0.0.2", "Port": 5555, "ScreenSize": "1920x1080" },
            "Updates": { "Enabled": false, "Channel": "Development" }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.emulator.host, "10.0.0.2");
        assert_eq!(config.emulator.port, 5555);
        assert_eq!(config.emulator.screen_dimensions().unwrap(), (1920, 1080));
        assert!(!config.updates.enabled);
        assert_eq!(config.updates.channel, UpdateChannel::Development);
        // 누락 섹션은 기본값
        assert_eq!(config.frame_buffer.capacity, 5);
    }
}
