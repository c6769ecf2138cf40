//! 설정 파일 관리.
//!
//! 기본값 → 설정 파일(INI/TOML/JSON) → 환경변수(`UBOT__SECTION__KEY`) 순으로
//! `config` crate 레이어를 쌓아 [`AppConfig`]를 만든다.

use crate::config::AppConfig;
use crate::error::CoreError;
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 설정 파일 이름
const CONFIG_FILE_NAME: &str = "config.ini";

/// 앱 디렉토리 이름
const APP_DIR_NAME: &str = "ubot";

/// 환경변수 접두사 (`UBOT__EMULATOR__PORT=5555`)
const ENV_PREFIX: &str = "UBOT";

/// 설정 관리자
///
/// 로드된 설정을 보관하고, 같은 경로에서 다시 로드할 수 있다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 현재 설정 (스레드 안전)
    config: Arc<RwLock<AppConfig>>,
    /// 설정 파일 경로
    config_path: PathBuf,
}

impl ConfigManager {
    /// 플랫폼별 기본 경로에서 설정 로드
    pub fn new() -> Result<Self, CoreError> {
        Self::load(Self::default_config_path()?)
    }

    /// 지정된 경로에서 설정 로드
    ///
    /// 파일이 없으면 기본값과 환경변수만 사용한다.
    pub fn load(config_path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let config_path = config_path.into();
        let config = Self::load_from_file(&config_path)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// 현재 설정 반환 (복제본)
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// 설정 파일 경로 반환
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 설정 다시 로드
    pub fn reload(&self) -> Result<(), CoreError> {
        let config = Self::load_from_file(&self.config_path)?;
        *self.config.write() = config;
        info!("설정 다시 로드 완료");
        Ok(())
    }

    /// 플랫폼별 기본 설정 파일 경로
    pub fn default_config_path() -> Result<PathBuf, CoreError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// 플랫폼별 설정 디렉토리 경로
    pub fn config_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// 데이터 디렉토리 경로 (캡처 프레임 등)
    pub fn data_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    fn project_dirs() -> Result<ProjectDirs, CoreError> {
        ProjectDirs::from("", "", APP_DIR_NAME)
            .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
    }

    /// 확장자로 파일 포맷 판별
    fn file_format(path: &Path) -> Result<FileFormat, CoreError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "ini" => Ok(FileFormat::Ini),
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            other => Err(CoreError::Config(format!(
                "지원하지 않는 설정 파일 형식: '{other}' ({})",
                path.display()
            ))),
        }
    }

    /// 레이어 병합 후 역직렬화 + 검증
    fn load_from_file(path: &Path) -> Result<AppConfig, CoreError> {
        let format = Self::file_format(path)?;

        let config: AppConfig = Config::builder()
            .add_source(File::from(path).format(format).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                CoreError::Config(format!("설정 파일 파싱 실패: {}: {}", path.display(), e))
            })?;

        config.validate()?;

        if path.exists() {
            debug!("설정 파일 로드 완료: {}", path.display());
        } else {
            debug!("설정 파일 없음, 기본값 사용: {}", path.display());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateChannel;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let manager = ConfigManager::load(&config_path).unwrap();
        assert_eq!(manager.get().emulator.screen_size, "1280x720");
        assert_eq!(manager.config_path(), config_path.as_path());
    }

    #[test]
    fn load_ini_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ldplayer.ini");
        fs::write(
            &config_path,
            "[Emulator]\n\
             Host = 192.168.0.5\n\
             Serial = emulator-5554\n\
             ScreenSize = 1600x900\n\
             SharedFolders = /sdcard/shared, /tmp/shared\n\
             \n\
             [Updates]\n\
             Enabled = false\n\
             Channel = Development\n",
        )
        .unwrap();

        let config = ConfigManager::load(&config_path).unwrap().get();
        assert_eq!(config.emulator.host, "192.168.0.5");
        assert_eq!(config.emulator.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(config.emulator.screen_dimensions().unwrap(), (1600, 900));
        let folders = config.emulator.shared_folders().unwrap().unwrap();
        assert_eq!(folders.device_dir, "/sdcard/shared");
        assert_eq!(folders.host_dir, "/tmp/shared");
        assert!(!config.updates.enabled);
        assert_eq!(config.updates.channel, UpdateChannel::Development);
    }

    #[test]
    fn load_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[frame_buffer]\ncapacity = 8\n\n[grabber]\nfps = 15\n",
        )
        .unwrap();

        let config = ConfigManager::load(&config_path).unwrap().get();
        assert_eq!(config.frame_buffer.capacity, 8);
        assert_eq!(config.grabber.fps, 15);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"frame_buffer": {"capacity": 0}}"#).unwrap();

        let result = ConfigManager::load(&config_path);
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn unknown_extension_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::load(temp_dir.path().join("config.xml"));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn reload_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, r#"{"grabber": {"fps": 10}}"#).unwrap();

        let manager = ConfigManager::load(&config_path).unwrap();
        assert_eq!(manager.get().grabber.fps, 10);

        // 파일 직접 수정
        fs::write(&config_path, r#"{"grabber": {"fps": 60}}"#).unwrap();
        manager.reload().unwrap();
        assert_eq!(manager.get().grabber.fps, 60);
    }
}
