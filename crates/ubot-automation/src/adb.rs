//! ADB 어댑터.
//!
//! `adb` CLI를 `-H host -P port [-s serial]`로 호출해 [`ScreenCapturer`]와
//! [`InputController`] 포트를 구현한다.

use parking_lot::Mutex;
use std::process::{Command, Output};
use tracing::{debug, info, warn};
use ubot_core::config::EmulatorConfig;
use ubot_core::error::CoreError;
use ubot_core::ports::capture::ScreenCapturer;
use ubot_core::ports::input::InputController;

/// adb 실행 파일
const ADB_COMMAND: &str = "adb";

/// 서버 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Closed,
    Opened,
}

#[derive(Debug)]
struct Session {
    state: ServerState,
    device: Option<String>,
}

/// ADB 클라이언트
#[derive(Debug)]
pub struct AdbClient {
    host: String,
    port: u16,
    serial: Option<String>,
    session: Mutex<Session>,
}

impl AdbClient {
    pub fn new(host: impl Into<String>, port: u16, serial: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            serial: serial.filter(|s| !s.trim().is_empty()),
            session: Mutex::new(Session {
                state: ServerState::Closed,
                device: None,
            }),
        }
    }

    pub fn from_config(config: &EmulatorConfig) -> Self {
        Self::new(config.host.clone(), config.port, config.serial.clone())
    }

    pub fn state(&self) -> ServerState {
        self.session.lock().state
    }

    /// 선택된 디바이스 시리얼
    pub fn device(&self) -> Option<String> {
        self.session.lock().device.clone()
    }

    /// 서버 재시작 후 디바이스 선택
    ///
    /// 시리얼 미지정 시 유일한 디바이스를 고른다. 0대면 `DeviceNotFound`,
    /// 여러 대면 `DeviceNotProvided`. 실패하면 서버를 다시 내린다.
    pub fn start_server(&self) -> Result<(), CoreError> {
        match self.try_start_server() {
            Ok(device) => {
                let mut session = self.session.lock();
                session.state = ServerState::Opened;
                session.device = Some(device.clone());
                info!(device = %device, "ADB 서버 시작");
                Ok(())
            }
            Err(e) => {
                if let Err(kill) = self.run(&["kill-server"], None) {
                    debug!("ADB 서버 종료 실패: {kill}");
                }
                let mut session = self.session.lock();
                session.state = ServerState::Closed;
                session.device = None;
                warn!("ADB 서버 시작 실패: {e}");
                Err(e)
            }
        }
    }

    fn try_start_server(&self) -> Result<String, CoreError> {
        if let Err(e) = self.run(&["kill-server"], None) {
            debug!("기존 ADB 서버 없음: {e}");
        }
        self.run(&["start-server"], None)?;

        let output = self.run(&["devices"], None)?;
        let devices = parse_devices(&String::from_utf8_lossy(&output.stdout));
        debug!(?devices, "ADB 디바이스 목록");

        select_device(&devices, self.serial.as_deref())
    }

    /// 서버 종료
    pub fn stop_server(&self) -> Result<(), CoreError> {
        let result = self.run(&["kill-server"], None).map(|_| ());
        let mut session = self.session.lock();
        session.state = ServerState::Closed;
        session.device = None;
        info!("ADB 서버 종료");
        result
    }

    /// `adb exec-out <command>` — 바이너리 stdout 반환
    pub fn exec_out(&self, command: &str) -> Result<Vec<u8>, CoreError> {
        let device = self.opened_device()?;
        let mut args = vec!["exec-out"];
        args.extend(command.split_whitespace());
        Ok(self.run(&args, Some(&device))?.stdout)
    }

    /// `adb shell <command>` — 텍스트 stdout 반환
    pub fn shell(&self, command: &str) -> Result<String, CoreError> {
        let device = self.opened_device()?;
        let output = self.run(&["shell", command], Some(&device))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn opened_device(&self) -> Result<String, CoreError> {
        let session = self.session.lock();
        match (&session.state, &session.device) {
            (ServerState::Opened, Some(device)) => Ok(device.clone()),
            _ => Err(CoreError::Device("ADB 서버가 시작되지 않음".to_string())),
        }
    }

    /// 공통 인자 (`-H host -P port [-s serial]`)
    fn base_args(&self, device: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "-H".to_string(),
            self.host.clone(),
            "-P".to_string(),
            self.port.to_string(),
        ];
        if let Some(device) = device {
            args.push("-s".to_string());
            args.push(device.to_string());
        }
        args
    }

    fn run(&self, args: &[&str], device: Option<&str>) -> Result<Output, CoreError> {
        let output = Command::new(ADB_COMMAND)
            .args(self.base_args(device))
            .args(args)
            .output()
            .map_err(|e| CoreError::Device(format!("adb 실행 실패: {e}")))?;

        if !output.status.success() {
            return Err(CoreError::Device(format!(
                "adb {} 실패 ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }
}

impl ScreenCapturer for AdbClient {
    fn screencap(&self) -> Result<Vec<u8>, CoreError> {
        self.exec_out("screencap -p")
            .map_err(|e| CoreError::Capture(format!("screencap 실패: {e}")))
    }

    fn screensize(&self) -> Result<(u32, u32), CoreError> {
        let output = AdbClient::shell(self, "wm size")?;
        parse_wm_size(&output)
    }

    fn shell(&self, command: &str) -> Result<String, CoreError> {
        AdbClient::shell(self, command)
    }
}

impl InputController for AdbClient {
    fn tap(&self, x: i32, y: i32) -> Result<(), CoreError> {
        debug!(x, y, "탭");
        self.input(&format!("tap {x} {y}"))
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> Result<(), CoreError> {
        debug!(x1, y1, x2, y2, duration_ms, "스와이프");
        self.input(&format!("swipe {x1} {y1} {x2} {y2} {duration_ms}"))
    }

    fn text(&self, text: &str) -> Result<(), CoreError> {
        debug!(text_len = text.len(), "텍스트 입력");
        self.input(&format!("text {}", escape_text(text)))
    }

    fn key_event(&self, code: u32, longpress: bool) -> Result<(), CoreError> {
        debug!(code, longpress, "키 이벤트");
        if longpress {
            self.input(&format!("keyevent --longpress {code}"))
        } else {
            self.input(&format!("keyevent {code}"))
        }
    }

    fn platform(&self) -> &str {
        "android"
    }
}

impl AdbClient {
    fn input(&self, command: &str) -> Result<(), CoreError> {
        AdbClient::shell(self, &format!("input {command}"))
            .map(|_| ())
            .map_err(|e| CoreError::Input(e.to_string()))
    }
}

// ============================================================
// 파서
// ============================================================

/// `adb devices` 출력에서 `device` 상태인 시리얼만 추출
pub fn parse_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// 디바이스 선택 규칙
fn select_device(devices: &[String], serial: Option<&str>) -> Result<String, CoreError> {
    match serial {
        Some(serial) => devices
            .iter()
            .find(|d| d.as_str() == serial)
            .cloned()
            .ok_or(CoreError::DeviceNotFound),
        None => match devices {
            [] => Err(CoreError::DeviceNotFound),
            [only] => Ok(only.clone()),
            _ => Err(CoreError::DeviceNotProvided),
        },
    }
}

/// `wm size` 출력 파싱 (Override 우선)
pub fn parse_wm_size(output: &str) -> Result<(u32, u32), CoreError> {
    let mut physical = None;
    let mut overridden = None;

    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Some(size) = parse_size(value.trim()) else {
            continue;
        };
        if label.contains("Override") {
            overridden = Some(size);
        } else if label.contains("Physical") {
            physical = Some(size);
        }
    }

    overridden
        .or(physical)
        .ok_or_else(|| CoreError::Device(format!("wm size 출력 해석 실패: {}", output.trim())))
}

fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// `input text`용 이스케이프 (공백은 `%s`)
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => escaped.push_str("%s"),
            '\\' | '\'' | '"' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '$' | '`' | '*' | '?'
            | '~' | '#' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================
// NoOpInputController — 테스트/디버깅용
// ============================================================

/// No-Op 입력 장치 — 모든 입력을 로깅만 하고 실행하지 않음
pub struct NoOpInputController;

impl InputController for NoOpInputController {
    fn tap(&self, x: i32, y: i32) -> Result<(), CoreError> {
        debug!(x, y, "[NoOp] 탭");
        Ok(())
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> Result<(), CoreError> {
        debug!(x1, y1, x2, y2, duration_ms, "[NoOp] 스와이프");
        Ok(())
    }

    fn text(&self, text: &str) -> Result<(), CoreError> {
        debug!(text_len = text.len(), "[NoOp] 텍스트 입력");
        Ok(())
    }

    fn key_event(&self, code: u32, longpress: bool) -> Result<(), CoreError> {
        debug!(code, longpress, "[NoOp] 키 이벤트");
        Ok(())
    }

    fn platform(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_devices_keeps_ready_devices() {
        let output = "* daemon started successfully\n\
                      List of devices attached\n\
                      emulator-5554\tdevice\n\
                      127.0.0.1:62001\toffline\n\
                      R58M123\tunauthorized\n\
                      emulator-5556\tdevice\n\n";
        assert_eq!(parse_devices(output), vec!["emulator-5554", "emulator-5556"]);
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn device_selection_rules() {
        let one = vec!["emulator-5554".to_string()];
        let two = vec!["a".to_string(), "b".to_string()];

        assert_eq!(select_device(&one, None).unwrap(), "emulator-5554");
        assert_matches!(select_device(&[], None), Err(CoreError::DeviceNotFound));
        assert_matches!(select_device(&two, None), Err(CoreError::DeviceNotProvided));
        assert_eq!(select_device(&two, Some("b")).unwrap(), "b");
        assert_matches!(select_device(&two, Some("c")), Err(CoreError::DeviceNotFound));
    }

    #[test]
    fn wm_size_prefers_override() {
        assert_eq!(parse_wm_size("Physical size: 1080x1920\n").unwrap(), (1080, 1920));
        assert_eq!(
            parse_wm_size("Physical size: 1080x1920\nOverride size: 720x1280\n").unwrap(),
            (720, 1280)
        );
        assert!(parse_wm_size("error: no devices").is_err());
    }

    #[test]
    fn text_escaping() {
        assert_eq!(escape_text("hello world"), "hello%sworld");
        assert_eq!(escape_text("a&b"), "a\\&b");
        assert_eq!(escape_text("it's"), "it\\'s");
    }

    #[test]
    fn base_args_include_serial() {
        let client = AdbClient::new("10.0.0.2", 5555, Some("emu-1".to_string()));
        assert_eq!(client.base_args(None), ["-H", "10.0.0.2", "-P", "5555"]);
        assert_eq!(
            client.base_args(Some("emu-1")),
            ["-H", "10.0.0.2", "-P", "5555", "-s", "emu-1"]
        );
    }

    #[test]
    fn commands_require_started_server() {
        let client = AdbClient::new("127.0.0.1", 5037, Some(" ".to_string()));
        assert_eq!(client.state(), ServerState::Closed);
        assert!(client.serial.is_none());
        assert_matches!(client.exec_out("screencap -p"), Err(CoreError::Device(_)));
        assert_matches!(InputController::tap(&client, 1, 2), Err(CoreError::Input(_)));
    }

    #[test]
    fn noop_controller_accepts_everything() {
        let noop = NoOpInputController;
        assert!(noop.tap(1, 2).is_ok());
        assert!(noop.swipe(0, 0, 10, 10, 100).is_ok());
        assert!(noop.key_event(4, false).is_ok());
        assert_eq!(noop.platform(), "noop");
    }
}
