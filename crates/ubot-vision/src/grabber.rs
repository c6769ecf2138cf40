//! 프레임 그래버.
//!
//! 전용 워커 스레드(`frame-grabber-worker`)가 FPS에 맞춰 화면을 캡처해
//! 그레이스케일 프레임으로 버퍼에 넣는다. 캡처 실패 시 워커는 종료되고
//! 에러는 `stop()`에서 돌려받는다.

use image::{DynamicImage, RgbaImage};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use ubot_core::config::{AppConfig, SharedFolders};
use ubot_core::error::CoreError;
use ubot_core::ports::capture::ScreenCapturer;

use crate::frame::Frame;
use crate::frame_buffer::FrameBuffer;
use crate::frame_limiter::FrameLimiter;
use crate::image::Image;

/// 워커 스레드 이름
pub const WORKER_THREAD_NAME: &str = "frame-grabber-worker";

/// raw screencap 덤프 헤더 크기 (width, height, format)
const DUMP_HEADER_LEN: usize = 12;

/// 캡처 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMode {
    /// `screencap()` 바이트를 바로 디코딩
    Direct,
    /// 디바이스가 공유 폴더에 raw 덤프를 쓰고 호스트에서 읽음
    SharedFolder {
        folders: SharedFolders,
        width: u32,
        height: u32,
    },
}

impl CaptureMode {
    /// 설정에서 캡처 방식 결정 (`shared_folders` 지정 시 공유 폴더 모드)
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        match config.emulator.shared_folders()? {
            Some(folders) => {
                let (width, height) = config.emulator.screen_dimensions()?;
                Ok(Self::SharedFolder {
                    folders,
                    width,
                    height,
                })
            }
            None => Ok(Self::Direct),
        }
    }
}

type WorkerHandle = JoinHandle<Result<(), CoreError>>;

/// 백그라운드 프레임 캡처기
pub struct FrameGrabber {
    capturer: Arc<dyn ScreenCapturer>,
    buffer: Arc<FrameBuffer>,
    mode: CaptureMode,
    fps: u32,
    created_at: Instant,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl FrameGrabber {
    pub fn new(
        capturer: Arc<dyn ScreenCapturer>,
        buffer: Arc<FrameBuffer>,
        mode: CaptureMode,
        fps: u32,
    ) -> Self {
        Self {
            capturer,
            buffer,
            mode,
            fps: fps.max(1),
            created_at: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    pub fn mode(&self) -> &CaptureMode {
        &self.mode
    }

    /// 워커가 살아서 캡처 중인지
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self
                .worker
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// 워커 시작 (이미 실행 중이면 아무것도 하지 않음)
    pub fn start(&self) -> Result<(), CoreError> {
        let mut worker = self.worker.lock();

        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
        }
        // 이전 워커가 에러로 끝났다면 기록만 남기고 새로 시작
        if let Some(handle) = worker.take() {
            if let Err(e) = join_worker(handle) {
                warn!("이전 그래버 워커 종료 사유: {e}");
            }
        }

        self.running.store(true, Ordering::Release);

        let capturer = Arc::clone(&self.capturer);
        let buffer = Arc::clone(&self.buffer);
        let running = Arc::clone(&self.running);
        let mode = self.mode.clone();
        let fps = self.fps;
        let created_at = self.created_at;

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(capturer.as_ref(), &buffer, &running, &mode, fps, created_at))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                CoreError::Internal(format!("그래버 스레드 생성 실패: {e}"))
            })?;

        *worker = Some(handle);
        info!("프레임 그래버 시작: {} FPS, {:?}", self.fps, self.mode);
        Ok(())
    }

    /// 워커 정지 후 합류. 워커를 종료시킨 에러가 있으면 반환
    ///
    /// 반환 이후에는 버퍼에 새 프레임이 들어가지 않는다.
    pub fn stop(&self) -> Result<(), CoreError> {
        self.running.store(false, Ordering::Release);
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                let result = join_worker(handle);
                info!("프레임 그래버 정지");
                result
            }
            None => Ok(()),
        }
    }

    /// 프레임 한 장 캡처 (버퍼에 넣지 않음)
    pub fn grab_frame(&self) -> Result<Image, CoreError> {
        capture(self.capturer.as_ref(), &self.mode, self.created_at)
    }
}

impl Drop for FrameGrabber {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!("그래버 해제 중 워커 에러: {e}");
        }
    }
}

fn join_worker(handle: WorkerHandle) -> Result<(), CoreError> {
    handle
        .join()
        .map_err(|_| CoreError::Internal("그래버 워커 패닉".to_string()))?
}

fn run_worker(
    capturer: &dyn ScreenCapturer,
    buffer: &FrameBuffer,
    running: &AtomicBool,
    mode: &CaptureMode,
    fps: u32,
    created_at: Instant,
) -> Result<(), CoreError> {
    let mut limiter = FrameLimiter::new(fps);

    while running.load(Ordering::Acquire) {
        limiter.start();

        let image = match capture(capturer, mode, created_at) {
            Ok(image) => image,
            Err(e) => {
                error!("프레임 캡처 실패, 그래버 종료: {e}");
                running.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let previous = buffer.newest_frame();
        let frame = Frame::new(image, previous.as_deref());

        if !running.load(Ordering::Acquire) {
            break;
        }
        debug!(
            sequence = frame.sequence(),
            similarity = ?frame.similarity(),
            "프레임 캡처 완료"
        );
        buffer.add_frame(Arc::new(frame));

        limiter.stop_and_delay();
    }

    Ok(())
}

/// 모드별 단일 캡처 → 그레이스케일 이미지
fn capture(
    capturer: &dyn ScreenCapturer,
    mode: &CaptureMode,
    created_at: Instant,
) -> Result<Image, CoreError> {
    match mode {
        CaptureMode::Direct => {
            let bytes = capturer.screencap()?;
            let image = Image::from_bytes(&bytes)
                .map_err(|e| CoreError::Capture(format!("screencap 디코딩 실패: {e}")))?;
            Ok(image.grayscale())
        }
        CaptureMode::SharedFolder {
            folders,
            width,
            height,
        } => {
            let file_name = format!("screen-{:.2}.dump", created_at.elapsed().as_secs_f64());
            let device_path = format!("{}/{}", folders.device_dir, file_name);
            let host_path = Path::new(&folders.host_dir).join(&file_name);

            let _guard = RemoteDumpGuard {
                capturer,
                path: device_path.clone(),
            };
            capturer.shell(&format!("screencap {device_path}"))?;
            let raw = fs::read(&host_path).map_err(|e| {
                CoreError::Capture(format!("덤프 읽기 실패: {}: {e}", host_path.display()))
            })?;
            decode_raw_dump(&raw, *width, *height, &host_path)
        }
    }
}

/// `[12바이트 헤더][height × width × RGBA]` → 그레이스케일
fn decode_raw_dump(raw: &[u8], width: u32, height: u32, path: &Path) -> Result<Image, CoreError> {
    let expected = width as usize * height as usize * 4;
    let body = raw.get(DUMP_HEADER_LEN..).unwrap_or_default();
    if body.len() < expected {
        return Err(CoreError::Capture(format!(
            "덤프 크기 부족: {} ({}바이트, 필요 {}바이트)",
            path.display(),
            body.len(),
            expected
        )));
    }

    let rgba = RgbaImage::from_raw(width, height, body[..expected].to_vec())
        .ok_or_else(|| CoreError::Capture("덤프 버퍼 변환 실패".to_string()))?;
    Ok(Image::new(DynamicImage::ImageLuma8(
        DynamicImage::ImageRgba8(rgba).to_luma8(),
    )))
}

/// 디바이스 측 덤프 파일 삭제 가드 — 모든 종료 경로에서 `rm` 실행
struct RemoteDumpGuard<'a> {
    capturer: &'a dyn ScreenCapturer,
    path: String,
}

impl Drop for RemoteDumpGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.capturer.shell(&format!("rm {}", self.path)) {
            warn!("원격 덤프 삭제 실패: {}: {e}", self.path);
        }
    }
}
