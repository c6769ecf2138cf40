//! 헤드리스 프레임 모니터.
//!
//! 폴러 태스크가 일정 간격으로 버퍼의 최신 프레임을 확인해 새 프레임만
//! 채널로 넘기고, 작성기 태스크가 받아 PNG로 저장한다.
//! 버퍼는 읽기만 한다.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ubot_automation::{AutomationError, Channel, TaskContext, TaskManager};
use ubot_vision::frame::Frame;
use ubot_vision::frame_buffer::FrameBuffer;
use ubot_vision::frame_limiter::FrameLimiter;

const POLLER_TASK: &str = "frame-monitor-poller";
const WRITER_TASK: &str = "frame-monitor-writer";

/// 모니터 종료 통계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    pub forwarded: u64,
    pub saved: u64,
}

/// 실행 중인 모니터 핸들
pub struct FrameMonitor<'m> {
    manager: &'m TaskManager,
    forwarded: Arc<AtomicU64>,
    saved: Arc<AtomicU64>,
}

impl<'m> FrameMonitor<'m> {
    /// 폴러/작성기 태스크 등록 후 시작
    pub fn start(
        manager: &'m TaskManager,
        buffer: Arc<FrameBuffer>,
        out_dir: impl Into<PathBuf>,
        interval: Duration,
    ) -> Result<Self, AutomationError> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir).map_err(ubot_core::error::CoreError::from)?;

        let frames: Arc<Channel<Arc<Frame>>> = Arc::new(Channel::default());
        let forwarded = Arc::new(AtomicU64::new(0));
        let saved = Arc::new(AtomicU64::new(0));

        let writer = {
            let frames = Arc::clone(&frames);
            let saved = Arc::clone(&saved);
            manager.create_task(WRITER_TASK, move |_ctx| {
                while let Some(frame) = frames.receive() {
                    write_frame(&out_dir, &frame)?;
                    saved.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })?
        };

        let poller = {
            let frames = Arc::clone(&frames);
            let forwarded = Arc::clone(&forwarded);
            let created = manager.create_task(POLLER_TASK, move |ctx| {
                let result = poll(&ctx, &buffer, &frames, &forwarded, interval);
                frames.close();
                result
            });
            match created {
                Ok(task) => task,
                Err(e) => {
                    manager.remove_task(WRITER_TASK);
                    return Err(e);
                }
            }
        };

        writer.start()?;
        poller.start()?;
        info!(interval_ms = interval.as_millis() as u64, "프레임 모니터 시작");

        Ok(Self {
            manager,
            forwarded,
            saved,
        })
    }

    /// 폴러 정지 → 채널 닫힘 → 작성기가 남은 프레임을 저장하고 종료
    pub fn stop(self) -> Result<MonitorStats, AutomationError> {
        let poller = self.manager.stop_task(POLLER_TASK, true);
        let writer = match self.manager.get_task(WRITER_TASK) {
            Some(task) => {
                let result = task.join();
                self.manager.remove_task(WRITER_TASK);
                result
            }
            None => Ok(()),
        };
        poller?;
        writer?;

        let stats = MonitorStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
        };
        info!(forwarded = stats.forwarded, saved = stats.saved, "프레임 모니터 정지");
        Ok(stats)
    }
}

fn poll(
    ctx: &TaskContext,
    buffer: &FrameBuffer,
    frames: &Channel<Arc<Frame>>,
    forwarded: &AtomicU64,
    interval: Duration,
) -> Result<(), AutomationError> {
    let mut limiter = FrameLimiter::with_period(interval);
    let mut last_sequence = 0u64;

    while ctx.alive() {
        limiter.start();
        if let Some(frame) = buffer.newest_frame() {
            if frame.sequence() > last_sequence {
                last_sequence = frame.sequence();
                debug!(sequence = last_sequence, "새 프레임 전달");
                if frames.send(frame).is_err() {
                    break;
                }
                forwarded.fetch_add(1, Ordering::Relaxed);
            }
        }
        limiter.stop_and_delay();
    }
    Ok(())
}

/// `frame-{sequence:06}.png`로 저장
fn write_frame(out_dir: &Path, frame: &Frame) -> Result<(), AutomationError> {
    let path = out_dir.join(format!("frame-{:06}.png", frame.sequence()));
    if let Err(e) = frame.image().save(&path) {
        warn!("프레임 저장 실패 {}: {e}", path.display());
        return Err(e.into());
    }
    debug!("프레임 저장: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use ubot_vision::image::Image;

    fn frame() -> Arc<Frame> {
        let image = Image::from_luma(4, 3, vec![50; 12]).unwrap();
        Arc::new(Frame::new(image, None))
    }

    fn png_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "png")
            })
            .count()
    }

    #[test]
    fn saves_each_new_frame_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new();
        let buffer = Arc::new(FrameBuffer::new(3).unwrap());

        let monitor =
            FrameMonitor::start(&manager, Arc::clone(&buffer), dir.path(), Duration::from_millis(5))
                .unwrap();

        buffer.add_frame(frame());
        std::thread::sleep(Duration::from_millis(60));
        buffer.add_frame(frame());
        std::thread::sleep(Duration::from_millis(60));

        let stats = monitor.stop().unwrap();
        assert_eq!(stats.forwarded, 2);
        assert_eq!(stats.saved, 2);
        assert_eq!(png_count(dir.path()), 2);
        assert!(manager.is_empty());
    }

    #[test]
    fn idle_buffer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new();
        let buffer = Arc::new(FrameBuffer::new(1).unwrap());

        let monitor =
            FrameMonitor::start(&manager, buffer, dir.path().join("out"), Duration::from_millis(5))
                .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let stats = monitor.stop().unwrap();
        assert_eq!(stats, MonitorStats { forwarded: 0, saved: 0 });
        assert_eq!(png_count(&dir.path().join("out")), 0);
    }

    #[test]
    fn second_monitor_on_same_manager_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TaskManager::new();
        let buffer = Arc::new(FrameBuffer::new(1).unwrap());

        let first =
            FrameMonitor::start(&manager, Arc::clone(&buffer), dir.path(), Duration::from_millis(5))
                .unwrap();
        assert!(matches!(
            FrameMonitor::start(&manager, buffer, dir.path(), Duration::from_millis(5)),
            Err(AutomationError::TaskConflict(_))
        ));
        first.stop().unwrap();
    }
}
