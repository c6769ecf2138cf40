//! 봇 컨트롤러.
//!
//! 세션 하나의 프레임 버퍼, 그래버, 스프라이트 탐색기와 입력 장치를 묶는다.
//! 스크립트(스텝)와 프레임 루프 두 가지 방식으로 구동된다.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ubot_core::config::AppConfig;
use ubot_core::error::CoreError;
use ubot_core::models::geometry::{Location, Region};
use ubot_core::ports::capture::ScreenCapturer;
use ubot_core::ports::input::InputController;
use ubot_vision::frame::Frame;
use ubot_vision::frame_buffer::FrameBuffer;
use ubot_vision::frame_limiter::FrameLimiter;
use ubot_vision::grabber::{CaptureMode, FrameGrabber};
use ubot_vision::locator::{LocateOptions, Matches, SpriteLocator};
use ubot_vision::sprite::Sprite;

use crate::error::AutomationError;
use crate::executor::{DataHub, Jump, Step, StepExecutor};
use crate::package::SpriteRegistry;

/// 기본 대기 구간 (초)
const DEFAULT_WAIT_RANGE: (f64, f64) = (0.4, 0.7);

/// 탭 후 기본 대기
const DEFAULT_TAP_WAIT: Duration = Duration::from_millis(700);

/// 그래버 생존 확인 주기
const FRAME_POLL: Duration = Duration::from_millis(100);

/// 첫 프레임 최대 대기
const FRAME_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================
// 프레임 루프 타입
// ============================================================

/// 실행 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Active,
    Passive,
}

/// 프레임 핸들러가 루프에 주는 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
    Continue,
    Break,
}

/// 프레임 루프 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// 핸들러가 `Break` 반환
    Break,
    /// 제한 시간 경과
    Timeout,
}

/// 프레임마다 호출되는 핸들러
pub trait FrameHandler {
    fn handle_frame(&mut self, bot: &Bot, frame: &Frame) -> Result<FrameSignal, AutomationError>;
}

impl<F> FrameHandler for F
where
    F: FnMut(&Bot, &Frame) -> Result<FrameSignal, AutomationError>,
{
    fn handle_frame(&mut self, bot: &Bot, frame: &Frame) -> Result<FrameSignal, AutomationError> {
        self(bot, frame)
    }
}

// ============================================================
// Bot
// ============================================================

/// 자동화 봇
pub struct Bot {
    config: AppConfig,
    run_mode: RunMode,
    input: Arc<dyn InputController>,
    buffer: Arc<FrameBuffer>,
    grabber: FrameGrabber,
    locator: SpriteLocator,
    sprites: Arc<SpriteRegistry>,
    in_frame_loop: AtomicBool,
}

impl Bot {
    /// 설정 검증 후 세션 구성 (그래버는 아직 시작하지 않음)
    pub fn new(
        config: AppConfig,
        capturer: Arc<dyn ScreenCapturer>,
        input: Arc<dyn InputController>,
        sprites: Arc<SpriteRegistry>,
    ) -> Result<Self, AutomationError> {
        config.validate()?;

        let buffer = Arc::new(FrameBuffer::new(config.frame_buffer.capacity)?);
        let mode = CaptureMode::from_config(&config)?;
        let grabber = FrameGrabber::new(capturer, Arc::clone(&buffer), mode, config.grabber.fps);
        let locator = SpriteLocator::from_config(&config.locator);

        info!(
            platform = input.platform(),
            sprites = sprites.len(),
            "봇 생성"
        );

        Ok(Self {
            config,
            run_mode: RunMode::default(),
            input,
            buffer,
            grabber,
            locator,
            sprites,
            in_frame_loop: AtomicBool::new(false),
        })
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    pub fn grabber(&self) -> &FrameGrabber {
        &self.grabber
    }

    pub fn locator(&self) -> &SpriteLocator {
        &self.locator
    }

    pub fn sprites(&self) -> &SpriteRegistry {
        &self.sprites
    }

    /// 프레임 루프 실행 중인지
    pub fn in_frame_loop(&self) -> bool {
        self.in_frame_loop.load(Ordering::Acquire)
    }

    /// 등록된 스프라이트 조회
    pub fn sprite(&self, name: &str) -> Result<&Sprite, AutomationError> {
        self.sprites
            .get(name)
            .ok_or_else(|| CoreError::not_found("Sprite", name).into())
    }

    // --------------------------------------------------------
    // 프레임
    // --------------------------------------------------------

    /// 최신 프레임 (그래버가 멈춰 있으면 시작하고 새 프레임을 기다림)
    ///
    /// 그래버가 에러로 죽으면 그 에러를 반환한다.
    pub fn latest_frame(&self) -> Result<Arc<Frame>, AutomationError> {
        if let Some(frame) = self.buffer.newest_frame().filter(|_| self.grabber.is_running()) {
            return Ok(frame);
        }
        // 정지 전에 쌓인 프레임은 건너뜀
        let stale = self.buffer.newest_frame().map(|f| f.sequence());
        self.grabber.start()?;

        let deadline = Instant::now() + FRAME_WAIT_TIMEOUT;
        loop {
            if let Some(frame) = self.buffer.latest_frame_timeout(FRAME_POLL) {
                if Some(frame.sequence()) != stale {
                    return Ok(frame);
                }
                thread::sleep(FRAME_POLL / 10);
            }
            if !self.grabber.is_running() {
                self.grabber.stop()?;
                return Err(CoreError::Capture("그래버가 프레임 없이 종료됨".to_string()).into());
            }
            if Instant::now() >= deadline {
                return Err(CoreError::Capture(format!(
                    "{}초 동안 프레임 없음",
                    FRAME_WAIT_TIMEOUT.as_secs()
                ))
                .into());
            }
        }
    }

    /// 직전 프레임 (없으면 `None`)
    pub fn previous_frame(&self) -> Option<Arc<Frame>> {
        self.buffer.previous_frame()
    }

    /// 최신 프레임에서 스프라이트 탐색
    pub fn locate(&self, name: &str, options: &LocateOptions) -> Result<Matches, AutomationError> {
        let sprite = self.sprite(name)?;
        let frame = self.latest_frame()?;
        Ok(self.locator.locate(sprite, &*frame, options)?)
    }

    // --------------------------------------------------------
    // 대기
    // --------------------------------------------------------

    /// 무작위 대기
    ///
    /// 기본 0.4~0.7초, `duration`만 주면 `[d, 2d]`, `flex`까지 주면 `[d, d + flex]`.
    /// 실제로 잔 시간을 반환한다.
    pub fn wait(&self, duration: Option<Duration>, flex: Option<Duration>) -> Duration {
        let (lo, hi) = match duration {
            None => DEFAULT_WAIT_RANGE,
            Some(d) => {
                let base = d.as_secs_f64();
                let flex = flex.unwrap_or(d).as_secs_f64();
                (base, base + flex)
            }
        };
        let secs = if hi > lo {
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            lo
        };
        let slept = Duration::from_secs_f64(secs);
        debug!("대기 {:.3}초", secs);
        thread::sleep(slept);
        slept
    }

    // --------------------------------------------------------
    // 입력
    // --------------------------------------------------------

    /// 스프라이트를 찾아 영역 안 임의 지점 탭
    ///
    /// `similarity` 기본값은 설정의 `locator.default_similarity`.
    pub fn tap_sprite(
        &self,
        name: &str,
        similarity: Option<f32>,
        then_wait: Option<Duration>,
    ) -> Result<Region, AutomationError> {
        let threshold = similarity.unwrap_or(self.config.locator.default_similarity);
        let options = LocateOptions::new().threshold(threshold);

        let region = self
            .locate(name, &options)?
            .best()
            .map(|d| d.region)
            .ok_or_else(|| AutomationError::SpriteNotFound(name.to_string()))?;

        debug!(sprite = name, %region, "스프라이트 탭");
        self.tap_region(&region)?;
        self.wait(Some(then_wait.unwrap_or(DEFAULT_TAP_WAIT)), None);
        Ok(region)
    }

    /// 영역 안(경계 포함) 임의 지점 탭
    pub fn tap_region(&self, region: &Region) -> Result<Location, AutomationError> {
        let mut rng = rand::thread_rng();
        let location = Location::new(
            rng.gen_range(region.x..=region.right()),
            rng.gen_range(region.y..=region.bottom()),
        );
        self.tap_location(location)?;
        Ok(location)
    }

    pub fn tap_location(&self, location: Location) -> Result<(), AutomationError> {
        debug!("탭 {location}");
        Ok(self.input.tap(location.x, location.y)?)
    }

    /// 스와이프 후 스와이프 시간만큼 대기
    pub fn swipe(&self, from: Location, to: Location, duration_ms: u64) -> Result<(), AutomationError> {
        debug!("스와이프 {from} → {to} ({duration_ms}ms)");
        self.input.swipe(from.x, from.y, to.x, to.y, duration_ms)?;
        self.wait(Some(Duration::from_millis(duration_ms)), None);
        Ok(())
    }

    pub fn text(&self, text: &str) -> Result<(), AutomationError> {
        Ok(self.input.text(text)?)
    }

    pub fn key_event(&self, code: u32, longpress: bool) -> Result<(), AutomationError> {
        Ok(self.input.key_event(code, longpress)?)
    }

    // --------------------------------------------------------
    // 실행
    // --------------------------------------------------------

    /// 스텝 스크립트 실행
    pub fn exec_by_steps(
        &self,
        steps: &[Step],
        start: Jump,
        hub: Option<DataHub>,
    ) -> Result<DataHub, AutomationError> {
        StepExecutor::new(steps).run(self, start, hub)
    }

    /// 프레임 루프
    ///
    /// 매 주기 최신 프레임으로 핸들러를 호출하고 `fps`에 맞춰 쉰다.
    /// 종료 경로와 무관하게 루프 플래그를 내리고 그래버를 멈춘다.
    pub fn handle_frame<H>(
        &self,
        handler: &mut H,
        fps: u32,
        timeout: Option<Duration>,
    ) -> Result<LoopExit, AutomationError>
    where
        H: FrameHandler + ?Sized,
    {
        self.grabber.start()?;
        self.in_frame_loop.store(true, Ordering::Release);
        let _guard = FrameLoopGuard { bot: self };

        let started = Instant::now();
        let mut limiter = FrameLimiter::new(fps);
        info!(fps, ?timeout, "프레임 루프 시작");

        loop {
            limiter.start();
            let frame = self.latest_frame()?;
            let signal = handler.handle_frame(self, &frame)?;
            limiter.stop_and_delay();

            if signal == FrameSignal::Break {
                info!("프레임 루프 종료 (break)");
                return Ok(LoopExit::Break);
            }
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                info!("프레임 루프 종료 (timeout)");
                return Ok(LoopExit::Timeout);
            }
        }
    }
}

/// 프레임 루프 정리
struct FrameLoopGuard<'a> {
    bot: &'a Bot,
}

impl Drop for FrameLoopGuard<'_> {
    fn drop(&mut self) {
        self.bot.in_frame_loop.store(false, Ordering::Release);
        if let Err(e) = self.bot.grabber.stop() {
            warn!("프레임 루프 종료 중 그래버 에러: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{noise_png, test_bot_with, RecordingInput, StaticCapturer};
    use assert_matches::assert_matches;
    use ubot_vision::image::Image;

    fn bot_with_sprite() -> (Bot, Arc<RecordingInput>) {
        let frame = noise_png(64, 48);
        let image = Image::from_bytes(&frame).unwrap();
        let patch = image.extract_region(&Region::new(20, 10, 12, 12)).unwrap();

        let mut sprites = SpriteRegistry::new();
        sprites.insert(Sprite::new("button", patch));

        let input = Arc::new(RecordingInput::default());
        let bot = test_bot_with(
            Arc::new(StaticCapturer::new(frame)),
            Arc::clone(&input) as Arc<dyn InputController>,
            sprites,
        );
        (bot, input)
    }

    #[test]
    fn wait_ranges() {
        let (bot, _) = bot_with_sprite();
        let slept = bot.wait(Some(Duration::from_millis(10)), Some(Duration::ZERO));
        assert!((slept.as_secs_f64() - 0.010).abs() < 1e-6);

        let slept = bot.wait(Some(Duration::from_millis(5)), None);
        assert!(slept.as_secs_f64() > 0.0049 && slept.as_secs_f64() < 0.0101);
    }

    #[test]
    fn tap_sprite_taps_inside_region() {
        let (bot, input) = bot_with_sprite();
        let region = bot.tap_sprite("button", None, Some(Duration::ZERO)).unwrap();
        assert_eq!(region, Region::new(20, 10, 12, 12));

        let taps = input.taps();
        assert_eq!(taps.len(), 1);
        assert!(Location::new(taps[0].0, taps[0].1).inside(&region));
        bot.grabber().stop().unwrap();
    }

    #[test]
    fn unknown_sprite_is_not_found() {
        let (bot, _) = bot_with_sprite();
        let err = bot.tap_sprite("missing", None, None).unwrap_err();
        assert_matches!(err, AutomationError::Core(CoreError::NotFound { .. }));
    }

    #[test]
    fn tap_sprite_below_similarity_fails() {
        let (bot, input) = bot_with_sprite();
        // 완전 일치가 1.0이므로 그보다 높은 임계값은 통과 불가
        let err = bot.tap_sprite("button", Some(1.01), None).unwrap_err();
        assert_matches!(err, AutomationError::SpriteNotFound(name) if name == "button");
        assert!(input.taps().is_empty());
        bot.grabber().stop().unwrap();
    }

    #[test]
    fn swipe_and_key_input_forwarded() {
        let (bot, input) = bot_with_sprite();
        bot.swipe(Location::new(1, 2), Location::new(3, 4), 1).unwrap();
        bot.key_event(4, true).unwrap();
        bot.text("hi").unwrap();
        assert_eq!(input.swipes(), vec![(1, 2, 3, 4, 1)]);
        assert_eq!(input.keys(), vec![(4, true)]);
        assert_eq!(input.texts(), vec!["hi".to_string()]);
    }

    #[test]
    fn frame_loop_break_stops_grabber() {
        let (bot, _) = bot_with_sprite();
        let mut calls = 0;
        let mut handler = |bot: &Bot, _frame: &Frame| -> Result<FrameSignal, AutomationError> {
            assert!(bot.in_frame_loop());
            calls += 1;
            Ok(if calls == 3 { FrameSignal::Break } else { FrameSignal::Continue })
        };

        let exit = bot.handle_frame(&mut handler, 100, None).unwrap();
        assert_eq!(exit, LoopExit::Break);
        assert_eq!(calls, 3);
        assert!(!bot.in_frame_loop());
        assert!(!bot.grabber().is_running());
    }

    #[test]
    fn frame_loop_timeout_is_not_an_error() {
        let (bot, _) = bot_with_sprite();
        let mut handler =
            |_: &Bot, _: &Frame| -> Result<FrameSignal, AutomationError> { Ok(FrameSignal::Continue) };
        let exit = bot
            .handle_frame(&mut handler, 50, Some(Duration::from_millis(60)))
            .unwrap();
        assert_eq!(exit, LoopExit::Timeout);
        assert!(!bot.in_frame_loop());
    }

    #[test]
    fn frame_loop_handler_error_cleans_up() {
        let (bot, _) = bot_with_sprite();
        let mut handler = |_: &Bot, _: &Frame| -> Result<FrameSignal, AutomationError> {
            Err(AutomationError::script("중단"))
        };
        assert!(bot.handle_frame(&mut handler, 30, None).is_err());
        assert!(!bot.in_frame_loop());
        assert!(!bot.grabber().is_running());
    }

    #[test]
    fn run_mode_defaults_to_active() {
        let (bot, _) = bot_with_sprite();
        assert_eq!(bot.run_mode(), RunMode::Active);
        assert_eq!(bot.with_run_mode(RunMode::Passive).run_mode(), RunMode::Passive);
    }
}
