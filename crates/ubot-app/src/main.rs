//! # ubot-app
//!
//! UBOT 바이너리 진입점.
//! 설정 로딩, tracing 초기화, 서브커맨드(탐색/캡처/탭/스프라이트 분리) 실행.

mod frame_monitor;
mod lifecycle;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ubot_automation::adb::AdbClient;
use ubot_automation::scripts::{self, HUB_ATTEMPTS, HUB_TAPPED};
use ubot_automation::{Bot, Jump, SpriteRegistry, TaskManager};
use ubot_core::config::AppConfig;
use ubot_core::config_manager::ConfigManager;
use ubot_core::ports::capture::ScreenCapturer;
use ubot_vision::grabber::{CaptureMode, FrameGrabber};
use ubot_vision::image::{Image, ImageMode};
use ubot_vision::locator::{LocateOptions, SpriteLocator};
use ubot_vision::sprite::Sprite;
use ubot_vision::utilities;
use ubot_vision::FrameBuffer;

use crate::frame_monitor::FrameMonitor;

/// UBOT — 화면 인식 기반 모바일 앱 자동화
#[derive(Parser, Debug)]
#[command(name = "ubot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.ini)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 이미지 파일에서 스프라이트 탐색 (결과 JSON 출력)
    Locate {
        /// 스프라이트 PNG
        sprite: PathBuf,
        /// 프레임 이미지
        frame: PathBuf,
        /// 매칭 이미지 모드 (original, grayscale, threshold)
        #[arg(long, default_value = "original")]
        mode: ImageMode,
        /// 피라미드 최소 배율 (0, 1]
        #[arg(long)]
        scale: Option<f32>,
        /// 최소 유사도
        #[arg(long)]
        threshold: Option<f32>,
        /// 최고 점수 하나가 아닌 모든 후보 출력
        #[arg(long)]
        all: bool,
        /// 중복 제거 거리 (px)
        #[arg(long)]
        dedup: Option<f64>,
    },

    /// 디바이스 화면을 캡처해 PNG로 저장 (Ctrl+C 또는 지정 시간까지)
    Capture {
        /// 저장 디렉토리
        #[arg(long, default_value = "frames")]
        out: PathBuf,
        /// 모니터 폴링 간격 (밀리초)
        #[arg(long, default_value = "500")]
        interval_ms: u64,
        /// 실행 시간 (초, 생략 시 Ctrl+C까지)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// 스프라이트를 찾아 탭
    Tap {
        /// 스프라이트 이름 (예: buttons/ok)
        sprite: String,
        /// 스프라이트 디렉토리
        #[arg(long)]
        sprites: PathBuf,
        /// 찾기 재시도 횟수
        #[arg(long, default_value = "3")]
        retries: u32,
        /// 최소 유사도 (기본: 설정값)
        #[arg(long)]
        similarity: Option<f32>,
    },

    /// 같은 크기 PNG들을 겹쳐 배경이 바뀌는 픽셀을 투명 처리
    IsolateSprite {
        /// PNG 디렉토리 (하위 포함)
        dir: PathBuf,
        /// 출력 PNG
        out: PathBuf,
    },
}

/// 설정 로드 (경로 미지정 시 기본 경로)
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let manager = match path {
        Some(path) => ConfigManager::load(path),
        None => ConfigManager::new(),
    }
    .context("설정 로드 실패")?;
    info!("설정 파일: {}", manager.config_path().display());
    Ok(manager.get())
}

/// 오프라인 스프라이트 탐색
fn run_locate(
    config: &AppConfig,
    sprite: &Path,
    frame: &Path,
    options: LocateOptions,
) -> Result<()> {
    let sprite = Sprite::from_path(sprite, None).context("스프라이트 로드 실패")?;
    let frame = Image::open(frame).context("프레임 로드 실패")?;
    let locator = SpriteLocator::from_config(&config.locator);

    let detections = locator.locate(&sprite, &frame, &options)?.into_vec();
    info!(sprite = sprite.name(), found = detections.len(), "탐색 완료");
    println!("{}", serde_json::to_string_pretty(&detections)?);
    Ok(())
}

/// ADB 캡처 + 헤드리스 프레임 모니터
async fn run_capture(
    config: AppConfig,
    out: PathBuf,
    interval: Duration,
    duration: Option<Duration>,
) -> Result<()> {
    let adb = Arc::new(AdbClient::from_config(&config.emulator));
    adb.start_server().context("ADB 서버 시작 실패")?;

    let result = capture_until_shutdown(&config, Arc::clone(&adb), out, interval, duration).await;

    if let Err(e) = adb.stop_server() {
        warn!("ADB 서버 종료 실패: {e}");
    }
    result
}

async fn capture_until_shutdown(
    config: &AppConfig,
    adb: Arc<AdbClient>,
    out: PathBuf,
    interval: Duration,
    duration: Option<Duration>,
) -> Result<()> {
    let (width, height) = adb.screensize()?;
    info!("디바이스 화면 {width}x{height}");

    let buffer = Arc::new(FrameBuffer::new(config.frame_buffer.capacity)?);
    let grabber = FrameGrabber::new(
        adb,
        Arc::clone(&buffer),
        CaptureMode::from_config(config)?,
        config.grabber.fps,
    );
    grabber.start()?;

    let manager = TaskManager::global();
    let monitor = match FrameMonitor::start(manager, Arc::clone(&buffer), &out, interval) {
        Ok(monitor) => monitor,
        Err(e) => {
            grabber.stop()?;
            return Err(e.into());
        }
    };
    info!(
        started_at = %chrono::Local::now().to_rfc3339(),
        "캡처 중 → {} (Ctrl+C로 종료)",
        out.display()
    );

    lifecycle::wait_for_stop(duration).await;

    let grabbed = grabber.stop();
    let stats = tokio::task::spawn_blocking(move || monitor_stop(monitor)).await??;
    grabbed?;
    println!("저장한 프레임: {}개 ({})", stats.saved, out.display());
    Ok(())
}

fn monitor_stop(monitor: FrameMonitor<'static>) -> Result<frame_monitor::MonitorStats> {
    Ok(monitor.stop()?)
}

/// 스프라이트 찾기 → 탭 스크립트 실행
fn run_tap(
    config: AppConfig,
    sprite: &str,
    sprites_dir: &Path,
    retries: u32,
    similarity: Option<f32>,
) -> Result<()> {
    let registry = SpriteRegistry::discover(sprites_dir).context("스프라이트 로드 실패")?;
    if !registry.contains(sprite) {
        return Err(anyhow!(
            "스프라이트 '{sprite}' 없음 (등록: {})",
            registry.names().collect::<Vec<_>>().join(", ")
        ));
    }

    let adb = Arc::new(AdbClient::from_config(&config.emulator));
    adb.start_server().context("ADB 서버 시작 실패")?;

    let result = (|| -> Result<()> {
        let bot = Bot::new(config, adb.clone(), adb.clone(), Arc::new(registry))?;
        let steps = scripts::find_and_tap(sprite, retries, similarity);
        let hub = bot.exec_by_steps(&steps, Jump::Begin, None)?;
        println!(
            "탭 완료: {} (시도 {}회, 좌표 {})",
            sprite,
            hub.get_as::<u32>(HUB_ATTEMPTS).unwrap_or(0),
            hub.get(HUB_TAPPED).map(|v| v.to_string()).unwrap_or_default()
        );
        Ok(())
    })();

    if let Err(e) = adb.stop_server() {
        warn!("ADB 서버 종료 실패: {e}");
    }
    result
}

/// 스프라이트 분리
fn run_isolate(dir: &Path, out: &Path) -> Result<()> {
    let isolated = utilities::isolate_sprite_dir(dir)?;
    isolated.save(out)?;
    println!("분리된 스프라이트 저장: {}", out.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // tracing 초기화
    let log_filter = format!(
        "ubot={},ubot_app={},ubot_core={},ubot_vision={},ubot_automation={}",
        args.log_level, args.log_level, args.log_level, args.log_level, args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Locate {
            sprite,
            frame,
            mode,
            scale,
            threshold,
            all,
            dedup,
        } => {
            let mut options = LocateOptions::new().mode(mode).best_match(!all);
            if let Some(scale) = scale {
                options = options.scale(scale);
            }
            if let Some(threshold) = threshold {
                options = options.threshold(threshold);
            }
            if let Some(dedup) = dedup {
                options = options.dedup_distance(dedup);
            }
            run_locate(&config, &sprite, &frame, options)
        }
        Command::Capture {
            out,
            interval_ms,
            duration_secs,
        } => {
            run_capture(
                config,
                out,
                Duration::from_millis(interval_ms.max(1)),
                duration_secs.map(Duration::from_secs),
            )
            .await
        }
        Command::Tap {
            sprite,
            sprites,
            retries,
            similarity,
        } => run_tap(config, &sprite, &sprites, retries, similarity),
        Command::IsolateSprite { dir, out } => run_isolate(&dir, &out),
    }
}
