//! ubot-automation 성능 벤치마크
//!
//! 실행: cargo bench -p ubot-automation
//!
//! 벤치마크 대상:
//! - StepExecutor: 순차 실행, 이름 점프 루프
//! - Channel: 용량별 송수신 왕복

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use ubot_automation::adb::NoOpInputController;
use ubot_automation::{Bot, Channel, DataHub, Jump, SpriteRegistry, Step, StepExecutor};
use ubot_core::config::AppConfig;
use ubot_core::error::CoreError;
use ubot_core::ports::capture::ScreenCapturer;

/// 캡처하지 않는 캡처기 (스텝 실행만 측정)
struct IdleCapturer;

impl ScreenCapturer for IdleCapturer {
    fn screencap(&self) -> Result<Vec<u8>, CoreError> {
        Err(CoreError::Capture("벤치마크에서는 캡처하지 않음".to_string()))
    }

    fn screensize(&self) -> Result<(u32, u32), CoreError> {
        Ok((0, 0))
    }

    fn shell(&self, _command: &str) -> Result<String, CoreError> {
        Ok(String::new())
    }
}

fn create_bot() -> Bot {
    Bot::new(
        AppConfig::default(),
        Arc::new(IdleCapturer),
        Arc::new(NoOpInputController),
        Arc::new(SpriteRegistry::new()),
    )
    .unwrap()
}

/// N개 카운터 스텝
fn counting_steps(n: usize) -> Vec<Step> {
    (0..n)
        .map(|i| {
            Step::new(format!("step-{i}"), |ctx| {
                let count = ctx.hub.get_as::<u64>("count").unwrap_or(0);
                ctx.hub.insert("count", count + 1);
                Ok(Jump::Next)
            })
        })
        .collect()
}

/// 순차 실행 벤치마크
fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_executor");
    let bot = create_bot();

    for n in [10, 100, 1000] {
        let steps = counting_steps(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("sequential", n), &steps, |b, steps| {
            b.iter(|| black_box(StepExecutor::new(steps).run(&bot, Jump::Next, None)));
        });
    }

    group.finish();
}

/// 이름 점프 루프 벤치마크 (첫 스텝으로 100회 되돌아감)
fn bench_jump_loop(c: &mut Criterion) {
    let bot = create_bot();
    let mut steps = counting_steps(8);
    steps.push(Step::new("loop", |ctx| {
        let laps = ctx.hub.get_as::<u64>("laps").unwrap_or(0) + 1;
        ctx.hub.insert("laps", laps);
        Ok(if laps < 100 { Jump::from("step-0") } else { Jump::End })
    }));

    c.bench_function("step_executor/jump_loop_100", |b| {
        b.iter(|| black_box(StepExecutor::new(&steps).run(&bot, Jump::Begin, Some(DataHub::new()))));
    });
}

/// 채널 왕복 벤치마크
fn bench_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");
    group.sample_size(20);
    const MESSAGES: u64 = 1000;

    for capacity in [1usize, 16] {
        group.throughput(Throughput::Elements(MESSAGES));
        group.bench_with_input(BenchmarkId::new("send_receive", capacity), &capacity, |b, &cap| {
            b.iter(|| {
                let channel = Arc::new(Channel::new(cap).unwrap());
                let consumer = {
                    let channel = Arc::clone(&channel);
                    thread::spawn(move || {
                        let mut sum = 0u64;
                        while let Some(n) = channel.receive() {
                            sum += n;
                        }
                        sum
                    })
                };
                for n in 0..MESSAGES {
                    channel.send(n).unwrap();
                }
                channel.close();
                black_box(consumer.join().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential, bench_jump_loop, bench_channel);
criterion_main!(benches);
