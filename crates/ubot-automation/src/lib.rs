//! # ubot-automation
//!
//! 자동화 크레이트.
//! 점프 가능한 스텝 실행기, 봇 컨트롤러(프레임 루프/입력), 이름 기반 태스크 관리와
//! 랑데부 채널, ADB 어댑터, 패키지/스프라이트 레지스트리를 담당한다.

pub mod adb;
pub mod bot;
pub mod channel;
pub mod error;
pub mod executor;
pub mod package;
pub mod scripts;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use bot::{Bot, FrameHandler, FrameSignal, LoopExit, RunMode};
pub use channel::{Channel, ChannelClosed};
pub use error::AutomationError;
pub use executor::{DataHub, Jump, Step, StepContext, StepExecutor};
pub use package::{Package, SpriteRegistry, Toolkit};
pub use task::{StopToken, Task, TaskContext, TaskManager, TaskState};
