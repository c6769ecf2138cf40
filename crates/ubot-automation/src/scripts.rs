//! 자주 쓰는 스텝 스크립트.

use serde_json::json;
use std::time::Duration;
use tracing::debug;
use ubot_core::error::CoreError;
use ubot_core::models::geometry::Region;
use ubot_vision::locator::LocateOptions;

use crate::error::AutomationError;
use crate::executor::{Jump, Step};

/// 허브 키: 찾은 영역
pub const HUB_REGION: &str = "region";
/// 허브 키: 찾기 시도 횟수
pub const HUB_ATTEMPTS: &str = "attempts";
/// 허브 키: 탭한 좌표
pub const HUB_TAPPED: &str = "tapped";

/// 재시도 사이 대기
const RETRY_WAIT: Duration = Duration::from_millis(300);

/// `find`(실패 시 자기 자신으로 점프, 최대 `retries`회 재시도) → `tap` 2단계 스크립트
///
/// 찾은 영역은 허브 `region`, 탭 좌표는 `tapped`에 남는다.
pub fn find_and_tap(sprite: &str, retries: u32, similarity: Option<f32>) -> Vec<Step> {
    let mut find = Step::new("find", |ctx| {
        let name: String = ctx
            .kwarg("sprite")
            .ok_or_else(|| AutomationError::script("sprite 인자 없음"))?;
        let retries: u32 = ctx.kwarg("retries").unwrap_or(0);
        let threshold = ctx
            .kwarg::<f32>("similarity")
            .unwrap_or(ctx.bot.config().locator.default_similarity);

        let attempts = ctx.hub.get_as::<u32>(HUB_ATTEMPTS).unwrap_or(0) + 1;
        ctx.hub.insert(HUB_ATTEMPTS, attempts);

        let options = LocateOptions::new().threshold(threshold);
        if let Some(found) = ctx.bot.locate(&name, &options)?.best() {
            debug!(sprite = %name, attempts, score = found.score, "스프라이트 발견");
            let region = serde_json::to_value(found.region).map_err(CoreError::from)?;
            ctx.hub.insert(HUB_REGION, region);
            return Ok(Jump::Next);
        }

        if attempts > retries {
            return Err(AutomationError::SpriteNotFound(name));
        }
        ctx.bot.wait(Some(RETRY_WAIT), Some(Duration::ZERO));
        Ok(Jump::from("find"))
    })
    .with_kwarg("sprite", sprite)
    .with_kwarg("retries", retries);

    if let Some(similarity) = similarity {
        find = find.with_kwarg("similarity", json!(similarity));
    }

    let tap = Step::new("tap", |ctx| {
        let region: Region = ctx
            .hub
            .get_as(HUB_REGION)
            .ok_or_else(|| AutomationError::script("찾은 영역 없음"))?;
        let location = ctx.bot.tap_region(&region)?;
        ctx.hub.insert(HUB_TAPPED, json!([location.x, location.y]));
        Ok(Jump::End)
    });

    vec![find, tap]
}
