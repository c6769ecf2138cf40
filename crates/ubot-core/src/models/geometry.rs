//! 화면 좌표 값 타입.
//!
//! 모든 좌표는 프레임 픽셀 단위 정수이며 원점은 좌상단.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 화면상의 점 (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

/// 축 정렬 사각형 영역 (좌상단 x, y + 너비/높이)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Location {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// (dx, dy)만큼 이동한 새 좌표
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// 균일 배율 (소수점 버림)
    pub fn scale(&self, factor: f64) -> Self {
        self.scale_xy(factor, factor)
    }

    /// 축별 배율 (소수점 버림)
    pub fn scale_xy(&self, fx: f64, fy: f64) -> Self {
        Self::new(truncate(self.x, fx), truncate(self.y, fy))
    }

    /// `region` 경계 포함 내부 여부
    pub fn inside(&self, region: &Region) -> bool {
        region.x <= self.x
            && self.x <= region.right()
            && region.y <= self.y
            && self.y <= region.bottom()
    }

    /// `region` 바깥 여부
    pub fn outside(&self, region: &Region) -> bool {
        !self.inside(region)
    }

    /// 이 점을 좌상단으로 하는 영역
    pub fn to_region(&self, width: i32, height: i32) -> Region {
        Region::new(self.x, self.y, width, height)
    }

    /// 유클리드 거리
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy)
    }
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 우측 경계 (x + width)
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// 하단 경계 (y + height)
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// 면적
    pub fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }

    /// 중심점 (정수 나눗셈)
    pub fn center(&self) -> Location {
        Location::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// 균일 배율 (좌표/크기 모두, 소수점 버림)
    pub fn scale(&self, factor: f64) -> Self {
        self.scale_xy(factor, factor)
    }

    /// 축별 배율
    pub fn scale_xy(&self, fx: f64, fy: f64) -> Self {
        Self::new(
            truncate(self.x, fx),
            truncate(self.y, fy),
            truncate(self.width, fx),
            truncate(self.height, fy),
        )
    }

    /// `other` 안에 완전히 포함되는지
    pub fn inside(&self, other: &Region) -> bool {
        other.x <= self.x
            && self.right() <= other.right()
            && other.y <= self.y
            && self.bottom() <= other.bottom()
    }

    /// `other`와 완전히 떨어져 있는지 (경계 접촉은 바깥 아님)
    pub fn outside(&self, other: &Region) -> bool {
        self.right() < other.x
            || self.x > other.right()
            || self.bottom() < other.y
            || self.y > other.bottom()
    }

    /// 두 영역의 교집합. 겹치지 않으면 `None`
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(Region::new(x, y, right - x, bottom - y))
    }

    /// 좌상단 좌표
    pub fn to_location(&self) -> Location {
        Location::new(self.x, self.y)
    }

    /// 좌상단 좌표 간 유클리드 거리
    pub fn distance(&self, other: &Region) -> f64 {
        self.to_location().distance(&other.to_location())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

impl From<(i32, i32)> for Location {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl From<(i32, i32, i32, i32)> for Region {
    fn from((x, y, width, height): (i32, i32, i32, i32)) -> Self {
        Self::new(x, y, width, height)
    }
}

fn truncate(value: i32, factor: f64) -> i32 {
    (f64::from(value) * factor) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_keeps_size() {
        let region = Region::new(10, 10, 5, 6).translate(-3, 4);
        assert_eq!(region, Region::new(7, 14, 5, 6));
        assert_eq!(Location::new(1, 1).translate(2, 3), Location::new(3, 4));
    }

    #[test]
    fn scale_truncates() {
        let region = Region::new(10, 15, 21, 33);
        assert_eq!(region.scale(0.5), Region::new(5, 7, 10, 16));
        assert_eq!(region.scale_xy(2.0, 1.0), Region::new(20, 15, 42, 33));
        assert_eq!(Location::new(7, 9).scale(0.5), Location::new(3, 4));
    }

    #[test]
    fn inside_and_outside() {
        let screen = Region::new(0, 0, 100, 100);
        assert!(Region::new(10, 10, 20, 20).inside(&screen));
        assert!(!Region::new(90, 90, 20, 20).inside(&screen));
        assert!(Region::new(200, 0, 5, 5).outside(&screen));
        // 일부만 겹치면 inside도 outside도 아님
        let partial = Region::new(90, 90, 20, 20);
        assert!(!partial.outside(&screen));

        assert!(Location::new(100, 100).inside(&screen));
        assert!(Location::new(101, 50).outside(&screen));
    }

    #[test]
    fn intersect_regions() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Region::new(5, 5, 5, 5)));
        assert_eq!(a.intersect(&Region::new(20, 20, 5, 5)), None);
    }

    #[test]
    fn distance_between_top_left_points() {
        let a = Region::new(0, 0, 50, 50);
        let b = Region::new(3, 4, 1, 1);
        assert!((a.distance(&b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn area_and_center() {
        let region = Region::new(10, 20, 30, 40);
        assert_eq!(region.area(), 1200);
        assert_eq!(region.center(), Location::new(25, 40));
    }
}
