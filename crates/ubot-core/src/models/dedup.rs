//! 근접 탐지 좌표 중복 제거.
//!
//! 좌상단 좌표 기준으로 가까운 후보들을 하나의 클러스터로 묶고,
//! 클러스터마다 면적이 가장 작은 영역 하나만 남긴다.
//!
//! 최근접 탐색은 한 변이 `distance`인 균일 그리드 인덱스를 사용한다.
//! 임계 거리 안의 점은 항상 인접 3x3 셀 안에 있으므로 그 셀들만 검사하면 된다.

use std::collections::HashMap;

use super::geometry::{Location, Region};

/// 클러스터 상태
struct Cluster {
    /// 클러스터를 만든 첫 좌표 (최근접 탐색 기준점)
    seed: Location,
    /// 현재 대표 항목 인덱스
    best: usize,
    /// 대표 항목 면적
    best_area: i64,
}

/// 그리드 셀 → 클러스터 인덱스 목록
struct GridIndex {
    cell: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl GridIndex {
    fn new(cell: f64) -> Self {
        Self {
            cell,
            cells: HashMap::new(),
        }
    }

    fn key(&self, loc: &Location) -> (i64, i64) {
        (
            (f64::from(loc.x) / self.cell).floor() as i64,
            (f64::from(loc.y) / self.cell).floor() as i64,
        )
    }

    fn insert(&mut self, loc: &Location, cluster: usize) {
        let key = self.key(loc);
        self.cells.entry(key).or_default().push(cluster);
    }

    /// `distance` 이내 최근접 클러스터 (동률이면 먼저 생성된 클러스터)
    fn nearest_within(&self, loc: &Location, clusters: &[Cluster], distance: f64) -> Option<usize> {
        let (cx, cy) = self.key(loc);
        let mut nearest: Option<(usize, f64)> = None;

        for gx in cx - 1..=cx + 1 {
            for gy in cy - 1..=cy + 1 {
                let Some(members) = self.cells.get(&(gx, gy)) else {
                    continue;
                };
                for &idx in members {
                    let d = clusters[idx].seed.distance(loc);
                    if d > distance {
                        continue;
                    }
                    let closer = match nearest {
                        None => true,
                        Some((best_idx, best_d)) => d < best_d || (d == best_d && idx < best_idx),
                    };
                    if closer {
                        nearest = Some((idx, d));
                    }
                }
            }
        }

        nearest.map(|(idx, _)| idx)
    }
}

/// 영역 목록 중복 제거
///
/// 첫 후보가 첫 클러스터가 되고, 이후 후보는 기존 클러스터 기준점과의 최근접 거리가
/// `distance`를 넘을 때만 새 클러스터를 만든다. 결과는 클러스터 생성 순서.
pub fn filter_similar_coords(coords: &[Region], distance: f64) -> Vec<Region> {
    filter_similar_by(coords.to_vec(), distance, |region| *region)
}

/// 영역을 가진 임의 항목의 중복 제거 (예: 점수가 붙은 탐지 결과)
pub fn filter_similar_by<T, F>(items: Vec<T>, distance: f64, region_of: F) -> Vec<T>
where
    F: Fn(&T) -> Region,
{
    if items.is_empty() {
        return items;
    }

    let distance = if distance.is_finite() {
        distance.max(0.0)
    } else {
        0.0
    };
    let mut index = GridIndex::new(distance.max(1.0));
    let mut clusters: Vec<Cluster> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let region = region_of(item);
        let loc = region.to_location();
        let area = region.area();

        match index.nearest_within(&loc, &clusters, distance) {
            Some(c) => {
                let cluster = &mut clusters[c];
                if area < cluster.best_area {
                    cluster.best = i;
                    cluster.best_area = area;
                }
            }
            None => {
                index.insert(&loc, clusters.len());
                clusters.push(Cluster {
                    seed: loc,
                    best: i,
                    best_area: area,
                });
            }
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    clusters
        .iter()
        .filter_map(|cluster| slots[cluster.best].take())
        .collect()
}
