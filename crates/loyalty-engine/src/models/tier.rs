//! 等级与等级权益实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 等级
///
/// [min_point, max_point] 为闭区间，各等级区间互不重叠
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tier {
    pub id: i64,
    pub name: String,
    pub min_point: i64,
    pub max_point: i64,
}

impl Tier {
    pub fn contains(&self, total: i64) -> bool {
        self.min_point <= total && total <= self.max_point
    }
}

/// 等级附带的权益
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TierReward {
    pub id: i64,
    pub tier_id: i64,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    #[sqlx(default)]
    pub image_url: Option<String>,
    /// active / inactive
    pub status: String,
    #[sqlx(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub end_at: Option<DateTime<Utc>>,
}

impl TierReward {
    /// 状态为 active 且处于生效时间窗口内
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == "active"
            && self.start_at.is_none_or(|start| start <= now)
            && self.end_at.is_none_or(|end| now <= end)
    }
}
