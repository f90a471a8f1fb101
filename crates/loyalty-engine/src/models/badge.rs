//! 徽章、徽章规则与用户徽章实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{BadgeStatus, RuleKind};

/// 徽章定义
///
/// 与规则相互独立，可以被独立目录或赛事奖励等多处引用
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Badge {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// 徽章分类，time_limit 规则据此区分限时（time_limit）与终身（life_time）
    pub category: String,
    /// 授予后附带的 VP 积分
    pub vp_point: i64,
    pub status: BadgeStatus,
    #[sqlx(default)]
    pub parent_code: Option<String>,
    #[sqlx(default)]
    pub image_url: Option<String>,
}

impl Badge {
    pub fn is_active(&self) -> bool {
        self.status == BadgeStatus::Active
    }
}

/// 徽章规则
///
/// key_condition 为规则类型的字符串标签，value 为不透明的 JSON 载荷，
/// 由评估器按规则类型解码
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BadgeRule {
    pub id: i64,
    pub badge_id: i64,
    pub key_condition: String,
    pub value_type: String,
    pub value: serde_json::Value,
}

impl BadgeRule {
    /// 解析规则类型，无法识别时返回 None
    pub fn kind(&self) -> Option<RuleKind> {
        self.key_condition.parse().ok()
    }
}

/// 用户徽章
///
/// 每个 (user_id, badge_id) 至多一行，由授予器以 is_claim = false 创建
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserBadge {
    pub user_id: String,
    pub badge_id: i64,
    pub is_claim: bool,
    pub created_at: DateTime<Utc>,
}

/// 待写入的用户徽章
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserBadge {
    pub user_id: String,
    pub badge_id: i64,
}
