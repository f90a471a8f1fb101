//! 积分流水与积分缓存实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::DataSource;

/// 积分流水
///
/// 写入后不可变，用户全部流水之和即其逻辑总积分
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PointLedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub data_source: DataSource,
    /// 来源业务对象编码（房间编码、赛事编码、兑换 ID 等）
    pub source_code: String,
    /// 有符号积分变动
    pub point: i64,
    pub created_at: DateTime<Utc>,
}

/// 待写入的积分流水
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub data_source: DataSource,
    pub source_code: String,
    pub point: i64,
}

/// 用户积分缓存
///
/// 存储在用户记录上的物化视图：同一事务内写流水后必须等于流水之和及其对应等级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPointCache {
    pub user_id: String,
    pub latest_point: i64,
    /// 尚未计算过等级的新用户为空
    #[sqlx(default)]
    pub latest_tier_id: Option<i64>,
}
