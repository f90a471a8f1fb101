//! 存储边界 Trait 定义
//!
//! 引擎的所有读写都发生在一个事务对象上：服务层依赖这些抽象，
//! PostgreSQL 事务与内存事务各自实现，评估器可以直接用 mock 测试。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::{
    Badge, BadgeRule, NewLedgerEntry, NewUserBadge, NotificationRecord, RuleKind, Tier,
    TierReward, UserPointCache,
};

/// 指定品类房间参与次数的过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomGameFilter {
    pub game_codes: Vec<String>,
    /// 要求房间有 GM 主持
    pub need_gm: bool,
    /// 房间预订价格下限，0 表示不限制
    pub min_booking_price: i64,
}

/// 积分流水与积分缓存
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send {
    /// 读取用户的积分缓存（不加锁），用户不存在时返回 None
    async fn get_point_cache(&mut self, user_id: &str) -> Result<Option<UserPointCache>>;

    /// 读取并锁定用户的积分缓存行，用户不存在时返回 None
    ///
    /// 同一用户的积分写入依靠这把行锁串行化
    async fn lock_point_cache(&mut self, user_id: &str) -> Result<Option<UserPointCache>>;

    /// 追加一条流水，返回流水 ID
    async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<i64>;

    async fn update_point_cache(&mut self, cache: &UserPointCache) -> Result<()>;

    /// 用户全部流水之和，没有流水时为 0
    async fn sum_ledger(&mut self, user_id: &str) -> Result<i64>;

    async fn list_tiers(&mut self) -> Result<Vec<Tier>>;
}

/// 等级权益与通知记录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardStore: Send {
    /// 某等级在 now 时刻生效中的权益
    async fn list_active_tier_rewards(
        &mut self,
        tier_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TierReward>>;

    async fn insert_notification(&mut self, record: &NotificationRecord) -> Result<()>;
}

/// 规则评估所需的活动聚合统计
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityStats: Send {
    /// 指定游戏的房间参与次数，可附加 GM 与预订价格条件
    async fn count_room_games(&mut self, user_id: &str, filter: &RoomGameFilter) -> Result<i64>;

    /// 指定游戏的赛事参与次数
    async fn count_tournament_games(&mut self, user_id: &str, game_codes: &[String])
    -> Result<i64>;

    /// [from, until] 日期窗口内的房间参与次数（含两端）
    async fn count_rooms_between(
        &mut self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64>;

    async fn count_tournaments_between(
        &mut self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64>;

    /// 自 from 起（不设终点）的房间参与次数
    async fn count_rooms_since(&mut self, user_id: &str, from: NaiveDate) -> Result<i64>;

    async fn count_tournaments_since(&mut self, user_id: &str, from: NaiveDate) -> Result<i64>;

    /// 已兑换发票金额与已支付预订金额之和
    async fn total_spend(&mut self, user_id: &str) -> Result<i64>;

    async fn count_tournament_wins(&mut self, user_id: &str) -> Result<i64>;

    /// 参与过的不同游戏数量（房间与赛事合并去重）
    async fn count_distinct_games_played(&mut self, user_id: &str) -> Result<i64>;
}

/// 徽章、规则与用户徽章
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BadgeStore: Send {
    async fn find_badge_by_code(&mut self, code: &str) -> Result<Option<Badge>>;

    async fn get_badge(&mut self, badge_id: i64) -> Result<Option<Badge>>;

    /// 按规则 ID 升序返回，即评估顺序
    async fn list_badge_rules(&mut self, badge_id: i64) -> Result<Vec<BadgeRule>>;

    /// 含有指定类型规则的徽章（去重）
    async fn list_badges_with_rule_kind(&mut self, kind: RuleKind) -> Result<Vec<Badge>>;

    async fn list_user_ids(&mut self) -> Result<Vec<String>>;

    async fn user_badge_exists(&mut self, user_id: &str, badge_id: i64) -> Result<bool>;

    /// 插入用户徽章，唯一键冲突时不插入并返回 false
    async fn insert_user_badge(&mut self, badge: &NewUserBadge) -> Result<bool>;

    /// 删除用户徽章，返回是否确有一行被删除
    async fn delete_user_badge(&mut self, user_id: &str, badge_id: i64) -> Result<bool>;
}

/// 一个存储事务
///
/// 未调用 commit 就被丢弃时回滚
#[async_trait]
pub trait StoreTx: LedgerStore + RewardStore + ActivityStats + BadgeStore + Sized {
    async fn commit(self) -> Result<()>;
}

/// 事务工厂
#[async_trait]
pub trait TxProvider: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx>;
}
