//! 测试工具模块
//!
//! `MemoryStore` 是存储边界的内存实现：`begin` 复制一份当前状态作为事务快照，
//! `commit` 用快照覆盖共享状态，未提交就丢弃的事务不留下任何写入。
//! 面向串行执行的测试，并发事务之间是后提交者覆盖。

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::models::{
    Badge, BadgeRule, BadgeStatus, DataSource, NewLedgerEntry, NewUserBadge, NotificationRecord,
    PointLedgerEntry, RuleKind, Tier, TierReward, UserBadge, UserPointCache,
};
use crate::repository::{
    ActivityStats, BadgeStore, LedgerStore, RewardStore, RoomGameFilter, StoreTx, TxProvider,
};

// ==================== 活动数据 ====================

/// 一次房间参与
#[derive(Debug, Clone)]
pub struct RoomVisit {
    pub user_id: String,
    pub game_code: String,
    pub has_gm: bool,
    pub booking_price: i64,
    pub started_on: NaiveDate,
    /// 参与状态为 active 时才计入统计
    pub active: bool,
}

impl RoomVisit {
    pub fn new(user_id: &str, game_code: &str, started_on: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            game_code: game_code.to_string(),
            has_gm: false,
            booking_price: 0,
            started_on,
            active: true,
        }
    }

    pub fn with_gm(mut self) -> Self {
        self.has_gm = true;
        self
    }

    pub fn with_booking_price(mut self, price: i64) -> Self {
        self.booking_price = price;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// 一次赛事参与
#[derive(Debug, Clone)]
pub struct TournamentEntry {
    pub user_id: String,
    pub game_code: String,
    pub started_on: NaiveDate,
    pub active: bool,
    pub won: bool,
}

impl TournamentEntry {
    pub fn new(user_id: &str, game_code: &str, started_on: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            game_code: game_code.to_string(),
            started_on,
            active: true,
            won: false,
        }
    }

    pub fn won(mut self) -> Self {
        self.won = true;
        self
    }
}

/// 消费记录，只有已兑换发票与已支付预订计入累计消费
#[derive(Debug, Clone)]
pub enum Purchase {
    Invoice { user_id: String, amount: i64, status: String },
    Booking { user_id: String, price: i64, status: String },
}

impl Purchase {
    fn counted_amount(&self, user: &str) -> i64 {
        match self {
            Self::Invoice { user_id, amount, status } if user_id == user && status == "redeemed" => {
                *amount
            }
            Self::Booking { user_id, price, status } if user_id == user && status == "paid" => *price,
            _ => 0,
        }
    }
}

// ==================== 故障注入 ====================

#[derive(Debug, Clone, Default)]
struct Failures {
    begin: bool,
    notification_insert: bool,
    activity_users: BTreeSet<String>,
}

fn injected(what: &str) -> EngineError {
    EngineError::Database(sqlx::Error::Protocol(format!("注入的故障: {what}")))
}

// ==================== 状态 ====================

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<UserPointCache>,
    ledger: Vec<PointLedgerEntry>,
    tiers: Vec<Tier>,
    rewards: Vec<TierReward>,
    notifications: Vec<NotificationRecord>,
    badges: Vec<Badge>,
    rules: Vec<BadgeRule>,
    user_badges: Vec<UserBadge>,
    rooms: Vec<RoomVisit>,
    tournaments: Vec<TournamentEntry>,
    purchases: Vec<Purchase>,
    failures: Failures,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 内存存储
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------- 数据准备 ----------

    pub async fn add_user(&self, user_id: &str, latest_point: i64, latest_tier_id: Option<i64>) {
        let mut state = self.state.lock().await;
        state.users.push(UserPointCache {
            user_id: user_id.to_string(),
            latest_point,
            latest_tier_id,
        });
    }

    pub async fn add_tier(&self, id: i64, name: &str, min_point: i64, max_point: i64) {
        let mut state = self.state.lock().await;
        state.tiers.push(Tier {
            id,
            name: name.to_string(),
            min_point,
            max_point,
        });
    }

    /// 添加一个始终生效的等级权益
    pub async fn add_tier_reward(&self, tier_id: i64, name: &str) -> i64 {
        self.add_tier_reward_with(tier_id, name, "active", None, None).await
    }

    pub async fn add_tier_reward_with(
        &self,
        tier_id: i64,
        name: &str,
        status: &str,
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.rewards.push(TierReward {
            id,
            tier_id,
            name: name.to_string(),
            description: None,
            image_url: None,
            status: status.to_string(),
            start_at,
            end_at,
        });
        id
    }

    pub async fn add_badge(&self, code: &str, category: &str, status: BadgeStatus) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.badges.push(Badge {
            id,
            code: code.to_string(),
            name: code.to_string(),
            category: category.to_string(),
            vp_point: 0,
            status,
            parent_code: None,
            image_url: None,
        });
        id
    }

    pub async fn add_rule(&self, badge_id: i64, key_condition: &str, value: serde_json::Value) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.rules.push(BadgeRule {
            id,
            badge_id,
            key_condition: key_condition.to_string(),
            value_type: "json".to_string(),
            value,
        });
        id
    }

    pub async fn add_room_visit(&self, visit: RoomVisit) {
        self.state.lock().await.rooms.push(visit);
    }

    pub async fn add_tournament_entry(&self, entry: TournamentEntry) {
        self.state.lock().await.tournaments.push(entry);
    }

    pub async fn add_purchase(&self, purchase: Purchase) {
        self.state.lock().await.purchases.push(purchase);
    }

    /// 直接改写积分缓存，用于制造缓存与流水不一致
    pub async fn set_point_cache(&self, user_id: &str, latest_point: i64, latest_tier_id: Option<i64>) {
        let mut state = self.state.lock().await;
        if let Some(cache) = state.users.iter_mut().find(|u| u.user_id == user_id) {
            cache.latest_point = latest_point;
            cache.latest_tier_id = latest_tier_id;
        }
    }

    /// 直接写入一条流水，不经过积分服务
    pub async fn insert_raw_ledger_entry(&self, user_id: &str, point: i64) {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.ledger.push(PointLedgerEntry {
            id,
            user_id: user_id.to_string(),
            data_source: DataSource::Other,
            source_code: format!("RAW-{id}"),
            point,
            created_at: Utc::now(),
        });
    }

    // ---------- 故障注入 ----------

    pub async fn fail_begin(&self, fail: bool) {
        self.state.lock().await.failures.begin = fail;
    }

    pub async fn fail_notification_inserts(&self, fail: bool) {
        self.state.lock().await.failures.notification_insert = fail;
    }

    /// 该用户的活动统计查询全部失败
    pub async fn fail_activity_for(&self, user_id: &str) {
        self.state
            .lock()
            .await
            .failures
            .activity_users
            .insert(user_id.to_string());
    }

    // ---------- 断言辅助 ----------

    pub async fn point_cache(&self, user_id: &str) -> Option<UserPointCache> {
        let state = self.state.lock().await;
        state.users.iter().find(|u| u.user_id == user_id).cloned()
    }

    pub async fn ledger_entries(&self, user_id: &str) -> Vec<PointLedgerEntry> {
        let state = self.state.lock().await;
        state.ledger.iter().filter(|e| e.user_id == user_id).cloned().collect()
    }

    pub async fn notifications(&self, user_id: &str) -> Vec<NotificationRecord> {
        let state = self.state.lock().await;
        state
            .notifications
            .iter()
            .filter(|n| n.receiver_code == user_id)
            .cloned()
            .collect()
    }

    pub async fn user_badges(&self) -> Vec<UserBadge> {
        self.state.lock().await.user_badges.clone()
    }

    pub async fn user_badges_for(&self, badge_id: i64) -> Vec<UserBadge> {
        let state = self.state.lock().await;
        state
            .user_badges
            .iter()
            .filter(|b| b.badge_id == badge_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TxProvider for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let state = self.state.lock().await;
        if state.failures.begin {
            return Err(injected("begin"));
        }
        Ok(MemoryTx {
            snapshot: state.clone(),
            shared: self.state.clone(),
        })
    }
}

/// 内存事务
pub struct MemoryTx {
    snapshot: MemoryState,
    shared: Arc<Mutex<MemoryState>>,
}

impl MemoryTx {
    fn check_activity(&self, user_id: &str) -> Result<()> {
        if self.snapshot.failures.activity_users.contains(user_id) {
            return Err(injected("activity"));
        }
        Ok(())
    }

    fn active_rooms<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a RoomVisit> + 'a {
        self.snapshot
            .rooms
            .iter()
            .filter(move |r| r.user_id == user_id && r.active)
    }

    fn active_tournaments<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = &'a TournamentEntry> + 'a {
        self.snapshot
            .tournaments
            .iter()
            .filter(move |t| t.user_id == user_id && t.active)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self) -> Result<()> {
        *self.shared.lock().await = self.snapshot;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryTx {
    async fn get_point_cache(&mut self, user_id: &str) -> Result<Option<UserPointCache>> {
        Ok(self.snapshot.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn lock_point_cache(&mut self, user_id: &str) -> Result<Option<UserPointCache>> {
        self.get_point_cache(user_id).await
    }

    async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<i64> {
        let id = self.snapshot.next_id();
        self.snapshot.ledger.push(PointLedgerEntry {
            id,
            user_id: entry.user_id.clone(),
            data_source: entry.data_source,
            source_code: entry.source_code.clone(),
            point: entry.point,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_point_cache(&mut self, cache: &UserPointCache) -> Result<()> {
        if let Some(row) = self.snapshot.users.iter_mut().find(|u| u.user_id == cache.user_id) {
            *row = cache.clone();
        }
        Ok(())
    }

    async fn sum_ledger(&mut self, user_id: &str) -> Result<i64> {
        Ok(self
            .snapshot
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.point)
            .sum())
    }

    async fn list_tiers(&mut self) -> Result<Vec<Tier>> {
        let mut tiers = self.snapshot.tiers.clone();
        tiers.sort_by_key(|t| t.min_point);
        Ok(tiers)
    }
}

#[async_trait]
impl RewardStore for MemoryTx {
    async fn list_active_tier_rewards(
        &mut self,
        tier_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TierReward>> {
        Ok(self
            .snapshot
            .rewards
            .iter()
            .filter(|r| r.tier_id == tier_id && r.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn insert_notification(&mut self, record: &NotificationRecord) -> Result<()> {
        if self.snapshot.failures.notification_insert {
            return Err(injected("notification"));
        }
        self.snapshot.notifications.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ActivityStats for MemoryTx {
    async fn count_room_games(&mut self, user_id: &str, filter: &RoomGameFilter) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .active_rooms(user_id)
            .filter(|r| filter.game_codes.contains(&r.game_code))
            .filter(|r| !filter.need_gm || r.has_gm)
            .filter(|r| r.booking_price >= filter.min_booking_price)
            .count() as i64)
    }

    async fn count_tournament_games(&mut self, user_id: &str, game_codes: &[String]) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .active_tournaments(user_id)
            .filter(|t| game_codes.contains(&t.game_code))
            .count() as i64)
    }

    async fn count_rooms_between(
        &mut self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .active_rooms(user_id)
            .filter(|r| from <= r.started_on && r.started_on <= until)
            .count() as i64)
    }

    async fn count_tournaments_between(
        &mut self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .active_tournaments(user_id)
            .filter(|t| from <= t.started_on && t.started_on <= until)
            .count() as i64)
    }

    async fn count_rooms_since(&mut self, user_id: &str, from: NaiveDate) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self.active_rooms(user_id).filter(|r| from <= r.started_on).count() as i64)
    }

    async fn count_tournaments_since(&mut self, user_id: &str, from: NaiveDate) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .active_tournaments(user_id)
            .filter(|t| from <= t.started_on)
            .count() as i64)
    }

    async fn total_spend(&mut self, user_id: &str) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .snapshot
            .purchases
            .iter()
            .map(|p| p.counted_amount(user_id))
            .sum())
    }

    async fn count_tournament_wins(&mut self, user_id: &str) -> Result<i64> {
        self.check_activity(user_id)?;
        Ok(self
            .snapshot
            .tournaments
            .iter()
            .filter(|t| t.user_id == user_id && t.won)
            .count() as i64)
    }

    async fn count_distinct_games_played(&mut self, user_id: &str) -> Result<i64> {
        self.check_activity(user_id)?;
        let games: BTreeSet<&str> = self
            .active_rooms(user_id)
            .map(|r| r.game_code.as_str())
            .chain(self.active_tournaments(user_id).map(|t| t.game_code.as_str()))
            .collect();
        Ok(games.len() as i64)
    }
}

#[async_trait]
impl BadgeStore for MemoryTx {
    async fn find_badge_by_code(&mut self, code: &str) -> Result<Option<Badge>> {
        Ok(self.snapshot.badges.iter().find(|b| b.code == code).cloned())
    }

    async fn get_badge(&mut self, badge_id: i64) -> Result<Option<Badge>> {
        Ok(self.snapshot.badges.iter().find(|b| b.id == badge_id).cloned())
    }

    async fn list_badge_rules(&mut self, badge_id: i64) -> Result<Vec<BadgeRule>> {
        let mut rules: Vec<BadgeRule> = self
            .snapshot
            .rules
            .iter()
            .filter(|r| r.badge_id == badge_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn list_badges_with_rule_kind(&mut self, kind: RuleKind) -> Result<Vec<Badge>> {
        let badge_ids: BTreeSet<i64> = self
            .snapshot
            .rules
            .iter()
            .filter(|r| r.key_condition == kind.as_str())
            .map(|r| r.badge_id)
            .collect();
        Ok(self
            .snapshot
            .badges
            .iter()
            .filter(|b| badge_ids.contains(&b.id))
            .cloned()
            .collect())
    }

    async fn list_user_ids(&mut self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.snapshot.users.iter().map(|u| u.user_id.clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn user_badge_exists(&mut self, user_id: &str, badge_id: i64) -> Result<bool> {
        Ok(self
            .snapshot
            .user_badges
            .iter()
            .any(|b| b.user_id == user_id && b.badge_id == badge_id))
    }

    async fn insert_user_badge(&mut self, badge: &NewUserBadge) -> Result<bool> {
        if self.user_badge_exists(&badge.user_id, badge.badge_id).await? {
            return Ok(false);
        }
        self.snapshot.user_badges.push(UserBadge {
            user_id: badge.user_id.clone(),
            badge_id: badge.badge_id,
            is_claim: false,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn delete_user_badge(&mut self, user_id: &str, badge_id: i64) -> Result<bool> {
        let before = self.snapshot.user_badges.len();
        self.snapshot
            .user_badges
            .retain(|b| !(b.user_id == user_id && b.badge_id == badge_id));
        Ok(self.snapshot.user_badges.len() < before)
    }
}
