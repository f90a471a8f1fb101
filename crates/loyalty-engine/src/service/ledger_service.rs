//! 积分流水服务
//!
//! 记录积分的完整流程：
//!
//! 1. 锁定用户积分缓存行 -> 2. 追加流水 -> 3. 以缓存值 + 变动计算新总分
//!    -> 4. 解析新等级 -> 5. 回写缓存 -> 6. 等级变化时写入通知
//!    -> 7. 提交事务 -> 8. 投递通知（异步，失败不影响主流程）
//!
//! 1-6 在同一事务内完成，任一步失败整体回滚。新总分读取的是缓存而不是重新求和，
//! 因此缓存必须始终与流水之和保持一致，`reconcile` 用于核对与修复。

use std::sync::Arc;

use chrono::Utc;
use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::observability::metrics;
use tracing::{info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::models::{NewLedgerEntry, UserPointCache};
use crate::repository::{LedgerStore, RewardStore, StoreTx, TxProvider};
use crate::service::dto::{LedgerOutcome, PointSummary, ReconcileReport, RecordPointsRequest};
use crate::service::notification_sink::{NotificationSink, deliver_detached};
use crate::service::tier::TierTable;
use crate::service::tier_notifier::{notify_tier_change, tier_direction};

/// 从存储加载当前等级表
pub async fn load_tier_table<S>(store: &mut S, config: &LoyaltyConfig) -> Result<TierTable>
where
    S: LedgerStore + ?Sized,
{
    let tiers = store.list_tiers().await?;
    TierTable::new(tiers, config.legend_tier_id, &config.legend_tier_name)
}

/// 在调用方持有的事务中记录积分
///
/// 不提交事务：调用方可以把积分与自身的业务写入放在同一个事务里。
/// 通知记录已写入事务，但不会投递。
#[instrument(skip(store, config), fields(user_id = %request.user_id, delta = request.delta))]
pub async fn record_points_in<S>(
    store: &mut S,
    config: &LoyaltyConfig,
    request: &RecordPointsRequest,
) -> Result<LedgerOutcome>
where
    S: LedgerStore + RewardStore + ?Sized,
{
    request.validate()?;

    let cache = store
        .lock_point_cache(&request.user_id)
        .await?
        .ok_or_else(|| EngineError::UserNotFound(request.user_id.clone()))?;

    let new_total =
        cache
            .latest_point
            .checked_add(request.delta)
            .ok_or_else(|| EngineError::PointOverflow {
                user_id: request.user_id.clone(),
                current: cache.latest_point,
                delta: request.delta,
            })?;

    let entry_id = store
        .append_ledger_entry(&NewLedgerEntry {
            user_id: request.user_id.clone(),
            data_source: request.data_source,
            source_code: request.source_code.clone(),
            point: request.delta,
        })
        .await?;

    let table = load_tier_table(store, config).await?;
    let new_tier = table.resolve(new_total).clone();

    store
        .update_point_cache(&UserPointCache {
            user_id: request.user_id.clone(),
            latest_point: new_total,
            latest_tier_id: Some(new_tier.id),
        })
        .await?;

    let mut notifications = Vec::new();
    let mut transition = None;
    if cache.latest_tier_id != Some(new_tier.id) {
        let old_tier = cache.latest_tier_id.and_then(|id| table.get(id));
        transition = Some(tier_direction(old_tier, &new_tier));
        notifications =
            notify_tier_change(store, &request.user_id, old_tier, &new_tier, Utc::now()).await?;
    }

    Ok(LedgerOutcome {
        entry_id,
        previous_total: cache.latest_point,
        new_total,
        previous_tier_id: cache.latest_tier_id,
        tier: new_tier,
        transition,
        notifications,
    })
}

/// 积分流水服务
pub struct PointLedgerService<P: TxProvider> {
    provider: P,
    config: LoyaltyConfig,
    notification_sink: Option<Arc<dyn NotificationSink>>,
}

impl<P: TxProvider> PointLedgerService<P> {
    pub fn new(provider: P, config: LoyaltyConfig) -> Self {
        Self {
            provider,
            config,
            notification_sink: None,
        }
    }

    /// 设置通知投递端，未设置时通知只落库
    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    /// 记录积分（独立事务）
    ///
    /// 任何写入失败都会回滚流水、缓存与通知，对请求方表现为内部错误
    #[instrument(skip(self), fields(user_id = %request.user_id, source = request.data_source.as_str()))]
    pub async fn record_points(&self, request: RecordPointsRequest) -> Result<LedgerOutcome> {
        let mut tx = self.provider.begin().await?;
        let outcome = record_points_in(&mut tx, &self.config, &request).await?;
        tx.commit().await?;

        metrics::record_points(request.data_source.as_str());
        info!(
            entry_id = outcome.entry_id,
            new_total = outcome.new_total,
            tier_id = outcome.tier.id,
            "积分已记录"
        );

        if let Some(direction) = outcome.transition {
            metrics::record_tier_transition(direction.as_str());
            info!(
                previous_tier_id = ?outcome.previous_tier_id,
                new_tier = %outcome.tier.name,
                direction = direction.as_str(),
                "用户等级已变更"
            );

            if let Some(sink) = &self.notification_sink {
                deliver_detached(sink.clone(), outcome.notifications.clone());
            }
        }

        Ok(outcome)
    }

    /// 积分概览：缓存总分及其对应等级（只读事务，不加行锁，结束时直接丢弃不提交）
    #[instrument(skip(self))]
    pub async fn point_summary(&self, user_id: &str) -> Result<PointSummary> {
        let mut tx = self.provider.begin().await?;
        let cache = tx
            .get_point_cache(user_id)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))?;
        let table = load_tier_table(&mut tx, &self.config).await?;

        Ok(PointSummary {
            user_id: user_id.to_string(),
            total: cache.latest_point,
            tier: table.resolve(cache.latest_point).clone(),
        })
    }

    /// 核对积分缓存与流水之和
    ///
    /// `repair` 为 true 且不一致时，以流水之和及其等级改写缓存，不产生通知
    #[instrument(skip(self))]
    pub async fn reconcile(&self, user_id: &str, repair: bool) -> Result<ReconcileReport> {
        let mut tx = self.provider.begin().await?;
        let cache = tx
            .lock_point_cache(user_id)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))?;
        let ledger_point = tx.sum_ledger(user_id).await?;
        let table = load_tier_table(&mut tx, &self.config).await?;
        let expected_tier_id = table.resolve(ledger_point).id;

        let mut report = ReconcileReport {
            user_id: user_id.to_string(),
            cached_point: cache.latest_point,
            ledger_point,
            cached_tier_id: cache.latest_tier_id,
            expected_tier_id,
            repaired: false,
        };

        if report.is_consistent() {
            return Ok(report);
        }

        warn!(
            cached_point = report.cached_point,
            ledger_point = report.ledger_point,
            cached_tier_id = ?report.cached_tier_id,
            expected_tier_id,
            "积分缓存与流水不一致"
        );

        if repair {
            tx.update_point_cache(&UserPointCache {
                user_id: user_id.to_string(),
                latest_point: ledger_point,
                latest_tier_id: Some(expected_tier_id),
            })
            .await?;
            tx.commit().await?;
            report.repaired = true;
            info!("积分缓存已按流水修复");
        }

        Ok(report)
    }
}
