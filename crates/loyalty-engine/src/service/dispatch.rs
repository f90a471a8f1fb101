//! 徽章评估分发
//!
//! 两个入口共享同一套评估与授予逻辑，区别只在遍历维度：
//!
//! - `fan_out_badge`：徽章或其规则集变更后，对全部用户评估这一个徽章
//! - `check_user_condition`：用户完成某类行为后，对含有该类规则的全部徽章评估这一个用户
//!
//! 每个用户/徽章组合在独立事务中评估并授予，单个组合失败只记录日志并计数，
//! 不影响其余组合。徽章、规则和用户列表每次都重新读取，规则修改在下一次分发时生效。

use async_trait::async_trait;
use loyalty_shared::kafka::KafkaProducer;
use loyalty_shared::messages::BadgeChangedMessage;
use loyalty_shared::observability::metrics;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::{Badge, BadgeRule, RuleKind};
use crate::repository::{BadgeStore, StoreTx, TxProvider};
use crate::service::awarder::award_if_eligible;
use crate::service::dto::{AwardOutcome, DispatchReport};
use crate::service::evaluator::RuleEvaluator;

/// 徽章评估分发器
pub struct BadgeDispatcher<P: TxProvider> {
    provider: P,
    evaluator: RuleEvaluator,
}

impl<P: TxProvider> BadgeDispatcher<P> {
    pub fn new(provider: P, evaluator: RuleEvaluator) -> Self {
        Self {
            provider,
            evaluator,
        }
    }

    /// 对全部用户评估一个徽章
    ///
    /// 徽章不存在或未上线时直接返回空报告
    #[instrument(skip(self))]
    pub async fn fan_out_badge(&self, badge_code: &str) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        let mut tx = self.provider.begin().await?;
        let Some(badge) = tx.find_badge_by_code(badge_code).await? else {
            warn!("徽章不存在，跳过扇出");
            return Ok(report);
        };
        if !badge.is_active() {
            info!(status = ?badge.status, "徽章未上线，跳过扇出");
            return Ok(report);
        }
        let rules = tx.list_badge_rules(badge.id).await?;
        let user_ids = tx.list_user_ids().await?;
        drop(tx);

        for user_id in &user_ids {
            match self.evaluate_pair(user_id, &badge, &rules).await {
                Ok(outcome) => {
                    if outcome == AwardOutcome::Awarded {
                        metrics::record_badge_award("fanout");
                    }
                    report.record(outcome);
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "用户徽章评估失败，已跳过");
                    report.record_failure();
                }
            }
        }

        info!(
            users = user_ids.len(),
            awarded = report.awarded,
            already_awarded = report.already_awarded,
            ineligible = report.ineligible,
            failed = report.failed,
            "徽章扇出完成"
        );
        Ok(report)
    }

    /// 对含有指定类型规则的全部徽章评估一个用户
    #[instrument(skip(self))]
    pub async fn check_user_condition(
        &self,
        user_id: &str,
        kind: RuleKind,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        let mut tx = self.provider.begin().await?;
        let badges = tx.list_badges_with_rule_kind(kind).await?;
        drop(tx);

        for badge in badges.iter().filter(|b| b.is_active()) {
            match self.evaluate_badge_for_user(user_id, badge).await {
                Ok(outcome) => {
                    if outcome == AwardOutcome::Awarded {
                        metrics::record_badge_award("user_check");
                    }
                    report.record(outcome);
                }
                Err(e) => {
                    warn!(badge_code = %badge.code, error = %e, "徽章评估失败，已跳过");
                    report.record_failure();
                }
            }
        }

        info!(
            candidates = badges.len(),
            awarded = report.awarded,
            failed = report.failed,
            "用户条件检查完成"
        );
        Ok(report)
    }

    async fn evaluate_badge_for_user(&self, user_id: &str, badge: &Badge) -> Result<AwardOutcome> {
        let mut tx = self.provider.begin().await?;
        let rules = tx.list_badge_rules(badge.id).await?;
        let outcome = award_if_eligible(&mut tx, &self.evaluator, user_id, badge, &rules).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn evaluate_pair(
        &self,
        user_id: &str,
        badge: &Badge,
        rules: &[BadgeRule],
    ) -> Result<AwardOutcome> {
        let mut tx = self.provider.begin().await?;
        let outcome = award_if_eligible(&mut tx, &self.evaluator, user_id, badge, rules).await?;
        tx.commit().await?;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// BadgeChangePublisher
// ---------------------------------------------------------------------------

/// 徽章变更发布接口
///
/// 徽章或其规则集变更后调用，触发异步扇出评估
#[async_trait]
pub trait BadgeChangePublisher: Send + Sync {
    async fn publish_badge_changed(&self, badge_code: &str) -> Result<()>;
}

/// 基于 Kafka 的徽章变更发布者，以徽章编码作为消息 key
pub struct KafkaBadgeChangePublisher {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaBadgeChangePublisher {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl BadgeChangePublisher for KafkaBadgeChangePublisher {
    async fn publish_badge_changed(&self, badge_code: &str) -> Result<()> {
        let message = BadgeChangedMessage::new(badge_code);
        message.validate()?;

        self.producer
            .send_json(&self.topic, &message.badge_code, &message)
            .await?;

        info!(badge_code, topic = %self.topic, "徽章变更消息已发布");
        Ok(())
    }
}
