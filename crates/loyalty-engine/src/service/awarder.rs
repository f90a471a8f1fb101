//! 徽章授予
//!
//! 每个 (user_id, badge_id) 至多授予一次。已授予是单向闸门：
//! 存在用户徽章行后不再评估该组合。

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::models::{Badge, BadgeRule, NewUserBadge};
use crate::repository::{ActivityStats, BadgeStore};
use crate::service::dto::AwardOutcome;
use crate::service::evaluator::RuleEvaluator;

/// 幂等写入用户徽章（is_claim = false）
///
/// 先查存在性，再插入；两个并发评估都看到"不存在"时，
/// 后到的插入因唯一键冲突不生效，同样视为已授予而不是错误
#[instrument(skip(store))]
pub async fn grant_badge<S>(store: &mut S, user_id: &str, badge_id: i64) -> Result<AwardOutcome>
where
    S: BadgeStore + ?Sized,
{
    if store.user_badge_exists(user_id, badge_id).await? {
        debug!("用户已持有该徽章，跳过");
        return Ok(AwardOutcome::AlreadyAwarded);
    }

    let inserted = store
        .insert_user_badge(&NewUserBadge {
            user_id: user_id.to_string(),
            badge_id,
        })
        .await?;

    if inserted {
        info!("徽章已授予");
        Ok(AwardOutcome::Awarded)
    } else {
        debug!("并发授予冲突，按已授予处理");
        Ok(AwardOutcome::AlreadyAwarded)
    }
}

/// 评估规则集，全部通过时授予徽章
///
/// 应在同一事务中调用，使存在性检查、评估与插入看到一致的数据
#[instrument(skip(store, evaluator, badge, rules), fields(badge_code = %badge.code))]
pub async fn award_if_eligible<S>(
    store: &mut S,
    evaluator: &RuleEvaluator,
    user_id: &str,
    badge: &Badge,
    rules: &[BadgeRule],
) -> Result<AwardOutcome>
where
    S: ActivityStats + BadgeStore + ?Sized,
{
    if store.user_badge_exists(user_id, badge.id).await? {
        return Ok(AwardOutcome::AlreadyAwarded);
    }

    let evaluation = evaluator.evaluate(store, user_id, badge, rules).await?;
    if !evaluation.all_rules_passed() {
        return Ok(AwardOutcome::Ineligible);
    }

    grant_badge(store, user_id, badge.id).await
}

/// 管理端撤销徽章
///
/// 删除授予记录后该组合重新参与评估，下一次分发可能再次授予
#[instrument(skip(store))]
pub async fn revoke_badge<S>(store: &mut S, user_id: &str, badge_id: i64) -> Result<bool>
where
    S: BadgeStore + ?Sized,
{
    let removed = store.delete_user_badge(user_id, badge_id).await?;
    if removed {
        info!("徽章已撤销");
    } else {
        debug!("用户未持有该徽章，无需撤销");
    }
    Ok(removed)
}
