//! 等级变更通知
//!
//! 在积分事务内写入一条等级变更通知，以及新等级下每个生效权益各一条权益通知。
//! 任一写入失败都会向上传播，由外层事务整体回滚。

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NotificationKind, NotificationRecord, Tier, TierDirection};
use crate::repository::RewardStore;

/// 判断等级变化方向，之前没有等级视为升级
pub fn tier_direction(old_tier: Option<&Tier>, new_tier: &Tier) -> TierDirection {
    match old_tier {
        Some(old) if old.min_point > new_tier.min_point => TierDirection::Down,
        _ => TierDirection::Up,
    }
}

/// 写入等级变更通知与权益通知，返回已写入的记录
#[instrument(skip(store, old_tier, new_tier), fields(new_tier_id = new_tier.id))]
pub async fn notify_tier_change<S>(
    store: &mut S,
    user_id: &str,
    old_tier: Option<&Tier>,
    new_tier: &Tier,
    now: DateTime<Utc>,
) -> Result<Vec<NotificationRecord>>
where
    S: RewardStore + ?Sized,
{
    let direction = tier_direction(old_tier, new_tier);
    let title = match direction {
        TierDirection::Up => format!("恭喜升级至 {}", new_tier.name),
        TierDirection::Down => format!("等级已调整为 {}", new_tier.name),
    };

    let level_up = NotificationRecord {
        code: Uuid::now_v7().to_string(),
        receiver_code: user_id.to_string(),
        kind: NotificationKind::LevelUp,
        title,
        description: json!({
            "direction": direction.as_str(),
            "old_tier_id": old_tier.map(|t| t.id),
            "old_tier": old_tier.map(|t| t.name.as_str()),
            "new_tier_id": new_tier.id,
            "new_tier": new_tier.name,
        }),
        image_url: None,
        created_at: now,
    };
    store.insert_notification(&level_up).await?;

    let mut records = vec![level_up];

    let rewards = store.list_active_tier_rewards(new_tier.id, now).await?;
    for reward in rewards {
        let record = NotificationRecord {
            code: Uuid::now_v7().to_string(),
            receiver_code: user_id.to_string(),
            kind: NotificationKind::TierBenefit,
            title: reward.name.clone(),
            description: json!({
                "tier_id": new_tier.id,
                "tier": new_tier.name,
                "reward_id": reward.id,
                "reward": reward.name,
                "detail": reward.description,
            }),
            image_url: reward.image_url.clone(),
            created_at: now,
        };
        store.insert_notification(&record).await?;
        records.push(record);
    }

    debug!(
        user_id,
        direction = direction.as_str(),
        count = records.len(),
        "等级通知已写入"
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::TierReward;
    use crate::repository::MockRewardStore;

    fn tier(id: i64, name: &str, min: i64, max: i64) -> Tier {
        Tier {
            id,
            name: name.to_string(),
            min_point: min,
            max_point: max,
        }
    }

    fn reward(id: i64, name: &str) -> TierReward {
        TierReward {
            id,
            tier_id: 2,
            name: name.to_string(),
            description: Some("每月一次".to_string()),
            image_url: Some("https://img.example/reward.png".to_string()),
            status: "active".to_string(),
            start_at: None,
            end_at: None,
        }
    }

    #[test]
    fn test_tier_direction() {
        let bronze = tier(1, "Bronze", 0, 999);
        let silver = tier(2, "Silver", 1000, 4999);
        assert_eq!(tier_direction(Some(&bronze), &silver), TierDirection::Up);
        assert_eq!(tier_direction(Some(&silver), &bronze), TierDirection::Down);
        assert_eq!(tier_direction(None, &bronze), TierDirection::Up);
    }

    #[tokio::test]
    async fn test_notify_writes_level_up_and_benefits() {
        let mut store = MockRewardStore::new();
        store
            .expect_list_active_tier_rewards()
            .withf(|tier_id, _| *tier_id == 2)
            .times(1)
            .returning(|_, _| Ok(vec![reward(10, "免费饮品"), reward(11, "优先预订")]));
        store.expect_insert_notification().times(3).returning(|_| Ok(()));

        let bronze = tier(1, "Bronze", 0, 999);
        let silver = tier(2, "Silver", 1000, 4999);
        let records = notify_tier_change(&mut store, "user-1", Some(&bronze), &silver, Utc::now())
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, NotificationKind::LevelUp);
        assert_eq!(records[0].description["direction"], "up");
        assert_eq!(records[0].description["old_tier"], "Bronze");
        assert_eq!(records[1].kind, NotificationKind::TierBenefit);
        assert_eq!(records[2].title, "优先预订");
        assert_ne!(records[1].code, records[2].code);
    }

    #[tokio::test]
    async fn test_notify_propagates_insert_failure() {
        let mut store = MockRewardStore::new();
        store
            .expect_list_active_tier_rewards()
            .returning(|_, _| Ok(vec![reward(10, "免费饮品")]));

        let mut calls = 0;
        store.expect_insert_notification().returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(EngineError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(())
            }
        });

        let silver = tier(2, "Silver", 1000, 4999);
        let result = notify_tier_change(&mut store, "user-1", None, &silver, Utc::now()).await;
        assert!(matches!(result, Err(EngineError::Database(_))));
    }
}
