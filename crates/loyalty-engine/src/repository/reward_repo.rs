//! 等级权益与通知仓储（PostgreSQL）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use super::traits::RewardStore;
use crate::error::Result;
use crate::models::{NotificationRecord, TierReward};

#[async_trait]
impl RewardStore for Transaction<'static, Postgres> {
    async fn list_active_tier_rewards(
        &mut self,
        tier_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TierReward>> {
        let rewards = sqlx::query_as::<_, TierReward>(
            r#"
            SELECT id, tier_id, name, description, image_url, status, start_at, end_at
            FROM tier_rewards
            WHERE tier_id = $1
              AND status = 'active'
              AND (start_at IS NULL OR start_at <= $2)
              AND (end_at IS NULL OR end_at >= $2)
            ORDER BY id
            "#,
        )
        .bind(tier_id)
        .bind(now)
        .fetch_all(&mut **self)
        .await?;

        Ok(rewards)
    }

    async fn insert_notification(&mut self, record: &NotificationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (code, receiver_code, type, title, description, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.code)
        .bind(&record.receiver_code)
        .bind(record.kind)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.image_url)
        .bind(record.created_at)
        .execute(&mut **self)
        .await?;

        Ok(())
    }
}
