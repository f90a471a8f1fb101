//! 积分流水仓储（PostgreSQL）
//!
//! 积分缓存存放在 users 表上，流水追加到 point_ledger，两者必须在同一事务内写入

use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction};

use super::traits::LedgerStore;
use crate::error::Result;
use crate::models::{NewLedgerEntry, Tier, UserPointCache};

#[async_trait]
impl LedgerStore for Transaction<'static, Postgres> {
    async fn get_point_cache(&mut self, user_id: &str) -> Result<Option<UserPointCache>> {
        let cache = sqlx::query_as::<_, UserPointCache>(
            "SELECT id AS user_id, latest_point, latest_tier_id FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut **self)
        .await?;

        Ok(cache)
    }

    async fn lock_point_cache(&mut self, user_id: &str) -> Result<Option<UserPointCache>> {
        let cache = sqlx::query_as::<_, UserPointCache>(
            r#"
            SELECT id AS user_id, latest_point, latest_tier_id
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **self)
        .await?;

        Ok(cache)
    }

    async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO point_ledger (user_id, data_source, source_code, point, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.data_source)
        .bind(&entry.source_code)
        .bind(entry.point)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("id"))
    }

    async fn update_point_cache(&mut self, cache: &UserPointCache) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET latest_point = $2, latest_tier_id = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&cache.user_id)
        .bind(cache.latest_point)
        .bind(cache.latest_tier_id)
        .execute(&mut **self)
        .await?;

        Ok(())
    }

    async fn sum_ledger(&mut self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(point), 0)::BIGINT AS total
            FROM point_ledger
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("total"))
    }

    async fn list_tiers(&mut self) -> Result<Vec<Tier>> {
        let tiers = sqlx::query_as::<_, Tier>(
            r#"
            SELECT id, name, min_point, max_point
            FROM tiers
            ORDER BY min_point
            "#,
        )
        .fetch_all(&mut **self)
        .await?;

        Ok(tiers)
    }
}
