//! 徽章与用户徽章仓储（PostgreSQL）

use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction};

use super::traits::BadgeStore;
use crate::error::Result;
use crate::models::{Badge, BadgeRule, NewUserBadge, RuleKind};

const BADGE_COLUMNS: &str =
    "b.id, b.code, b.name, b.category, b.vp_point, b.status, b.parent_code, b.image_url";

#[async_trait]
impl BadgeStore for Transaction<'static, Postgres> {
    async fn find_badge_by_code(&mut self, code: &str) -> Result<Option<Badge>> {
        let sql = format!("SELECT {BADGE_COLUMNS} FROM badges b WHERE b.code = $1");
        let badge = sqlx::query_as::<_, Badge>(&sql)
            .bind(code)
            .fetch_optional(&mut **self)
            .await?;

        Ok(badge)
    }

    async fn get_badge(&mut self, badge_id: i64) -> Result<Option<Badge>> {
        let sql = format!("SELECT {BADGE_COLUMNS} FROM badges b WHERE b.id = $1");
        let badge = sqlx::query_as::<_, Badge>(&sql)
            .bind(badge_id)
            .fetch_optional(&mut **self)
            .await?;

        Ok(badge)
    }

    async fn list_badge_rules(&mut self, badge_id: i64) -> Result<Vec<BadgeRule>> {
        let rules = sqlx::query_as::<_, BadgeRule>(
            r#"
            SELECT id, badge_id, key_condition, value_type, value
            FROM badge_rules
            WHERE badge_id = $1
            ORDER BY id
            "#,
        )
        .bind(badge_id)
        .fetch_all(&mut **self)
        .await?;

        Ok(rules)
    }

    async fn list_badges_with_rule_kind(&mut self, kind: RuleKind) -> Result<Vec<Badge>> {
        let sql = format!(
            r#"
            SELECT {BADGE_COLUMNS}
            FROM badges b
            WHERE EXISTS (
                SELECT 1 FROM badge_rules br
                WHERE br.badge_id = b.id AND br.key_condition = $1
            )
            ORDER BY b.id
            "#
        );
        let badges = sqlx::query_as::<_, Badge>(&sql)
            .bind(kind.as_str())
            .fetch_all(&mut **self)
            .await?;

        Ok(badges)
    }

    async fn list_user_ids(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM users ORDER BY id")
            .fetch_all(&mut **self)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn user_badge_exists(&mut self, user_id: &str, badge_id: i64) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_badges WHERE user_id = $1 AND badge_id = $2
            ) AS present
            "#,
        )
        .bind(user_id)
        .bind(badge_id)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("present"))
    }

    async fn insert_user_badge(&mut self, badge: &NewUserBadge) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_badges (user_id, badge_id, is_claim, created_at)
            VALUES ($1, $2, FALSE, NOW())
            ON CONFLICT (user_id, badge_id) DO NOTHING
            "#,
        )
        .bind(&badge.user_id)
        .bind(badge.badge_id)
        .execute(&mut **self)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_user_badge(&mut self, user_id: &str, badge_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_badges WHERE user_id = $1 AND badge_id = $2")
            .bind(user_id)
            .bind(badge_id)
            .execute(&mut **self)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
