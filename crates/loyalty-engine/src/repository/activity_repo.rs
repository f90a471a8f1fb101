//! 活动聚合统计（PostgreSQL）
//!
//! 只统计状态为 active 的参与记录。时间窗口的日期按 UTC 自然日解释，
//! 转换为 `[起始日 00:00, 结束日次日 00:00)` 的时间戳区间后与 started_at 比较，
//! 结果不受会话 TimeZone 设置影响

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{Postgres, Row, Transaction};

use super::traits::{ActivityStats, RoomGameFilter};
use crate::error::Result;

/// UTC 自然日的起点
fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// 闭区间终点日的次日起点；终点为最大日期时不设上界
fn day_end_exclusive(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.succ_opt().map(day_start)
}

#[async_trait]
impl ActivityStats for Transaction<'static, Postgres> {
    async fn count_room_games(&mut self, user_id: &str, filter: &RoomGameFilter) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM room_participants rp
            JOIN rooms r ON r.id = rp.room_id
            WHERE rp.user_id = $1
              AND rp.status = 'active'
              AND r.game_code = ANY($2)
              AND ($3 = FALSE OR r.game_master_id IS NOT NULL)
              AND r.booking_price >= $4
            "#,
        )
        .bind(user_id)
        .bind(&filter.game_codes)
        .bind(filter.need_gm)
        .bind(filter.min_booking_price)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn count_tournament_games(
        &mut self,
        user_id: &str,
        game_codes: &[String],
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM tournament_participants tp
            JOIN tournaments t ON t.id = tp.tournament_id
            WHERE tp.user_id = $1
              AND tp.status = 'active'
              AND t.game_code = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(game_codes)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn count_rooms_between(
        &mut self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM room_participants rp
            JOIN rooms r ON r.id = rp.room_id
            WHERE rp.user_id = $1
              AND rp.status = 'active'
              AND r.started_at >= $2
              AND ($3::timestamptz IS NULL OR r.started_at < $3)
            "#,
        )
        .bind(user_id)
        .bind(day_start(from))
        .bind(day_end_exclusive(until))
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn count_tournaments_between(
        &mut self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM tournament_participants tp
            JOIN tournaments t ON t.id = tp.tournament_id
            WHERE tp.user_id = $1
              AND tp.status = 'active'
              AND t.started_at >= $2
              AND ($3::timestamptz IS NULL OR t.started_at < $3)
            "#,
        )
        .bind(user_id)
        .bind(day_start(from))
        .bind(day_end_exclusive(until))
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn count_rooms_since(&mut self, user_id: &str, from: NaiveDate) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM room_participants rp
            JOIN rooms r ON r.id = rp.room_id
            WHERE rp.user_id = $1
              AND rp.status = 'active'
              AND r.started_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(day_start(from))
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn count_tournaments_since(&mut self, user_id: &str, from: NaiveDate) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM tournament_participants tp
            JOIN tournaments t ON t.id = tp.tournament_id
            WHERE tp.user_id = $1
              AND tp.status = 'active'
              AND t.started_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(day_start(from))
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn total_spend(&mut self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COALESCE(SUM(amount), 0) FROM invoices
                 WHERE user_id = $1 AND status = 'redeemed')::BIGINT
              + (SELECT COALESCE(SUM(price), 0) FROM bookings
                 WHERE user_id = $1 AND status = 'paid')::BIGINT AS total
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("total"))
    }

    async fn count_tournament_wins(&mut self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::BIGINT AS cnt
            FROM tournament_participants
            WHERE user_id = $1 AND is_winner = TRUE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn count_distinct_games_played(&mut self, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT game_code)::BIGINT AS cnt
            FROM (
                SELECT r.game_code
                FROM room_participants rp
                JOIN rooms r ON r.id = rp.room_id
                WHERE rp.user_id = $1 AND rp.status = 'active'
                UNION ALL
                SELECT t.game_code
                FROM tournament_participants tp
                JOIN tournaments t ON t.id = tp.tournament_id
                WHERE tp.user_id = $1 AND tp.status = 'active'
            ) played
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **self)
        .await?;

        Ok(row.get("cnt"))
    }
}
