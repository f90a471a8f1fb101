//! PostgreSQL 仓储集成测试
//!
//! 需要可用的数据库（TEST_DATABASE_URL）与 Kafka（TEST_KAFKA_BROKERS），默认忽略：
//! `cargo test -p loyalty-engine --test pg_store_test -- --ignored`

use chrono::{NaiveDate, Utc};
use loyalty_engine::models::{
    DataSource, NewLedgerEntry, NewUserBadge, NotificationKind, NotificationRecord, RuleKind,
};
use loyalty_engine::repository::{ActivityStats, BadgeStore, LedgerStore, StoreTx, TxProvider};
use loyalty_engine::service::{
    AwardOutcome, BadgeChangePublisher, BadgeDispatcher, KafkaBadgeChangePublisher,
    KafkaNotificationSink, NotificationSink, PointLedgerService, RecordPointsRequest,
    RuleEvaluator, grant_badge,
};
use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::database::Database;
use loyalty_shared::kafka::{KafkaProducer, topics};
use loyalty_shared::test_utils::{
    test_badge_code, test_database_config, test_kafka_config, test_user_id,
};
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

async fn setup() -> Database {
    Database::connect_and_migrate(&test_database_config())
        .await
        .unwrap()
}

async fn insert_user(pool: &PgPool) -> String {
    let user_id = test_user_id();
    sqlx::query("INSERT INTO users (id, latest_point, latest_tier_id) VALUES ($1, 0, 1)")
        .bind(&user_id)
        .execute(pool)
        .await
        .unwrap();
    user_id
}

async fn insert_badge(pool: &PgPool, key: RuleKind, value: serde_json::Value) -> (i64, String) {
    let code = test_badge_code();
    let badge_id: i64 = sqlx::query_scalar(
        "INSERT INTO badges (code, name, category) VALUES ($1, $1, 'achievement') RETURNING id",
    )
    .bind(&code)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO badge_rules (badge_id, key_condition, value) VALUES ($1, $2, $3)")
        .bind(badge_id)
        .bind(key.as_str())
        .bind(value)
        .execute(pool)
        .await
        .unwrap();

    (badge_id, code)
}

async fn begin(pool: &PgPool) -> Transaction<'static, Postgres> {
    TxProvider::begin(pool).await.unwrap()
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_pg_record_points_promotes_and_notifies() {
    let db = setup().await;
    let user_id = insert_user(db.pool()).await;
    let svc = PointLedgerService::new(db.pool().clone(), LoyaltyConfig::default());

    svc.record_points(RecordPointsRequest::new(&user_id, DataSource::Room, "R-1", 700))
        .await
        .unwrap();
    let outcome = svc
        .record_points(RecordPointsRequest::new(&user_id, DataSource::Tournament, "T-1", 500))
        .await
        .unwrap();

    assert_eq!(outcome.new_total, 1200);
    assert_eq!(outcome.tier.name, "Silver");
    assert!(outcome.tier_changed());

    let level_ups: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM notifications WHERE receiver_code = $1 AND type = 'level_up'",
    )
    .bind(&user_id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(level_ups, 1);

    let report = svc.reconcile(&user_id, false).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.ledger_point, 1200);
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_pg_rollback_leaves_no_ledger_rows() {
    let db = setup().await;
    let user_id = insert_user(db.pool()).await;

    {
        let mut tx = begin(db.pool()).await;
        let cache = tx.lock_point_cache(&user_id).await.unwrap().unwrap();
        assert_eq!(cache.latest_point, 0);
        tx.append_ledger_entry(&NewLedgerEntry {
            user_id: user_id.clone(),
            data_source: DataSource::Other,
            source_code: "ROLLBACK".to_string(),
            point: 50,
        })
        .await
        .unwrap();
        // 不提交，事务随作用域结束回滚
    }

    let mut tx = begin(db.pool()).await;
    assert_eq!(tx.sum_ledger(&user_id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_pg_insert_user_badge_ignores_duplicates() {
    let db = setup().await;
    let user_id = insert_user(db.pool()).await;
    let (badge_id, _) = insert_badge(db.pool(), RuleKind::PlayingGames, json!(0)).await;

    let mut tx = begin(db.pool()).await;
    let badge = NewUserBadge {
        user_id: user_id.clone(),
        badge_id,
    };
    assert!(tx.insert_user_badge(&badge).await.unwrap());
    assert!(!tx.insert_user_badge(&badge).await.unwrap());
    assert!(tx.user_badge_exists(&user_id, badge_id).await.unwrap());
    assert_eq!(
        grant_badge(&mut tx, &user_id, badge_id).await.unwrap(),
        AwardOutcome::AlreadyAwarded
    );
    tx.commit().await.unwrap();
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_pg_user_check_awards_once() {
    let db = setup().await;
    let user_id = insert_user(db.pool()).await;
    let (badge_id, _) = insert_badge(db.pool(), RuleKind::TotalSpend, json!("100")).await;

    sqlx::query("INSERT INTO invoices (user_id, amount, status) VALUES ($1, 80, 'redeemed')")
        .bind(&user_id)
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO bookings (user_id, price, status) VALUES ($1, 40, 'paid')")
        .bind(&user_id)
        .execute(db.pool())
        .await
        .unwrap();

    let dispatcher = BadgeDispatcher::new(db.pool().clone(), RuleEvaluator::default());
    let first = dispatcher
        .check_user_condition(&user_id, RuleKind::TotalSpend)
        .await
        .unwrap();
    assert!(first.awarded >= 1);

    let second = dispatcher
        .check_user_condition(&user_id, RuleKind::TotalSpend)
        .await
        .unwrap();
    assert_eq!(second.awarded, 0);

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM user_badges WHERE user_id = $1 AND badge_id = $2",
    )
    .bind(&user_id)
    .bind(badge_id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(rows, 1);
}

async fn insert_room_visit(pool: &PgPool, user_id: &str, started_at: &str) {
    let room_id: i64 = sqlx::query_scalar(
        "INSERT INTO rooms (game_code, started_at) VALUES ('CATAN', $1::timestamptz) RETURNING id",
    )
    .bind(started_at)
    .fetch_one(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES ($1, $2)")
        .bind(room_id)
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}

async fn insert_tournament_entry(pool: &PgPool, user_id: &str, started_at: &str) {
    let tournament_id: i64 = sqlx::query_scalar(
        "INSERT INTO tournaments (game_code, started_at) VALUES ('CATAN', $1::timestamptz) RETURNING id",
    )
    .bind(started_at)
    .fetch_one(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO tournament_participants (tournament_id, user_id) VALUES ($1, $2)")
        .bind(tournament_id)
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_pg_time_window_edges_ignore_session_time_zone() {
    let db = setup().await;
    let user_id = insert_user(db.pool()).await;

    // 窗口 [2024-01-01, 2024-01-31] 按 UTC 自然日计算
    for started_at in [
        "2023-12-31T23:59:59Z",
        "2024-01-01T00:00:00Z",
        "2024-01-31T23:59:59Z",
        "2024-02-01T00:00:00Z",
    ] {
        insert_room_visit(db.pool(), &user_id, started_at).await;
        insert_tournament_entry(db.pool(), &user_id, started_at).await;
    }

    let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let until = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

    let mut tx = begin(db.pool()).await;
    // 东八区会话下两个边界都会跨日，计数不应随之变化
    sqlx::query("SET LOCAL TIME ZONE 'Asia/Shanghai'")
        .execute(&mut *tx)
        .await
        .unwrap();

    assert_eq!(tx.count_rooms_between(&user_id, from, until).await.unwrap(), 2);
    assert_eq!(
        tx.count_tournaments_between(&user_id, from, until).await.unwrap(),
        2
    );
    assert_eq!(tx.count_rooms_since(&user_id, from).await.unwrap(), 3);
    assert_eq!(tx.count_tournaments_since(&user_id, from).await.unwrap(), 3);
}

#[tokio::test]
#[ignore] // 需要 Kafka
async fn test_kafka_publishers_send() {
    let producer = KafkaProducer::new(&test_kafka_config()).unwrap();
    let publisher = KafkaBadgeChangePublisher::new(producer.clone(), topics::BADGE_CHANGED);
    publisher
        .publish_badge_changed(&test_badge_code())
        .await
        .unwrap();
    assert!(publisher.publish_badge_changed("  ").await.is_err());

    let sink = KafkaNotificationSink::from_config(producer, &LoyaltyConfig::default());
    assert_eq!(sink.topic(), topics::NOTIFICATIONS);
    let record = NotificationRecord {
        code: uuid::Uuid::now_v7().to_string(),
        receiver_code: test_user_id(),
        kind: NotificationKind::LevelUp,
        title: "等级提升".to_string(),
        description: json!({"new_tier": "Silver"}),
        image_url: None,
        created_at: Utc::now(),
    };
    sink.deliver(&record).await.unwrap();
}
