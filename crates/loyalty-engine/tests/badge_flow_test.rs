//! 徽章评估与授予流程集成测试
//!
//! 覆盖规则评估、幂等授予和两种分发入口，使用内存事务存储

use chrono::NaiveDate;
use loyalty_engine::EngineError;
use loyalty_engine::models::{BadgeStatus, RuleKind};
use loyalty_engine::repository::{BadgeStore, StoreTx, TxProvider};
use loyalty_engine::service::{
    AwardOutcome, BadgeDispatcher, RuleEvaluator, award_if_eligible, grant_badge,
    revoke_badge,
};
use loyalty_engine::test_utils::{MemoryStore, Purchase, RoomVisit, TournamentEntry};
use loyalty_shared::config::DecodeErrorPolicy;
use serde_json::json;

// ==================== 测试辅助 ====================

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn add_spend(store: &MemoryStore, user: &str, amount: i64) {
    store
        .add_purchase(Purchase::Invoice {
            user_id: user.to_string(),
            amount,
            status: "redeemed".to_string(),
        })
        .await;
}

async fn add_win(store: &MemoryStore, user: &str) {
    store
        .add_tournament_entry(TournamentEntry::new(user, "CATAN", day("2024-05-01")).won())
        .await;
}

/// 徽章：累计消费 ≥ 500000 且赛事获胜 ≥ 1
async fn spender_badge(store: &MemoryStore, code: &str) -> i64 {
    let badge_id = store.add_badge(code, "achievement", BadgeStatus::Active).await;
    store.add_rule(badge_id, "total_spend", json!(500000)).await;
    store.add_rule(badge_id, "tournament_won", json!(1)).await;
    badge_id
}

async fn evaluate_and_award(store: &MemoryStore, user: &str, code: &str) -> AwardOutcome {
    let mut tx = store.begin().await.unwrap();
    let badge = tx.find_badge_by_code(code).await.unwrap().unwrap();
    let rules = tx.list_badge_rules(badge.id).await.unwrap();
    let outcome = award_if_eligible(&mut tx, &RuleEvaluator::default(), user, &badge, &rules)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    outcome
}

// ==================== 评估与授予 ====================

#[tokio::test]
async fn test_spend_without_win_is_ineligible() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    spender_badge(&store, "BDG-SPEND").await;
    add_spend(&store, "alice", 600_000).await;

    let outcome = evaluate_and_award(&store, "alice", "BDG-SPEND").await;
    assert_eq!(outcome, AwardOutcome::Ineligible);
    assert!(store.user_badges().await.is_empty());
}

#[tokio::test]
async fn test_spend_with_win_awards_once_unclaimed() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = spender_badge(&store, "BDG-SPEND").await;
    add_spend(&store, "alice", 600_000).await;
    add_win(&store, "alice").await;

    let outcome = evaluate_and_award(&store, "alice", "BDG-SPEND").await;
    assert_eq!(outcome, AwardOutcome::Awarded);

    let rows = store.user_badges_for(badge_id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "alice");
    assert!(!rows[0].is_claim);
}

#[tokio::test]
async fn test_paid_booking_counts_toward_spend() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    spender_badge(&store, "BDG-SPEND").await;
    add_spend(&store, "alice", 300_000).await;
    store
        .add_purchase(Purchase::Booking {
            user_id: "alice".to_string(),
            price: 200_000,
            status: "paid".to_string(),
        })
        .await;
    add_win(&store, "alice").await;

    let outcome = evaluate_and_award(&store, "alice", "BDG-SPEND").await;
    assert_eq!(outcome, AwardOutcome::Awarded);
}

#[tokio::test]
async fn test_grant_twice_creates_one_row() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;

    for _ in 0..2 {
        let mut tx = store.begin().await.unwrap();
        grant_badge(&mut tx, "alice", 42).await.unwrap();
        tx.commit().await.unwrap();
    }

    assert_eq!(store.user_badges_for(42).await.len(), 1);
}

#[tokio::test]
async fn test_awarded_pair_is_never_reevaluated() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    spender_badge(&store, "BDG-SPEND").await;
    add_spend(&store, "alice", 600_000).await;
    add_win(&store, "alice").await;

    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-SPEND").await,
        AwardOutcome::Awarded
    );

    // 评估会失败，但已授予的组合不再触发评估
    store.fail_activity_for("alice").await;
    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-SPEND").await,
        AwardOutcome::AlreadyAwarded
    );
}

#[tokio::test]
async fn test_revoked_pair_is_evaluated_again() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = spender_badge(&store, "BDG-SPEND").await;
    add_spend(&store, "alice", 600_000).await;
    add_win(&store, "alice").await;

    evaluate_and_award(&store, "alice", "BDG-SPEND").await;

    let mut tx = store.begin().await.unwrap();
    assert!(revoke_badge(&mut tx, "alice", badge_id).await.unwrap());
    assert!(!revoke_badge(&mut tx, "alice", badge_id).await.unwrap());
    tx.commit().await.unwrap();
    assert!(store.user_badges_for(badge_id).await.is_empty());

    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-SPEND").await,
        AwardOutcome::Awarded
    );
    assert_eq!(store.user_badges_for(badge_id).await.len(), 1);
}

#[tokio::test]
async fn test_evaluation_is_deterministic() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = spender_badge(&store, "BDG-SPEND").await;
    add_spend(&store, "alice", 600_000).await;
    add_win(&store, "alice").await;

    let evaluator = RuleEvaluator::default();
    let mut tx = store.begin().await.unwrap();
    let badge = tx.get_badge(badge_id).await.unwrap().unwrap();
    let rules = tx.list_badge_rules(badge_id).await.unwrap();

    let first = evaluator.evaluate(&mut tx, "alice", &badge, &rules).await.unwrap();
    let second = evaluator.evaluate(&mut tx, "alice", &badge, &rules).await.unwrap();
    assert!(first.all_rules_passed());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_game_category_counts_only_qualifying_rooms() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = store.add_badge("BDG-CATAN", "normal", BadgeStatus::Active).await;
    store
        .add_rule(
            badge_id,
            "specific_board_game_category",
            json!({"game_code": ["CATAN"], "need_gm": true, "total_played": 3, "booking_price": 100}),
        )
        .await;

    let d = day("2024-02-01");
    // 计入：有 GM 且价格达标
    store
        .add_room_visit(RoomVisit::new("alice", "CATAN", d).with_gm().with_booking_price(150))
        .await;
    // 不计入：无 GM / 价格不足 / 其他游戏 / 非 active
    store
        .add_room_visit(RoomVisit::new("alice", "CATAN", d).with_booking_price(150))
        .await;
    store
        .add_room_visit(RoomVisit::new("alice", "CATAN", d).with_gm().with_booking_price(50))
        .await;
    store
        .add_room_visit(RoomVisit::new("alice", "AZUL", d).with_gm().with_booking_price(150))
        .await;
    store
        .add_room_visit(
            RoomVisit::new("alice", "CATAN", d)
                .with_gm()
                .with_booking_price(150)
                .inactive(),
        )
        .await;
    // 赛事不受 GM 与价格约束
    store
        .add_tournament_entry(TournamentEntry::new("alice", "CATAN", d))
        .await;

    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-CATAN").await,
        AwardOutcome::Ineligible
    );

    store
        .add_tournament_entry(TournamentEntry::new("alice", "CATAN", d))
        .await;
    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-CATAN").await,
        AwardOutcome::Awarded
    );
}

#[tokio::test]
async fn test_time_limit_window_is_inclusive() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = store.add_badge("BDG-Q1", "time_limit", BadgeStatus::Active).await;
    store
        .add_rule(
            badge_id,
            "time_limit",
            json!({"start_date": "2024-01-01", "end_date": "2024-03-31"}),
        )
        .await;

    for d in ["2024-01-01", "2024-03-31", "2024-04-01"] {
        store.add_room_visit(RoomVisit::new("alice", "AZUL", day(d))).await;
    }
    store
        .add_tournament_entry(TournamentEntry::new("alice", "AZUL", day("2024-03-31")))
        .await;
    store
        .add_tournament_entry(TournamentEntry::new("alice", "AZUL", day("2023-12-31")))
        .await;

    // 窗口内房间 2 次，赛事只有 1 次
    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-Q1").await,
        AwardOutcome::Ineligible
    );

    store
        .add_tournament_entry(TournamentEntry::new("alice", "AZUL", day("2024-01-01")))
        .await;
    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-Q1").await,
        AwardOutcome::Awarded
    );
}

#[tokio::test]
async fn test_life_time_window_has_no_end() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = store.add_badge("BDG-LIFE", "life_time", BadgeStatus::Active).await;
    store
        .add_rule(badge_id, "time_limit", json!({"start_date": "2020-01-01"}))
        .await;

    for d in ["2021-06-01", "2030-01-01"] {
        store.add_room_visit(RoomVisit::new("alice", "AZUL", day(d))).await;
        store
            .add_tournament_entry(TournamentEntry::new("alice", "AZUL", day(d)))
            .await;
    }

    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-LIFE").await,
        AwardOutcome::Awarded
    );
}

#[tokio::test]
async fn test_playing_games_counts_distinct_games() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = store.add_badge("BDG-VARIETY", "normal", BadgeStatus::Active).await;
    store.add_rule(badge_id, "playing_games", json!("3")).await;

    let d = day("2024-01-10");
    store.add_room_visit(RoomVisit::new("alice", "CATAN", d)).await;
    store.add_room_visit(RoomVisit::new("alice", "CATAN", d)).await;
    store
        .add_tournament_entry(TournamentEntry::new("alice", "AZUL", d))
        .await;

    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-VARIETY").await,
        AwardOutcome::Ineligible
    );

    store.add_room_visit(RoomVisit::new("alice", "WINGSPAN", d)).await;
    assert_eq!(
        evaluate_and_award(&store, "alice", "BDG-VARIETY").await,
        AwardOutcome::Awarded
    );
}

// ==================== 解码失败策略 ====================

#[tokio::test]
async fn test_decode_error_policies() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    let badge_id = store.add_badge("BDG-BAD", "normal", BadgeStatus::Active).await;
    store.add_rule(badge_id, "total_spend", json!({"oops": 1})).await;
    store.add_rule(badge_id, "tournament_won", json!(0)).await;

    let mut tx = store.begin().await.unwrap();
    let badge = tx.get_badge(badge_id).await.unwrap().unwrap();
    let rules = tx.list_badge_rules(badge_id).await.unwrap();

    let abort = RuleEvaluator::new(DecodeErrorPolicy::AbortSet)
        .evaluate(&mut tx, "alice", &badge, &rules)
        .await;
    assert!(matches!(
        abort,
        Err(EngineError::RuleDecode {
            kind: RuleKind::TotalSpend,
            ..
        })
    ));

    let isolated = RuleEvaluator::new(DecodeErrorPolicy::FailRule)
        .evaluate(&mut tx, "alice", &badge, &rules)
        .await
        .unwrap();
    assert!(!isolated.all_rules_passed());
    assert_eq!(isolated.results.len(), 2);
}

// ==================== 分发入口 ====================

#[tokio::test]
async fn test_fan_out_awards_only_eligible_users() {
    let store = MemoryStore::new();
    for user in ["u-1", "u-2", "u-3"] {
        store.add_user(user, 0, None).await;
    }
    let badge_id = spender_badge(&store, "BDG-001").await;
    for user in ["u-1", "u-3"] {
        add_spend(&store, user, 600_000).await;
        add_win(&store, user).await;
    }
    add_spend(&store, "u-2", 600_000).await;

    let dispatcher = BadgeDispatcher::new(store.clone(), RuleEvaluator::default());
    let report = dispatcher.fan_out_badge("BDG-001").await.unwrap();

    assert_eq!(report.evaluated, 3);
    assert_eq!(report.awarded, 2);
    assert_eq!(report.ineligible, 1);
    assert_eq!(report.failed, 0);

    let mut holders: Vec<_> = store
        .user_badges_for(badge_id)
        .await
        .into_iter()
        .map(|b| b.user_id)
        .collect();
    holders.sort();
    assert_eq!(holders, vec!["u-1", "u-3"]);

    // 重复扇出不会产生新行
    let again = dispatcher.fan_out_badge("BDG-001").await.unwrap();
    assert_eq!(again.awarded, 0);
    assert_eq!(again.already_awarded, 2);
    assert_eq!(store.user_badges_for(badge_id).await.len(), 2);
}

#[tokio::test]
async fn test_fan_out_isolates_per_user_failures() {
    let store = MemoryStore::new();
    for user in ["u-1", "u-2", "u-3"] {
        store.add_user(user, 0, None).await;
        add_spend(&store, user, 600_000).await;
        add_win(&store, user).await;
    }
    let badge_id = spender_badge(&store, "BDG-001").await;
    store.fail_activity_for("u-2").await;

    let dispatcher = BadgeDispatcher::new(store.clone(), RuleEvaluator::default());
    let report = dispatcher.fan_out_badge("BDG-001").await.unwrap();

    assert_eq!(report.awarded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(store.user_badges_for(badge_id).await.len(), 2);
}

#[tokio::test]
async fn test_fan_out_skips_inactive_or_missing_badge() {
    let store = MemoryStore::new();
    store.add_user("u-1", 0, None).await;
    store.add_badge("BDG-OFF", "normal", BadgeStatus::Inactive).await;

    let dispatcher = BadgeDispatcher::new(store.clone(), RuleEvaluator::default());

    let inactive = dispatcher.fan_out_badge("BDG-OFF").await.unwrap();
    assert_eq!(inactive.evaluated, 0);

    let missing = dispatcher.fan_out_badge("BDG-NOPE").await.unwrap();
    assert_eq!(missing.evaluated, 0);
    assert!(store.user_badges().await.is_empty());
}

#[tokio::test]
async fn test_fan_out_with_empty_rule_set_awards_everyone() {
    let store = MemoryStore::new();
    for user in ["u-1", "u-2"] {
        store.add_user(user, 0, None).await;
    }
    let badge_id = store.add_badge("BDG-WELCOME", "normal", BadgeStatus::Active).await;

    let dispatcher = BadgeDispatcher::new(store.clone(), RuleEvaluator::default());
    let report = dispatcher.fan_out_badge("BDG-WELCOME").await.unwrap();

    assert_eq!(report.awarded, 2);
    assert_eq!(store.user_badges_for(badge_id).await.len(), 2);
}

#[tokio::test]
async fn test_fan_out_load_failure_is_an_error() {
    let store = MemoryStore::new();
    store.fail_begin(true).await;

    let dispatcher = BadgeDispatcher::new(store.clone(), RuleEvaluator::default());
    let result = dispatcher.fan_out_badge("BDG-001").await;
    assert!(result.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_check_user_condition_scans_matching_badges() {
    let store = MemoryStore::new();
    store.add_user("alice", 0, None).await;
    add_win(&store, "alice").await;

    let winner = store.add_badge("BDG-WIN", "normal", BadgeStatus::Active).await;
    store.add_rule(winner, "tournament_won", json!(1)).await;

    let double = store.add_badge("BDG-WIN2", "normal", BadgeStatus::Active).await;
    store.add_rule(double, "tournament_won", json!(2)).await;

    let retired = store.add_badge("BDG-OLD", "normal", BadgeStatus::Inactive).await;
    store.add_rule(retired, "tournament_won", json!(1)).await;

    let unrelated = store.add_badge("BDG-SPEND", "normal", BadgeStatus::Active).await;
    store.add_rule(unrelated, "total_spend", json!(0)).await;

    let dispatcher = BadgeDispatcher::new(store.clone(), RuleEvaluator::default());
    let report = dispatcher
        .check_user_condition("alice", RuleKind::TournamentWon)
        .await
        .unwrap();

    assert_eq!(report.evaluated, 2);
    assert_eq!(report.awarded, 1);
    assert_eq!(report.ineligible, 1);

    let held: Vec<_> = store.user_badges().await.into_iter().map(|b| b.badge_id).collect();
    assert_eq!(held, vec![winner]);
}
