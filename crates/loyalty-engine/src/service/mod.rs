//! 服务层

pub mod awarder;
pub mod dispatch;
pub mod dto;
pub mod evaluator;
pub mod ledger_service;
pub mod notification_sink;
pub mod tier;
pub mod tier_notifier;

pub use awarder::{award_if_eligible, grant_badge, revoke_badge};
pub use dispatch::{BadgeChangePublisher, BadgeDispatcher, KafkaBadgeChangePublisher};
pub use dto::{
    AwardOutcome, DispatchReport, LedgerOutcome, PointSummary, ReconcileReport,
    RecordPointsRequest,
};
pub use evaluator::{RuleCondition, RuleEvaluation, RuleEvaluator, RuleOutcome, RuleResult};
pub use ledger_service::{PointLedgerService, load_tier_table, record_points_in};
pub use notification_sink::{KafkaNotificationSink, NotificationSink};
pub use tier::TierTable;
pub use tier_notifier::notify_tier_change;
