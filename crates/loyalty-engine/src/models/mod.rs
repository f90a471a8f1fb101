//! 数据模型

pub mod badge;
pub mod enums;
pub mod notification;
pub mod point;
pub mod tier;

pub use badge::{Badge, BadgeRule, NewUserBadge, UserBadge};
pub use enums::{BadgeStatus, DataSource, NotificationKind, RuleKind, TierDirection, UnknownRuleKind};
pub use notification::NotificationRecord;
pub use point::{NewLedgerEntry, PointLedgerEntry, UserPointCache};
pub use tier::{Tier, TierReward};
