//! 仓储层
//!
//! trait 定义在 traits 中，其余文件为 PostgreSQL 事务上的实现

mod activity_repo;
mod badge_repo;
mod ledger_repo;
mod reward_repo;
mod traits;
mod tx;

pub use traits::{
    ActivityStats, BadgeStore, LedgerStore, RewardStore, RoomGameFilter, StoreTx, TxProvider,
};

#[cfg(test)]
pub use traits::{MockActivityStats, MockBadgeStore, MockLedgerStore, MockRewardStore};
