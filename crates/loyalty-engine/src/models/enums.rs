//! 积分与徽章引擎枚举类型定义
//!
//! 入库的枚举同时支持数据库（sqlx）和 JSON（serde）序列化

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 积分来源
///
/// 与流水上的 source_code 组合使用，定位产生积分的业务对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum DataSource {
    /// 房间结算
    Room,
    /// 赛事结算
    Tournament,
    /// 徽章附带的 VP 积分
    Badge,
    /// 兑换（通常为负向扣减）
    Redeem,
    Other,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Tournament => "tournament",
            Self::Badge => "badge",
            Self::Redeem => "redeem",
            Self::Other => "other",
        }
    }
}

/// 徽章状态
///
/// 只有 Active 的徽章会参与规则评估
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum BadgeStatus {
    #[default]
    Active,
    Inactive,
}

/// 规则类型（key_condition）
///
/// 封闭的五种规则，每种对应一个 value 解码结构和一个检查逻辑。
/// 数据库中以字符串存储，无法识别的取值在评估时跳过。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// 指定桌游品类的参与次数
    SpecificBoardGameCategory,
    /// 时间窗口内的房间与赛事参与
    TimeLimit,
    /// 累计消费金额
    TotalSpend,
    /// 赛事获胜次数
    TournamentWon,
    /// 玩过的不同游戏数量
    PlayingGames,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        Self::SpecificBoardGameCategory,
        Self::TimeLimit,
        Self::TotalSpend,
        Self::TournamentWon,
        Self::PlayingGames,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecificBoardGameCategory => "specific_board_game_category",
            Self::TimeLimit => "time_limit",
            Self::TotalSpend => "total_spend",
            Self::TournamentWon => "tournament_won",
            Self::PlayingGames => "playing_games",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的规则类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRuleKind(pub String);

impl FromStr for RuleKind {
    type Err = UnknownRuleKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownRuleKind(s.to_string()))
    }
}

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum NotificationKind {
    /// 等级变更
    LevelUp,
    /// 新等级附带的权益
    TierBenefit,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LevelUp => "level_up",
            Self::TierBenefit => "tier_benefit",
        }
    }
}

/// 等级变化方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierDirection {
    Up,
    Down,
}

impl TierDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}
