//! 徽章规则评估
//!
//! 每条规则由 key_condition 选择解码结构与检查逻辑，value 是不透明的 JSON。
//! 规则按给定顺序逐条评估，全部通过才算满足；空规则集视为满足，
//! 无法识别的规则类型跳过且不阻止授予。
//!
//! ## 解码失败
//!
//! - `DecodeErrorPolicy::AbortSet`：第一条解码失败的规则终止整个规则集的评估并返回错误
//! - `DecodeErrorPolicy::FailRule`：该规则记为未通过，继续评估其余规则

use chrono::{DateTime, NaiveDate};
use loyalty_shared::config::DecodeErrorPolicy;
use loyalty_shared::observability::metrics;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, Result};
use crate::models::{Badge, BadgeRule, RuleKind};
use crate::repository::{ActivityStats, RoomGameFilter};

/// 终身类徽章的分类值，time_limit 规则据此使用不设终点的统计
pub const LIFE_TIME_CATEGORY: &str = "life_time";

// ---------------------------------------------------------------------------
// 规则条件解码
// ---------------------------------------------------------------------------

/// 整数阈值，兼容数字与数字字符串两种写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(pub i64);

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Threshold(n)),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map(Threshold)
                .map_err(|_| D::Error::custom(format!("阈值不是整数: {s:?}"))),
        }
    }
}

/// 日期，兼容 `2024-01-31` 与 RFC 3339 时间戳（取日期部分）
fn parse_date<E: serde::de::Error>(raw: &str) -> std::result::Result<NaiveDate, E> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| E::custom(format!("无法解析日期: {raw:?}")))
}

fn de_date<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw)
}

fn de_opt_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => parse_date(&raw).map(Some),
        _ => Ok(None),
    }
}

/// specific_board_game_category 的条件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameCategoryCondition {
    pub game_code: Vec<String>,
    #[serde(default)]
    pub need_gm: bool,
    pub total_played: Threshold,
    /// 房间预订价格下限，只作用于房间
    #[serde(default)]
    pub booking_price: i64,
}

#[derive(Debug, Deserialize)]
struct RawTimeWindow {
    #[serde(deserialize_with = "de_date")]
    start_date: NaiveDate,
    #[serde(default, deserialize_with = "de_opt_date")]
    end_date: Option<NaiveDate>,
}

/// time_limit 的统计范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeScope {
    /// [start, end] 闭区间
    Bounded { start: NaiveDate, end: NaiveDate },
    /// 自 start 起不设终点
    LifeTime { start: NaiveDate },
}

/// 已解码的规则条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCondition {
    GameCategory(GameCategoryCondition),
    TimeWindow(TimeScope),
    TotalSpend(Threshold),
    TournamentWon(Threshold),
    PlayingGames(Threshold),
}

impl RuleCondition {
    /// 按规则类型解码 value
    ///
    /// time_limit 需要徽章分类区分限时与终身两种统计方式
    pub fn decode(
        kind: RuleKind,
        value: &serde_json::Value,
        badge_category: &str,
    ) -> std::result::Result<Self, serde_json::Error> {
        let condition = match kind {
            RuleKind::SpecificBoardGameCategory => {
                Self::GameCategory(GameCategoryCondition::deserialize(value)?)
            }
            RuleKind::TimeLimit => {
                let window = RawTimeWindow::deserialize(value)?;
                if badge_category == LIFE_TIME_CATEGORY {
                    Self::TimeWindow(TimeScope::LifeTime {
                        start: window.start_date,
                    })
                } else {
                    let end = window
                        .end_date
                        .ok_or_else(|| serde_json::Error::custom("time_limit 规则缺少 end_date"))?;
                    Self::TimeWindow(TimeScope::Bounded {
                        start: window.start_date,
                        end,
                    })
                }
            }
            RuleKind::TotalSpend => Self::TotalSpend(Threshold::deserialize(value)?),
            RuleKind::TournamentWon => Self::TournamentWon(Threshold::deserialize(value)?),
            RuleKind::PlayingGames => Self::PlayingGames(Threshold::deserialize(value)?),
        };
        Ok(condition)
    }

    /// 对用户执行检查
    pub async fn check<S>(&self, stats: &mut S, user_id: &str) -> Result<bool>
    where
        S: ActivityStats + ?Sized,
    {
        let passed = match self {
            Self::GameCategory(cond) => {
                let filter = RoomGameFilter {
                    game_codes: cond.game_code.clone(),
                    need_gm: cond.need_gm,
                    min_booking_price: cond.booking_price,
                };
                let rooms = stats.count_room_games(user_id, &filter).await?;
                let tournaments = stats.count_tournament_games(user_id, &cond.game_code).await?;
                rooms.saturating_add(tournaments) >= cond.total_played.0
            }
            Self::TimeWindow(TimeScope::Bounded { start, end }) => {
                let rooms = stats.count_rooms_between(user_id, *start, *end).await?;
                let tournaments = stats.count_tournaments_between(user_id, *start, *end).await?;
                rooms > 1 && tournaments > 1
            }
            Self::TimeWindow(TimeScope::LifeTime { start }) => {
                let rooms = stats.count_rooms_since(user_id, *start).await?;
                let tournaments = stats.count_tournaments_since(user_id, *start).await?;
                rooms > 1 && tournaments > 1
            }
            Self::TotalSpend(threshold) => stats.total_spend(user_id).await? >= threshold.0,
            Self::TournamentWon(threshold) => {
                stats.count_tournament_wins(user_id).await? >= threshold.0
            }
            Self::PlayingGames(threshold) => {
                stats.count_distinct_games_played(user_id).await? >= threshold.0
            }
        };
        Ok(passed)
    }
}

// ---------------------------------------------------------------------------
// 评估结果
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Passed,
    Failed,
    /// 仅在 FailRule 策略下出现
    DecodeFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    pub rule_id: i64,
    pub kind: RuleKind,
    pub outcome: RuleOutcome,
}

/// 一个徽章规则集对一个用户的评估结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEvaluation {
    pub results: Vec<RuleResult>,
    /// 因类型无法识别而跳过的规则
    pub skipped_rule_ids: Vec<i64>,
}

impl RuleEvaluation {
    /// 每条已评估的规则都通过；没有可评估的规则时为 true
    pub fn all_rules_passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome == RuleOutcome::Passed)
    }
}

// ---------------------------------------------------------------------------
// RuleEvaluator
// ---------------------------------------------------------------------------

/// 徽章规则评估器
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator {
    policy: DecodeErrorPolicy,
}

impl RuleEvaluator {
    pub fn new(policy: DecodeErrorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecodeErrorPolicy {
        self.policy
    }

    /// 评估徽章的规则集
    ///
    /// 同一批底层统计数据下结果是确定的
    #[instrument(skip(self, stats, badge, rules), fields(badge_code = %badge.code, rules = rules.len()))]
    pub async fn evaluate<S>(
        &self,
        stats: &mut S,
        user_id: &str,
        badge: &Badge,
        rules: &[BadgeRule],
    ) -> Result<RuleEvaluation>
    where
        S: ActivityStats + ?Sized,
    {
        let mut evaluation = RuleEvaluation::default();

        for rule in rules {
            let Some(kind) = rule.kind() else {
                warn!(
                    rule_id = rule.id,
                    key_condition = %rule.key_condition,
                    "未知的规则类型，已跳过"
                );
                evaluation.skipped_rule_ids.push(rule.id);
                continue;
            };

            let condition = match RuleCondition::decode(kind, &rule.value, &badge.category) {
                Ok(condition) => condition,
                Err(source) => match self.policy {
                    DecodeErrorPolicy::AbortSet => {
                        metrics::record_rule_evaluation("decode_error");
                        return Err(EngineError::RuleDecode {
                            rule_id: rule.id,
                            kind,
                            source,
                        });
                    }
                    DecodeErrorPolicy::FailRule => {
                        warn!(rule_id = rule.id, %kind, error = %source, "规则解码失败，记为未通过");
                        evaluation.results.push(RuleResult {
                            rule_id: rule.id,
                            kind,
                            outcome: RuleOutcome::DecodeFailed,
                        });
                        continue;
                    }
                },
            };

            let passed = condition.check(stats, user_id).await?;
            debug!(rule_id = rule.id, %kind, passed, "规则已评估");
            evaluation.results.push(RuleResult {
                rule_id: rule.id,
                kind,
                outcome: if passed {
                    RuleOutcome::Passed
                } else {
                    RuleOutcome::Failed
                },
            });
        }

        let result = if evaluation.all_rules_passed() {
            "passed"
        } else {
            "failed"
        };
        metrics::record_rule_evaluation(result);

        Ok(evaluation)
    }
}
