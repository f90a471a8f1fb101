//! 服务层请求与结果类型

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{DataSource, NotificationRecord, Tier, TierDirection};

/// 记录积分请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPointsRequest {
    pub user_id: String,
    pub data_source: DataSource,
    pub source_code: String,
    /// 有符号变动，不能为 0
    pub delta: i64,
}

impl RecordPointsRequest {
    pub fn new(
        user_id: impl Into<String>,
        data_source: DataSource,
        source_code: impl Into<String>,
        delta: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            data_source,
            source_code: source_code.into(),
            delta,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(EngineError::Validation("user_id 不能为空".to_string()));
        }
        Ok(())
    }
}

/// 一次积分写入的结果
#[derive(Debug, Clone)]
pub struct LedgerOutcome {
    pub entry_id: i64,
    pub previous_total: i64,
    pub new_total: i64,
    pub previous_tier_id: Option<i64>,
    pub tier: Tier,
    /// 等级变化方向，未变化时为 None
    pub transition: Option<TierDirection>,
    /// 本次写入产生的通知，等级未变化时为空
    pub notifications: Vec<NotificationRecord>,
}

impl LedgerOutcome {
    pub fn tier_changed(&self) -> bool {
        self.transition.is_some()
    }
}

/// 积分概览（展示用）
#[derive(Debug, Clone, Serialize)]
pub struct PointSummary {
    pub user_id: String,
    pub total: i64,
    pub tier: Tier,
}

/// 积分缓存与流水对账结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub user_id: String,
    pub cached_point: i64,
    pub ledger_point: i64,
    pub cached_tier_id: Option<i64>,
    pub expected_tier_id: i64,
    /// 是否已改写缓存
    pub repaired: bool,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.cached_point == self.ledger_point && self.cached_tier_id == Some(self.expected_tier_id)
    }
}

/// 单个用户/徽章组合的授予结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardOutcome {
    /// 新插入了用户徽章
    Awarded,
    /// 已存在（包括并发插入冲突），无变化
    AlreadyAwarded,
    /// 规则未全部通过
    Ineligible,
}

/// 一轮分发的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// 参与评估的用户/徽章组合数
    pub evaluated: usize,
    pub awarded: usize,
    pub already_awarded: usize,
    pub ineligible: usize,
    /// 评估或写入失败，已记录日志并跳过
    pub failed: usize,
}

impl DispatchReport {
    pub fn record(&mut self, outcome: AwardOutcome) {
        self.evaluated += 1;
        match outcome {
            AwardOutcome::Awarded => self.awarded += 1,
            AwardOutcome::AlreadyAwarded => self.already_awarded += 1,
            AwardOutcome::Ineligible => self.ineligible += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.evaluated += 1;
        self.failed += 1;
    }
}
