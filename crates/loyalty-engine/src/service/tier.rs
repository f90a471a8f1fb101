//! 等级解析
//!
//! 将总积分映射为等级：命中唯一包含该值的区间，否则回落到 Legend 兜底等级。
//! 纯函数，不访问存储，可在事务外用于展示。

use crate::error::{EngineError, Result};
use crate::models::Tier;

/// 已校验的等级表
///
/// 区间按 min_point 升序排列且互不重叠
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: Vec<Tier>,
    sentinel: Tier,
}

impl TierTable {
    /// 由等级列表构建等级表
    ///
    /// `legend_tier_id` 指定兜底等级；列表中不存在该 ID 时使用 `legend_tier_name` 合成一个。
    /// 兜底等级自身的区间同样参与匹配。
    pub fn new(mut tiers: Vec<Tier>, legend_tier_id: i64, legend_tier_name: &str) -> Result<Self> {
        for tier in &tiers {
            if tier.min_point > tier.max_point {
                return Err(EngineError::TierConfig(format!(
                    "等级 {} 区间非法: [{}, {}]",
                    tier.name, tier.min_point, tier.max_point
                )));
            }
        }

        tiers.sort_by_key(|t| (t.min_point, t.id));
        if let Some(pair) = tiers.windows(2).find(|w| w[1].min_point <= w[0].max_point) {
            return Err(EngineError::TierConfig(format!(
                "等级区间重叠: {} [{}, {}] 与 {} [{}, {}]",
                pair[0].name,
                pair[0].min_point,
                pair[0].max_point,
                pair[1].name,
                pair[1].min_point,
                pair[1].max_point
            )));
        }

        let sentinel = tiers
            .iter()
            .find(|t| t.id == legend_tier_id)
            .cloned()
            .unwrap_or_else(|| Tier {
                id: legend_tier_id,
                name: legend_tier_name.to_string(),
                min_point: i64::MAX,
                max_point: i64::MAX,
            });

        Ok(Self { tiers, sentinel })
    }

    /// 解析总积分对应的等级
    pub fn resolve(&self, total: i64) -> &Tier {
        // 区间有序且不重叠，按 min_point 二分定位唯一候选
        let idx = self.tiers.partition_point(|t| t.min_point <= total);
        idx.checked_sub(1)
            .map(|i| &self.tiers[i])
            .filter(|t| t.contains(total))
            .unwrap_or(&self.sentinel)
    }

    pub fn sentinel(&self) -> &Tier {
        &self.sentinel
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn get(&self, tier_id: i64) -> Option<&Tier> {
        if self.sentinel.id == tier_id {
            return Some(&self.sentinel);
        }
        self.tiers.iter().find(|t| t.id == tier_id)
    }
}
