//! 积分与徽章引擎错误类型
//!
//! 区分业务错误（用户不存在、等级配置非法、规则解码失败）与
//! 系统错误（数据库、序列化、基础设施），便于调用方决定回滚、记录或转换为通用内部错误。

use thiserror::Error;

use crate::models::RuleKind;

/// 引擎错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    // === 业务错误 ===
    #[error("用户不存在: {0}")]
    UserNotFound(String),

    #[error("等级配置非法: {0}")]
    TierConfig(String),

    #[error("规则解码失败: rule_id={rule_id}, kind={kind}, 原因={source}")]
    RuleDecode {
        rule_id: i64,
        kind: RuleKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("积分溢出: user_id={user_id}, 当前={current}, 变动={delta}")]
    PointOverflow {
        user_id: String,
        current: i64,
        delta: i64,
    },

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Shared(#[from] loyalty_shared::error::LoyaltyError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// 检查是否为可重试的瞬时错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) => true,
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 是否应在调用边界上表现为通用内部错误
    ///
    /// 积分与等级写入失败对请求方只暴露"内部错误"，业务校验类错误保留原始语义
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Shared(_)
                | Self::Internal(_)
                | Self::TierConfig(_)
                | Self::PointOverflow { .. }
        )
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::TierConfig(_) => "TIER_CONFIG_INVALID",
            Self::RuleDecode { .. } => "RULE_DECODE_FAILED",
            Self::PointOverflow { .. } => "POINT_OVERFLOW",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
