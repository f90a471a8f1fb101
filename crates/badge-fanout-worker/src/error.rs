//! 扇出消费者专用错误类型

use loyalty_engine::EngineError;
use loyalty_shared::error::LoyaltyError;

/// 徽章扇出处理错误
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// 载荷不是合法的徽章变更消息，重投也不会成功
    #[error("非法消息: {0}")]
    InvalidMessage(String),

    /// 加载徽章、规则或用户列表失败
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Shared(#[from] LoyaltyError),
}
