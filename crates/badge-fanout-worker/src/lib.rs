//! 徽章扇出消费者
//!
//! 订阅徽章变更 topic，逐条处理：对全部用户评估消息中的徽章并授予满足条件者。
//! 每条消息处理后无条件确认，失败按配置的策略丢弃或写入死信队列。

pub mod consumer;
pub mod error;

pub use consumer::{BadgeFanoutConsumer, FanoutHandler, MessageDisposition};
pub use error::FanoutError;
