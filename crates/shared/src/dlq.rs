//! 死信队列
//!
//! 徽章扇出消费者采用"处理后无条件确认"的策略，失败的消息不会被重新投递。
//! 选择 `FanoutFailurePolicy::DeadLetter` 时，失败消息会被包装成死信信封写入
//! 死信 topic，留下可排查、可人工重放的记录，而不是静默丢弃。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LoyaltyError;
use crate::kafka::KafkaProducer;

// ---------------------------------------------------------------------------
// DeadLetterMessage：死信消息信封
// ---------------------------------------------------------------------------

/// 死信消息信封
///
/// 包装原始消息，附加失败原因和来源信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 原始消息标识（扇出场景下为 badge_code 或 topic/partition/offset）
    pub message_id: String,
    /// 原始 topic
    pub source_topic: String,
    /// 原始消息内容
    pub payload: String,
    /// 失败原因
    pub error: String,
    pub failed_at: DateTime<Utc>,
    /// 来源服务
    pub source_service: String,
}

impl DeadLetterMessage {
    pub fn new(
        message_id: impl Into<String>,
        source_topic: impl Into<String>,
        payload: impl Into<String>,
        error: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            source_topic: source_topic.into(),
            payload: payload.into(),
            error: error.into(),
            failed_at: Utc::now(),
            source_service: source_service.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeadLetterSink：死信投递抽象
// ---------------------------------------------------------------------------

/// 死信投递接口
///
/// 消费者只依赖该 trait，测试中可替换为内存实现
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send_to_dlq(&self, message: &DeadLetterMessage) -> Result<(), LoyaltyError>;
}

// ---------------------------------------------------------------------------
// DlqProducer：将失败消息发送到死信队列
// ---------------------------------------------------------------------------

/// 基于 Kafka 的死信生产者
pub struct DlqProducer {
    producer: KafkaProducer,
    topic: String,
}

impl DlqProducer {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for DlqProducer {
    async fn send_to_dlq(&self, message: &DeadLetterMessage) -> Result<(), LoyaltyError> {
        self.producer
            .send_json(&self.topic, &message.message_id, message)
            .await?;

        warn!(
            message_id = %message.message_id,
            source_topic = %message.source_topic,
            error = %message.error,
            "消息已发送到死信队列"
        );

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
