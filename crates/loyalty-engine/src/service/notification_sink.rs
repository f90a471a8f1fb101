//! 通知投递
//!
//! 通知记录随积分事务落库，事务提交后再交给投递端推送。
//! 投递是尽力而为的：失败只记录日志，不重试，也不影响已提交的积分。

use std::sync::Arc;

use async_trait::async_trait;
use loyalty_shared::config::LoyaltyConfig;
use loyalty_shared::kafka::KafkaProducer;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::NotificationRecord;

/// 通知投递接口
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, record: &NotificationRecord) -> Result<()>;
}

/// 将通知事件发布到 Kafka，由下游推送服务消费
pub struct KafkaNotificationSink {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    /// 发布到配置的 `loyalty.notifications_topic`
    pub fn from_config(producer: KafkaProducer, config: &LoyaltyConfig) -> Self {
        Self::new(producer, config.notifications_topic.clone())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn deliver(&self, record: &NotificationRecord) -> Result<()> {
        self.producer
            .send_json(&self.topic, &record.receiver_code, &record.to_event())
            .await?;
        Ok(())
    }
}

/// 在后台任务中逐条投递，调用方不等待结果
pub fn deliver_detached(sink: Arc<dyn NotificationSink>, records: Vec<NotificationRecord>) {
    if records.is_empty() {
        return;
    }

    tokio::spawn(async move {
        for record in &records {
            match sink.deliver(record).await {
                Ok(()) => debug!(code = %record.code, "通知已投递"),
                Err(e) => warn!(
                    code = %record.code,
                    receiver = %record.receiver_code,
                    error = %e,
                    "通知投递失败，已忽略"
                ),
            }
        }
    });
}
