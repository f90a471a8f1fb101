//! 徽章扇出消费者
//!
//! 一次只处理一条消息，处理结束后由 `KafkaConsumer` 无条件确认：
//! 失败的消息不会被重新投递，避免毒消息反复阻塞队列。
//!
//! 失败处理由 `FanoutFailurePolicy` 决定：
//! - `Drop`：记录错误日志后丢弃（至多一次）
//! - `DeadLetter`：包装为死信信封写入死信 topic，留下可重放的记录

use std::sync::Arc;
use std::time::Instant;

use loyalty_engine::repository::TxProvider;
use loyalty_engine::service::{BadgeDispatcher, DispatchReport};
use loyalty_shared::config::{AppConfig, FanoutFailurePolicy};
use loyalty_shared::dlq::{DeadLetterMessage, DeadLetterSink};
use loyalty_shared::kafka::{ConsumerMessage, KafkaConsumer};
use loyalty_shared::messages::BadgeChangedMessage;
use loyalty_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::error::FanoutError;

/// 单条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    /// 扇出完成（可能包含个别用户失败，已计入报告）
    Processed(DispatchReport),
    /// 处理失败，已丢弃
    Dropped,
    /// 处理失败，已写入死信队列
    DeadLettered,
}

impl MessageDisposition {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Processed(_) => "processed",
            Self::Dropped => "dropped",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// 解析消息并执行扇出
async fn process_message<P: TxProvider>(
    dispatcher: &BadgeDispatcher<P>,
    msg: &ConsumerMessage,
) -> Result<DispatchReport, FanoutError> {
    let message: BadgeChangedMessage = serde_json::from_slice(&msg.payload)
        .map_err(|e| FanoutError::InvalidMessage(e.to_string()))?;
    message
        .validate()
        .map_err(|e| FanoutError::InvalidMessage(e.to_string()))?;

    Ok(dispatcher.fan_out_badge(&message.badge_code).await?)
}

/// 消息处理器
///
/// 与 Kafka 消费循环解耦，测试中可直接构造消息调用
pub struct FanoutHandler<P: TxProvider> {
    dispatcher: BadgeDispatcher<P>,
    failure_policy: FanoutFailurePolicy,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    service_name: String,
}

impl<P: TxProvider> FanoutHandler<P> {
    pub fn new(
        dispatcher: BadgeDispatcher<P>,
        failure_policy: FanoutFailurePolicy,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            failure_policy,
            dead_letter: None,
            service_name: service_name.into(),
        }
    }

    /// 设置死信投递端，DeadLetter 策略下必须设置，否则退化为丢弃
    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// 处理一条消息，从不返回错误
    #[instrument(skip(self, msg), fields(topic = %msg.topic, partition = msg.partition, offset = msg.offset))]
    pub async fn handle_message(&self, msg: &ConsumerMessage) -> MessageDisposition {
        let started = Instant::now();

        let disposition = match process_message(&self.dispatcher, msg).await {
            Ok(report) => MessageDisposition::Processed(report),
            Err(e) => self.on_failure(msg, &e).await,
        };

        metrics::record_fanout_message(disposition.outcome(), started.elapsed().as_secs_f64());
        disposition
    }

    async fn on_failure(&self, msg: &ConsumerMessage, err: &FanoutError) -> MessageDisposition {
        let sink = match (self.failure_policy, &self.dead_letter) {
            (FanoutFailurePolicy::DeadLetter, Some(sink)) => sink,
            (FanoutFailurePolicy::DeadLetter, None) => {
                warn!("未配置死信投递端，按丢弃处理");
                error!(error = %err, "徽章扇出失败，消息已丢弃");
                return MessageDisposition::Dropped;
            }
            (FanoutFailurePolicy::Drop, _) => {
                error!(error = %err, "徽章扇出失败，消息已丢弃");
                return MessageDisposition::Dropped;
            }
        };

        let letter = DeadLetterMessage::new(
            msg.message_id(),
            msg.topic.clone(),
            msg.payload_lossy(),
            err.to_string(),
            self.service_name.clone(),
        );

        match sink.send_to_dlq(&letter).await {
            Ok(()) => MessageDisposition::DeadLettered,
            Err(dlq_err) => {
                error!(
                    error = %err,
                    dlq_error = %dlq_err,
                    "写入死信队列失败，消息已丢弃"
                );
                MessageDisposition::Dropped
            }
        }
    }
}

/// 徽章扇出消费者
pub struct BadgeFanoutConsumer<P: TxProvider> {
    consumer: KafkaConsumer,
    handler: FanoutHandler<P>,
    topic: String,
}

impl<P: TxProvider> BadgeFanoutConsumer<P> {
    pub fn new(config: &AppConfig, handler: FanoutHandler<P>) -> Result<Self, FanoutError> {
        let consumer = KafkaConsumer::new(&config.kafka, Some("badge-fanout"))?;
        Ok(Self {
            consumer,
            handler,
            topic: config.loyalty.fanout.badge_changed_topic.clone(),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), FanoutError> {
        self.consumer.subscribe(&[self.topic.as_str()])?;

        info!(topic = %self.topic, "徽章扇出消费者已启动");

        let handler = &self.handler;
        self.consumer
            .start(shutdown, |msg| async move {
                if let MessageDisposition::Processed(report) = handler.handle_message(&msg).await {
                    info!(
                        offset = msg.offset,
                        awarded = report.awarded,
                        failed = report.failed,
                        "徽章变更消息处理完成"
                    );
                }
                Ok(())
            })
            .await;

        info!("徽章扇出消费者已停止");
        Ok(())
    }
}
