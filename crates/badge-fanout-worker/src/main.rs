//! 徽章扇出服务
//!
//! 消费徽章变更消息，对全部用户评估变更后的徽章。

use std::sync::Arc;

use badge_fanout_worker::{BadgeFanoutConsumer, FanoutHandler};
use loyalty_engine::service::{BadgeDispatcher, RuleEvaluator};
use loyalty_shared::config::{AppConfig, FanoutFailurePolicy};
use loyalty_shared::database::Database;
use loyalty_shared::dlq::DlqProducer;
use loyalty_shared::kafka::KafkaProducer;
use loyalty_shared::observability;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "badge-fanout-worker";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let (config, load_error) = match AppConfig::load(SERVICE_NAME) {
        Ok(config) => (config, None),
        Err(e) => (
            AppConfig {
                service_name: SERVICE_NAME.to_string(),
                ..Default::default()
            },
            Some(e),
        ),
    };

    observability::init(&config.service_name, &config.observability)?;
    if let Some(e) = load_error {
        warn!(error = %e, "加载配置失败，使用默认配置");
    }
    info!(environment = %config.environment, "Starting badge-fanout-worker...");

    let db = Database::connect_and_migrate(&config.database).await?;

    let evaluator = RuleEvaluator::new(config.loyalty.decode_error_policy);
    let dispatcher = BadgeDispatcher::new(db.pool().clone(), evaluator);
    let mut handler = FanoutHandler::new(
        dispatcher,
        config.loyalty.fanout.failure_policy,
        config.service_name.clone(),
    );

    if config.loyalty.fanout.failure_policy == FanoutFailurePolicy::DeadLetter {
        let producer = KafkaProducer::new(&config.kafka)?;
        let dlq = DlqProducer::new(producer, config.loyalty.fanout.dead_letter_topic.clone());
        handler = handler.with_dead_letter(Arc::new(dlq));
    }

    let consumer = BadgeFanoutConsumer::new(&config, handler)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl+C，开始优雅关闭"),
            Err(e) => error!(error = %e, "监听关闭信号失败"),
        }
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;
    db.close().await;

    info!("badge-fanout-worker stopped");
    Ok(())
}
