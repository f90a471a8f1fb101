//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// 安装 Prometheus recorder 并在指定端口暴露 `/metrics`
///
/// 必须在 tokio 运行时内调用，导出器的 HTTP 监听任务由运行时托管。
pub fn init(service_name: &str, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", service_name.to_string())
        .install()?;

    register_common_metrics();
    info!("Metrics exporter listening on {}", addr);

    Ok(())
}

/// 注册预定义的业务指标描述
///
/// 这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics() {
    metrics::describe_counter!(
        "loyalty_points_recorded_total",
        "Total number of point ledger writes"
    );
    metrics::describe_counter!(
        "loyalty_tier_transitions_total",
        "Total number of tier transitions"
    );
    metrics::describe_counter!(
        "loyalty_badges_awarded_total",
        "Total number of user badge rows created"
    );
    metrics::describe_counter!(
        "loyalty_rule_evaluations_total",
        "Total number of badge rule set evaluations"
    );
    metrics::describe_counter!(
        "loyalty_fanout_messages_total",
        "Total number of badge fan-out messages handled"
    );
    metrics::describe_histogram!(
        "loyalty_fanout_duration_seconds",
        "Badge fan-out message handling duration in seconds"
    );
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录积分流水写入
#[inline]
pub fn record_points(data_source: &str) {
    metrics::counter!(
        "loyalty_points_recorded_total",
        "data_source" => data_source.to_string()
    )
    .increment(1);
}

/// 记录等级变更
#[inline]
pub fn record_tier_transition(direction: &str) {
    metrics::counter!(
        "loyalty_tier_transitions_total",
        "direction" => direction.to_string()
    )
    .increment(1);
}

/// 记录徽章授予
#[inline]
pub fn record_badge_award(source: &str) {
    metrics::counter!(
        "loyalty_badges_awarded_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录规则集评估结果
#[inline]
pub fn record_rule_evaluation(result: &str) {
    metrics::counter!(
        "loyalty_rule_evaluations_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// 记录扇出消息处理
#[inline]
pub fn record_fanout_message(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "loyalty_fanout_messages_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!("loyalty_fanout_duration_seconds").record(duration_secs);
}
