//! 共享库
//!
//! 包含积分与徽章引擎各组件共用的配置、错误处理、数据库连接、Kafka、死信队列和可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod kafka;
pub mod messages;
pub mod observability;
pub mod test_utils;
