//! 积分与徽章引擎
//!
//! 将用户活动（预订、赛事结果、兑换）转换为持久的积分流水，按累计积分解析等级，
//! 并按多种规则评估徽章资格。
//!
//! ## 模块结构
//!
//! - `models`: 流水、等级、徽章、规则与通知实体
//! - `repository`: 存储边界 trait 及其 PostgreSQL 事务实现
//! - `service`: 积分流水、等级解析、等级通知、规则评估、徽章授予与分发
//! - `test_utils`: 内存事务存储，供测试使用
//!
//! ## 一致性
//!
//! 用户积分缓存与流水之和在每次积分写入的事务内保持一致；
//! 徽章授予对每个用户/徽章组合幂等。

pub mod error;
pub mod models;
pub mod repository;
pub mod service;
pub mod test_utils;

pub use error::{EngineError, Result};
