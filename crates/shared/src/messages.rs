//! 消息队列载荷
//!
//! 定义跨服务传递的消息格式：徽章变更消息（生产者在徽章或规则集变更时发布，
//! 扇出消费者订阅）以及等级通知事件（通知投递端订阅）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoyaltyError;

/// 徽章变更消息
///
/// 载荷只携带徽章编码，消费者处理时重新读取徽章与规则的当前状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeChangedMessage {
    pub badge_code: String,
}

impl BadgeChangedMessage {
    pub fn new(badge_code: impl Into<String>) -> Self {
        Self {
            badge_code: badge_code.into(),
        }
    }

    /// 校验消息内容，空编码视为非法消息
    pub fn validate(&self) -> Result<(), LoyaltyError> {
        if self.badge_code.trim().is_empty() {
            return Err(LoyaltyError::Validation("badge_code 不能为空".to_string()));
        }
        Ok(())
    }
}

/// 通知事件
///
/// 与数据库中的通知记录一一对应，发往通知 topic 由投递端推送
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// 通知唯一编码
    pub code: String,
    /// 接收人（用户 ID）
    pub receiver_code: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub description: serde_json::Value,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
