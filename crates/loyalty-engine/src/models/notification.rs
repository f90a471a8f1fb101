//! 通知记录实体

use chrono::{DateTime, Utc};
use loyalty_shared::messages::NotificationEvent;
use serde::{Deserialize, Serialize};

use super::enums::NotificationKind;

/// 通知记录
///
/// 在积分事务内落库，事务提交后再交给通知投递端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// 唯一编码（UUID v7）
    pub code: String,
    pub receiver_code: String,
    pub kind: NotificationKind,
    pub title: String,
    pub description: serde_json::Value,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn to_event(&self) -> NotificationEvent {
        NotificationEvent {
            code: self.code.clone(),
            receiver_code: self.receiver_code.clone(),
            notification_type: self.kind.as_str().to_string(),
            title: self.title.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            created_at: self.created_at,
        }
    }
}
