//! 私信台账实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 已私信过的会话
///
/// 每个用户名只需要发一次；`username` 全局唯一，同时兼做用户名到
/// ChatID 的缓存。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactedChat {
    pub id: Uuid,
    /// 发出这条私信的账号
    pub account_id: Uuid,
    /// 电报用户名，唯一
    pub username: String,
    /// 对话 ID
    pub chat_id: i64,
    pub created_at: DateTime<Utc>,
}
