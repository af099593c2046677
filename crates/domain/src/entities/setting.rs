//! 客户端通用设置实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 客户端通用设置，扁平的 key/value 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSetting {
    pub id: Uuid,
    /// 配置 key，唯一
    pub key: String,
    pub value: String,
    /// 配置描述
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 系统使用的固定设置 key
pub mod setting_keys {
    /// 电报 API ID
    pub const APP_ID: &str = "appID";
    /// 电报 API HASH
    pub const APP_HASH: &str = "appHash";
    /// 账号每日最大私信数量
    pub const DAILY_CAP: &str = "account_private_count";
}
