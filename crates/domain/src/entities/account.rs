//! 电报账号实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 账号状态
///
/// 数据库中按整数存储：0未登录，1验证码待输入，2二步密码待输入，
/// 3在线（登陆成功），4被封号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// 未登录
    Created,
    /// 验证码待输入
    AwaitingCode,
    /// 二步密码待输入
    AwaitingPassword,
    /// 在线（登陆成功）
    Ready,
    /// 被封号
    Banned,
}

impl AccountStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            AccountStatus::Created => 0,
            AccountStatus::AwaitingCode => 1,
            AccountStatus::AwaitingPassword => 2,
            AccountStatus::Ready => 3,
            AccountStatus::Banned => 4,
        }
    }

    pub fn from_i32(value: i32) -> DomainResult<Self> {
        match value {
            0 => Ok(AccountStatus::Created),
            1 => Ok(AccountStatus::AwaitingCode),
            2 => Ok(AccountStatus::AwaitingPassword),
            3 => Ok(AccountStatus::Ready),
            4 => Ok(AccountStatus::Banned),
            other => Err(DomainError::validation_error(
                "account_status",
                format!("无效的账号状态: {}", other),
            )),
        }
    }
}

/// 电报账号
///
/// 每个手机号对应一条记录；`private_count` 为当前周期内已发送的私信数，
/// 由调度器在条件更新下递增，永远不会超过设置的每日上限。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramAccount {
    pub id: Uuid,
    /// 电报登录手机号，唯一
    pub phone: String,
    pub app_id: String,
    pub app_hash: String,
    /// 本地数据库存储路径
    pub database_path: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    /// 电报唯一 UID
    pub tg_user_id: i64,
    /// 是否为会员
    pub is_premium: bool,
    /// 是否启用
    pub is_active: bool,
    pub status: AccountStatus,
    /// 是否更改过二步密码
    pub is_password_changed: bool,
    /// 当前周期私信次数
    pub private_count: i32,
    /// 上次重置私信次数的时间
    pub last_reset_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TelegramAccount {
    /// 显示名（电报名 + 姓）
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// 登录成功后从电报拉取的个人资料
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub tg_user_id: i64,
    pub is_premium: bool,
}
