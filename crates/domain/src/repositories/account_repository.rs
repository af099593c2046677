//! 账号Repository接口定义

use crate::entities::account::{AccountProfile, AccountStatus, TelegramAccount};
use crate::errors::DomainResult;
use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

/// 账号Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// 按手机号查找，不存在则以给定的 App 凭据创建一条未登录记录
    async fn get_or_create(
        &self,
        phone: &str,
        app_id: &str,
        app_hash: &str,
        database_path: &str,
    ) -> DomainResult<TelegramAccount>;

    /// 根据手机号查找账号
    async fn find_by_phone(&self, phone: &str) -> DomainResult<Option<TelegramAccount>>;

    /// 根据ID查找账号
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<TelegramAccount>>;

    /// 登录成功后写入个人资料，同时把状态置为在线并记录登录时间
    async fn update_profile(&self, phone: &str, profile: &AccountProfile) -> DomainResult<()>;

    /// 更新账号状态
    async fn set_status(&self, phone: &str, status: AccountStatus) -> DomainResult<()>;

    /// 停用账号（探测到封禁时调用），同时把状态置为被封号
    async fn deactivate(&self, phone: &str) -> DomainResult<()>;

    /// 标记账号已更改过二步密码
    async fn mark_password_changed(&self, phone: &str) -> DomainResult<()>;

    /// 列出所有启用且本周期私信次数未达上限的账号
    async fn list_sendable(&self, cap: i32) -> DomainResult<Vec<TelegramAccount>>;

    /// 分页查询账号列表，按创建时间倒序
    async fn list_page(&self, page: u32, page_size: u32) -> DomainResult<Vec<TelegramAccount>>;

    /// 根据手机号模糊查询
    async fn search_by_phone(&self, phone: &str) -> DomainResult<Vec<TelegramAccount>>;

    /// 根据ID删除账号
    async fn delete_by_id(&self, id: Uuid) -> DomainResult<()>;

    /// 当前全部账号剩余的可私信总量
    async fn remaining_capacity(&self, cap: i32) -> DomainResult<i64>;

    /// 重置超过给定时长未重置的账号私信计数，返回受影响的行数
    async fn reset_stale_counters(&self, older_than: Duration) -> DomainResult<u64>;
}
