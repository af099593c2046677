//! 私信台账Repository接口定义

use crate::entities::contact::ContactedChat;
use crate::errors::DomainResult;
use async_trait::async_trait;
use uuid::Uuid;

/// 私信台账Repository接口
///
/// 台账行对用户名全局唯一，保证每个用户名最多只被私信一次。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// 根据用户名查找台账记录（兼做 ChatID 缓存）
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<ContactedChat>>;

    /// 返回给定用户名中已经私信过的那部分
    async fn list_existing(&self, usernames: &[String]) -> DomainResult<Vec<String>>;

    /// 私信成功后的落库：在一个事务里条件递增账号计数并写入台账。
    ///
    /// 计数更新带 `private_count < cap` 条件；若没有行被更新，说明配额
    /// 已被并发抢光，此时什么都不写并返回 `Ok(false)`。
    async fn commit_dispatch(
        &self,
        account_id: Uuid,
        phone: &str,
        username: &str,
        chat_id: i64,
        cap: i32,
    ) -> DomainResult<bool>;
}
