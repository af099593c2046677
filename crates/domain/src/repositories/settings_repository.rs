//! 设置Repository接口定义

use crate::entities::setting::ClientSetting;
use crate::errors::DomainResult;
use async_trait::async_trait;

/// 设置Repository接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// 根据 key 查询设置
    async fn get(&self, key: &str) -> DomainResult<Option<ClientSetting>>;

    /// 根据 key 查询设置，不存在则写入默认值后返回
    async fn get_or_init(
        &self,
        key: &str,
        default_value: &str,
        description: &str,
    ) -> DomainResult<ClientSetting>;

    /// 写入或覆盖设置
    async fn set(&self, key: &str, value: &str, description: &str) -> DomainResult<()>;
}
