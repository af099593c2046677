//! 账号应用服务
//!
//! 面向外层调用方（GUI / API）的账号管理门面：登录、账号列表、
//! 删除、登出、App 凭据维护、剩余可私信量查询。批量私信入口见
//! `BulkDispatcher`。

use chrono::{DateTime, Utc};
use config::DispatchConfig;
use domain::{setting_keys, AccountRepository, DomainError, SettingsRepository, TelegramAccount};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ApplicationError, ApplicationResult};
use crate::registry::SessionRegistry;

/// 账号列表项
#[derive(Debug, Clone, Serialize)]
pub struct AccountItem {
    pub id: Uuid,
    pub phone: String,
    pub display_name: String,
    pub username: String,
    pub status: i32,
    pub is_active: bool,
    pub is_premium: bool,
    pub private_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<TelegramAccount> for AccountItem {
    fn from(account: TelegramAccount) -> Self {
        Self {
            display_name: account.display_name(),
            id: account.id,
            phone: account.phone,
            username: account.username,
            status: account.status.as_i32(),
            is_active: account.is_active,
            is_premium: account.is_premium,
            private_count: account.private_count,
            created_at: account.created_at,
        }
    }
}

/// 账号服务的外部依赖
#[derive(Clone)]
pub struct AccountServiceDependencies {
    pub registry: Arc<SessionRegistry>,
    pub accounts: Arc<dyn AccountRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

/// 账号应用服务
pub struct AccountService {
    deps: AccountServiceDependencies,
    config: DispatchConfig,
}

impl AccountService {
    pub fn new(deps: AccountServiceDependencies, config: DispatchConfig) -> Self {
        Self { deps, config }
    }

    /// 发起登录：创建（或替换）该手机号的会话并开始认证握手
    ///
    /// 已登录成功的账号不允许重复发起，需先登出。
    pub async fn begin_login(&self, phone: &str) -> ApplicationResult<()> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ApplicationError::Validation("手机号不能为空".to_string()));
        }
        if let Some(existing) = self.deps.registry.get(phone).await {
            if existing.is_ready().await {
                return Err(ApplicationError::Validation(format!(
                    "账号 Phone:{} 已在线，请先登出",
                    phone
                )));
            }
        }
        self.deps.registry.create_and_register(phone).await?;
        info!(phone, "登录流程已发起");
        Ok(())
    }

    /// 提交验证码与二步密码完成登录
    ///
    /// 密码为空表示该账号没有二步验证；非空时在验证码之后间隔一秒
    /// 提交，给远端留出状态切换的时间。
    pub async fn confirm_login(
        &self,
        phone: &str,
        code: &str,
        password: &str,
    ) -> ApplicationResult<()> {
        let session = self
            .deps
            .registry
            .get(phone)
            .await
            .ok_or_else(|| ApplicationError::NotFound(format!("客户端 Phone:{}", phone)))?;

        session.submit_code(code).await?;
        if !password.is_empty() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            session.submit_password(password).await?;
        }
        Ok(())
    }

    /// 分页查询账号列表
    pub async fn list_accounts(
        &self,
        page: u32,
        page_size: u32,
    ) -> ApplicationResult<Vec<AccountItem>> {
        let accounts = self.deps.accounts.list_page(page, page_size).await?;
        Ok(accounts.into_iter().map(AccountItem::from).collect())
    }

    /// 手机号模糊查询
    pub async fn search_by_phone(&self, phone: &str) -> ApplicationResult<Vec<AccountItem>> {
        let accounts = self.deps.accounts.search_by_phone(phone).await?;
        Ok(accounts.into_iter().map(AccountItem::from).collect())
    }

    /// 删除账号；如有在册会话先关闭
    pub async fn delete_account(&self, id: Uuid) -> ApplicationResult<()> {
        let account = self
            .deps
            .accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::account_not_found(id.to_string()))?;

        if let Some(session) = self.deps.registry.remove(&account.phone).await {
            // 远端登出只对已登录的会话有意义，失败不阻塞删除
            if session.is_ready().await {
                if let Err(err) = session.log_out_and_invalidate().await {
                    warn!(phone = %account.phone, error = %err, "登出失败");
                }
            }
            if let Err(err) = session.close().await {
                warn!(phone = %account.phone, error = %err, "关闭会话失败");
            }
        }
        self.deps.accounts.delete_by_id(id).await?;
        info!(phone = %account.phone, "账号已删除");
        Ok(())
    }

    /// 远端登出并摘除会话
    pub async fn log_out(&self, phone: &str) -> ApplicationResult<()> {
        let session = self
            .deps
            .registry
            .get(phone)
            .await
            .ok_or_else(|| ApplicationError::NotFound(format!("客户端 Phone:{}", phone)))?;

        session.log_out_and_invalidate().await?;
        if let Err(err) = session.close().await {
            warn!(phone, error = %err, "关闭会话失败");
        }
        self.deps.registry.remove(phone).await;
        info!(phone, "账号已登出");
        Ok(())
    }

    /// 当前全部账号剩余的可私信总量
    pub async fn remaining_capacity(&self) -> ApplicationResult<i64> {
        let setting = self
            .deps
            .settings
            .get_or_init(
                setting_keys::DAILY_CAP,
                &self.config.default_daily_cap,
                "账号每日最大私信数量",
            )
            .await?;
        let cap = setting.value.parse::<i32>().map_err(|_| {
            DomainError::validation_error(
                setting_keys::DAILY_CAP,
                format!("无法解析为数字: {}", setting.value),
            )
        })?;
        Ok(self.deps.accounts.remaining_capacity(cap).await?)
    }

    /// 写入 App 凭据
    pub async fn set_app_credentials(
        &self,
        app_id: &str,
        app_hash: &str,
    ) -> ApplicationResult<()> {
        if app_id.trim().is_empty() || app_hash.trim().is_empty() {
            return Err(ApplicationError::Validation(
                "AppID 与 AppHash 不能为空".to_string(),
            ));
        }
        self.deps
            .settings
            .set(setting_keys::APP_ID, app_id.trim(), "应用 AppID")
            .await?;
        self.deps
            .settings
            .set(setting_keys::APP_HASH, app_hash.trim(), "应用 AppHash")
            .await?;
        Ok(())
    }

    /// App 凭据是否已配置
    pub async fn has_app_credentials(&self) -> ApplicationResult<bool> {
        let app_id = self.deps.settings.get(setting_keys::APP_ID).await?;
        let app_hash = self.deps.settings.get(setting_keys::APP_HASH).await?;
        Ok(matches!((app_id, app_hash), (Some(id), Some(hash))
            if !id.value.is_empty() && !hash.value.is_empty()))
    }
}
